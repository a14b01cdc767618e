//! Error types surfaced at the library boundary

use thiserror::Error;

/// Failure of a column preview or removal request.
///
/// `InvalidInput` carries a message meant for the caller. `ProcessingFailure`
/// keeps its cause for the server-side log only; its `Display` is generic so
/// no internal detail reaches the caller.
#[derive(Debug, Error)]
pub enum ColumnError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("failed to process workbook")]
    ProcessingFailure(#[source] anyhow::Error),
}

impl ColumnError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ColumnError::InvalidInput(message.into())
    }

    /// Whether the caller can fix the request and resubmit
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, ColumnError::InvalidInput(_))
    }
}

impl From<anyhow::Error> for ColumnError {
    fn from(err: anyhow::Error) -> Self {
        ColumnError::ProcessingFailure(err)
    }
}

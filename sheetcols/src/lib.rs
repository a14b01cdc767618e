//! sheetcols: column removal for spreadsheet documents
//!
//! Decodes an XLSX workbook, removes a caller-chosen set of columns from every
//! worksheet while keeping cell styles, column formats and merged regions in
//! line, and encodes the result again. A read-only preview lists the columns
//! of the first worksheet so callers can pick what to remove.

pub mod columns;
pub mod config;
pub mod engine;
pub mod error;
pub mod filename;
pub mod preview;
pub mod reader;
pub mod writer;

use log::{error, info};
use serde::Serialize;

pub use columns::ColumnSet;
pub use config::{PreviewConfig, ServiceConfig};
pub use engine::{RemovalReport, SheetReport};
pub use error::ColumnError;
pub use preview::ColumnInfo;
pub use reader::{Cell, CellValue, ColumnRange, Hyperlink, MergedRegion, Sheet, Workbook};

/// Result of a successful removal request
#[derive(Debug, Clone)]
pub struct ProcessedWorkbook {
    pub bytes: Vec<u8>,
    /// Suggested name for the processed document
    pub filename: String,
    pub report: RemovalReport,
}

/// Columns of the first worksheet of an uploaded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub filename: String,
    pub columns: Vec<ColumnInfo>,
}

/// Entry point for callers holding an uploaded document in memory.
///
/// Holds only configuration, so one instance can serve concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct ColumnRemover {
    config: ServiceConfig,
}

impl ColumnRemover {
    /// Create a remover with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Remove `columns` (for example `"3,5"`) from every worksheet of `data`
    pub fn delete_columns(
        &self,
        filename: &str,
        data: &[u8],
        columns: &str,
    ) -> Result<ProcessedWorkbook, ColumnError> {
        check_filename(filename)?;
        let columns = ColumnSet::parse(columns)?;
        info!(
            "Removing columns [{}] from '{}' ({} bytes)",
            columns,
            filename,
            data.len()
        );

        let mut workbook = reader::read_workbook_from_bytes(data).map_err(failure)?;
        let report = engine::remove_columns(&mut workbook, &columns).map_err(failure)?;
        let bytes = writer::write_workbook_to_bytes(&workbook).map_err(failure)?;

        info!(
            "Removed {} column(s) across {} sheet(s), output is {} bytes",
            report.total_removed(),
            report.sheets.len(),
            bytes.len()
        );
        Ok(ProcessedWorkbook {
            bytes,
            filename: crate::filename::output_filename(filename, &self.config.output_suffix),
            report,
        })
    }

    /// Describe the columns of the first worksheet of `data`
    pub fn preview(&self, filename: &str, data: &[u8]) -> Result<Preview, ColumnError> {
        check_filename(filename)?;
        let columns = preview::preview_columns(data, &self.config.preview).map_err(failure)?;
        info!("Previewed {} column(s) of '{}'", columns.len(), filename);
        Ok(Preview {
            filename: filename.to_string(),
            columns,
        })
    }
}

fn check_filename(filename: &str) -> Result<(), ColumnError> {
    if filename.trim().is_empty() {
        return Err(ColumnError::invalid("no file selected"));
    }
    if !crate::filename::is_supported_filename(filename) {
        return Err(ColumnError::invalid(format!(
            "unsupported file type: {} (expected .xlsx or .xls)",
            filename
        )));
    }
    Ok(())
}

/// Log the full cause chain; the caller only sees a generic message
fn failure(err: anyhow::Error) -> ColumnError {
    error!("Workbook processing failed: {:#}", err);
    ColumnError::ProcessingFailure(err)
}

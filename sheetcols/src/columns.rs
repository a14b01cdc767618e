//! Column list parsing
//!
//! Turns the caller's column list (for example `"3,5,7"`) into a [`ColumnSet`]:
//! unique, 1-based indices sorted from right to left. Removing columns in that
//! order never shifts a column that is still waiting to be removed.

use std::fmt;
use std::str::FromStr;

use crate::error::ColumnError;

const EMPTY_LIST: &str = "column list must not be empty";

/// Canonical, strictly descending sequence of 1-based column indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet {
    indices: Vec<u32>,
}

impl ColumnSet {
    /// Parse a comma-separated list of column numbers
    pub fn parse(input: &str) -> Result<Self, ColumnError> {
        if input.trim().is_empty() {
            return Err(ColumnError::invalid(EMPTY_LIST));
        }

        let tokens: Vec<&str> = input
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect();

        if tokens.is_empty() {
            return Err(ColumnError::invalid(EMPTY_LIST));
        }

        let mut indices = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !token.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ColumnError::invalid(format!(
                    "column index must be a positive integer: {}",
                    token
                )));
            }
            let index: u32 = token.parse().map_err(|_| {
                ColumnError::invalid(format!("column index is out of range: {}", token))
            })?;
            indices.push(index);
        }

        Self::from_indices(indices)
    }

    /// Build a set from already-parsed indices
    pub fn from_indices<I: IntoIterator<Item = u32>>(indices: I) -> Result<Self, ColumnError> {
        let mut indices: Vec<u32> = indices.into_iter().collect();
        if indices.is_empty() {
            return Err(ColumnError::invalid(EMPTY_LIST));
        }
        if let Some(zero) = indices.iter().find(|&&index| index < 1) {
            return Err(ColumnError::invalid(format!(
                "column index must be greater than 0: {}",
                zero
            )));
        }

        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();
        Ok(Self { indices })
    }

    /// Indices from right to left
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.indices.iter().copied()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Always false for a constructed set
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

impl FromStr for ColumnSet {
    type Err = ColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ColumnSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.indices.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

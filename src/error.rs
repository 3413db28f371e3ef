//! Error taxonomy for one pipeline pass.
//!
//! None of these are fatal to an interactive session: each one is scoped to
//! the current render and goes away once the inputs change.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    /// The backing table could not be fetched or opened.
    #[error("failed to acquire data from {source_name}: {message}")]
    Acquisition {
        source_name: String,
        message: String,
    },

    /// The file was reachable but its contents could not be turned into journeys.
    #[error("failed to decode journeys: {0}")]
    Decode(String),

    /// A required input column is absent from the file.
    #[error("column '{0}' not found in input")]
    MissingColumn(String),

    /// No line identifier was selected, so there is nothing to render.
    #[error("no lines selected, nothing to render")]
    EmptySelection,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DashboardError {
    pub fn acquisition(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Acquisition {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// User errors are reported as warnings rather than failures.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::EmptySelection)
    }
}

impl From<arrow::error::ArrowError> for DashboardError {
    fn from(e: arrow::error::ArrowError) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<parquet::errors::ParquetError> for DashboardError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<csv::Error> for DashboardError {
    fn from(e: csv::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;

use std::time::Duration;

use crate::database::postgres::client::PostgresError;

fn index_suffix(index: &Option<usize>) -> String {
    index.map(|index| format!("[{}]", index)).unwrap_or_default()
}

fn reason_suffix(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(": {}", reason)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BulkOperationError {
    #[error("invalid key `{}` in values_series{}{}", .key, index_suffix(.index), reason_suffix(.reason))]
    InvalidColumn { key: String, index: Option<usize>, reason: String },

    #[error("invalid data in values_series[{}]{}", .index, reason_suffix(.reason))]
    InvalidValue { index: usize, reason: String },

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    DataAccess(#[from] PostgresError),

    #[error("rendering statement for chunk {chunk} timed out after {timeout:?}")]
    RenderTimeout { chunk: usize, timeout: Duration },

    #[error("statement render worker failed: {0}")]
    RenderWorker(String),
}

impl BulkOperationError {
    pub fn invalid_column(
        key: impl Into<String>,
        reason: impl Into<String>,
        index: Option<usize>,
    ) -> Self {
        BulkOperationError::InvalidColumn { key: key.into(), index, reason: reason.into() }
    }

    pub fn invalid_value(index: usize, reason: impl Into<String>) -> Self {
        BulkOperationError::InvalidValue { index, reason: reason.into() }
    }

    /// True for errors raised before any statement reached the connection.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BulkOperationError::InvalidColumn { .. }
                | BulkOperationError::InvalidValue { .. }
                | BulkOperationError::Configuration(_)
        )
    }
}

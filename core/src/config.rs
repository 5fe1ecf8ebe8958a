use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::database::batch_operations::BULK_CHUNK_SIZE;
use crate::database::errors::BulkOperationError;

pub const DEFAULT_RENDER_WORKERS: usize = 1;
pub const DEFAULT_RENDER_TIMEOUT_MS: u64 = 30_000;

/// Tuning options for bulk operations. Every field falls back to its default when absent.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BulkConfig {
    /// Maximum number of rows rendered into one statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    /// Number of blocking workers rendering statements.
    ///
    /// `1` renders inline on the calling task. Statements still run one at a time on the
    /// connection whatever this is set to; only literal encoding happens in parallel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_workers: Option<usize>,

    /// How long to wait for a render worker to hand back a statement before giving up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_timeout_ms: Option<u64>,
}

#[derive(thiserror::Error, Debug)]
pub enum ReadConfigError {
    #[error("Could not open file: {0}")]
    CouldNotOpenFile(#[from] std::io::Error),

    #[error("Could not parse config: {0}")]
    CouldNotParseConfig(#[from] serde_yaml::Error),

    #[error("Could not validate config: {0}")]
    CouldNotValidateConfig(#[from] BulkOperationError),
}

impl BulkConfig {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(BULK_CHUNK_SIZE)
    }

    pub fn render_workers(&self) -> usize {
        self.render_workers.unwrap_or(DEFAULT_RENDER_WORKERS).max(1)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms.unwrap_or(DEFAULT_RENDER_TIMEOUT_MS))
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_render_workers(mut self, render_workers: usize) -> Self {
        self.render_workers = Some(render_workers);
        self
    }

    pub fn with_render_timeout(mut self, render_timeout: Duration) -> Self {
        self.render_timeout_ms = Some(render_timeout.as_millis() as u64);
        self
    }

    pub fn validate(&self) -> Result<(), BulkOperationError> {
        if self.chunk_size == Some(0) {
            return Err(BulkOperationError::Configuration(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.render_timeout_ms == Some(0) {
            return Err(BulkOperationError::Configuration(
                "render_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ReadConfigError> {
        let config: BulkConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}

pub fn read_config(file_path: &Path) -> Result<BulkConfig, ReadConfigError> {
    let mut file = File::open(file_path)?;
    let mut contents = String::new();

    file.read_to_string(&mut contents)?;

    BulkConfig::from_yaml_str(&contents)
}

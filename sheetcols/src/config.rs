//! Service configuration

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings of the column removal service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Appended to the stem of the uploaded filename
    pub output_suffix: String,
    /// Largest accepted upload, in megabytes
    pub max_file_size_mb: f64,
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Sample values returned per column
    pub max_samples: usize,
    /// Last row scanned for samples (row 1 is the header)
    pub last_sample_row: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            output_suffix: "_processed".to_string(),
            max_file_size_mb: 50.0,
            preview: PreviewConfig::default(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_samples: 3,
            last_sample_row: 6,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ServiceConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size_mb.is_nan() || self.max_file_size_mb <= 0.0 {
            bail!(
                "Configuration error: max_file_size_mb must be positive, got {}",
                self.max_file_size_mb
            );
        }
        if self.preview.max_samples == 0 {
            bail!("Configuration error: preview.max_samples must be at least 1");
        }
        if self.preview.last_sample_row < 2 {
            bail!(
                "Configuration error: preview.last_sample_row must be at least 2, got {}",
                self.preview.last_sample_row
            );
        }
        Ok(())
    }
}

//! Analyzer configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! TOML file, and `BLOBVOTE_*` environment variables. The CLI applies its own
//! flags on top through the `with_*` builders.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregator::{RollingWindow, DEFAULT_BLOB_WINDOW, DEFAULT_BLOCK_WINDOW};
use crate::extractor::ExtractorSettings;
use crate::record::LayoutKind;
use crate::{AnalyzerError, AnalyzerResult, NodeId};

/// Proposer ids below this value are honest when the log carries no status tag
pub const DEFAULT_HONESTY_THRESHOLD: NodeId = 8000;

/// Rejection samples kept in the parse report
pub const DEFAULT_MAX_REJECTION_SAMPLES: usize = 20;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "BLOBVOTE";

/// Input encoding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Decide from the file extension, then from the first non-blank line
    #[default]
    Auto,
    /// Box-drawn text table
    #[serde(alias = "box")]
    BoxTable,
    /// Comma-separated values with a header row
    Csv,
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SourceFormat::Auto),
            "box" | "box_table" | "table" => Ok(SourceFormat::BoxTable),
            "csv" => Ok(SourceFormat::Csv),
            other => Err(format!("unknown format '{}'", other)),
        }
    }
}

/// Global configuration for parsing and aggregation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Input encoding
    pub format: SourceFormat,

    /// Layout assumed for box tables until a header row is seen
    pub layout_hint: LayoutKind,

    /// Threshold for untagged proposer ids
    pub honesty_threshold: NodeId,

    /// First N rejections kept verbatim in the report
    pub max_rejection_samples: usize,

    /// Rolling window over the per-block series
    pub block_window: usize,

    /// Rolling window over the per-blob series
    pub blob_window: usize,

    /// Center rolling windows instead of trailing them
    pub center_rolling: bool,
}

impl AnalyzerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            format: SourceFormat::Auto,
            layout_hint: LayoutKind::Counted,
            honesty_threshold: DEFAULT_HONESTY_THRESHOLD,
            max_rejection_samples: DEFAULT_MAX_REJECTION_SAMPLES,
            block_window: DEFAULT_BLOCK_WINDOW,
            blob_window: DEFAULT_BLOB_WINDOW,
            center_rolling: false,
        }
    }

    /// Load from an optional TOML file and `BLOBVOTE_*` environment variables.
    pub fn load(path: Option<&Path>) -> AnalyzerResult<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_layout_hint(mut self, layout: LayoutKind) -> Self {
        self.layout_hint = layout;
        self
    }

    pub fn with_honesty_threshold(mut self, threshold: NodeId) -> Self {
        self.honesty_threshold = threshold;
        self
    }

    pub fn with_max_rejection_samples(mut self, samples: usize) -> Self {
        self.max_rejection_samples = samples;
        self
    }

    /// Set the same rolling window for both groupings
    pub fn with_rolling_window(mut self, size: usize, centered: bool) -> Self {
        self.block_window = size;
        self.blob_window = size;
        self.center_rolling = centered;
        self
    }

    pub fn with_centered_rolling(mut self, centered: bool) -> Self {
        self.center_rolling = centered;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> AnalyzerResult<()> {
        if self.block_window == 0 {
            return Err(AnalyzerError::InvalidConfig(
                "block_window must be positive".to_string(),
            ));
        }

        if self.blob_window == 0 {
            return Err(AnalyzerError::InvalidConfig(
                "blob_window must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn extractor_settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            honesty_threshold: self.honesty_threshold,
        }
    }

    pub fn block_rolling_window(&self) -> RollingWindow {
        RollingWindow::new(self.block_window, self.center_rolling)
    }

    pub fn blob_rolling_window(&self) -> RollingWindow {
        RollingWindow::new(self.blob_window, self.center_rolling)
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::new()
    }
}

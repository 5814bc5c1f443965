//! # Blobvote Analyzer
//!
//! This library recovers typed vote records from the logs written by the
//! blob-voting consensus simulator and turns them into aggregate views that
//! plotting and reporting tools can consume.
//!
//! ## Architecture
//!
//! The pipeline is split into small, independently testable stages:
//!
//! - **Tokenizer**: splits box-drawn table lines into fields, skipping borders and headers
//! - **Layout**: resolves header titles (or a layout hint) into a column map
//! - **Extractor**: decodes one field list into a candidate record
//! - **Validator**: enforces run-level invariants and produces immutable [`VoteRecord`]s
//! - **Parser**: drives the stages over a whole box table or CSV source
//! - **Aggregator**: per-block and per-blob views, rolling averages and voter correlation
//!
//! ## Usage
//!
//! ```rust
//! use blobvote_analyzer::{aggregate, AnalyzerConfig, LogParser};
//!
//! let log = "\
//! │ 1 │ 150(honest)    │ 0 │ 3 │ 1 │
//! │ 1 │ 150(honest)    │ 1 │ 2 │ 4 │
//! │ 2 │ 8271(malicious)│ 2 │ 4 │ 0 │
//! ";
//!
//! let parser = LogParser::new(AnalyzerConfig::default());
//! let parsed = parser.parse_box_table(log);
//! assert_eq!(parsed.report.accepted, 3);
//!
//! let aggregates = aggregate(&parsed.records);
//! assert_eq!(aggregates.per_block.group(1).unwrap().total_votes, 10);
//! ```

use std::path::PathBuf;

use thiserror::Error;

pub mod aggregator;
pub mod config;
pub mod extractor;
pub mod layout;
pub mod parser;
pub mod record;
pub mod report;
pub mod tokenizer;
pub mod validator;

pub use aggregator::{
    aggregate, rolling_mean, AggregateView, Aggregates, CorrelationMatrix, GroupTotals, Grouping,
    RollingSeries, RollingWindow, SeriesStats, VoteStatistics, DEFAULT_BLOB_WINDOW,
    DEFAULT_BLOCK_WINDOW,
};
pub use config::{AnalyzerConfig, SourceFormat, DEFAULT_HONESTY_THRESHOLD};
pub use extractor::{extract, ExtractionError, ExtractorSettings};
pub use layout::{Column, ColumnMap, LayoutResolver, ResolvedLayout};
pub use parser::{detect_format, LogParser, ParsedLog};
pub use record::{CandidateRecord, LayoutKind, StatusSource, VoteRecord};
pub use report::{ParseReport, Rejection, RejectionKind};
pub use tokenizer::{tokenize, Fields, SkipKind, TokenizedLine};
pub use validator::{RecordValidator, ValidationError};

/// Block height in the simulated ledger
pub type BlockNumber = u64;

/// Identifier of a blob being voted on
pub type BlobId = u64;

/// Identifier of a simulated node (proposer or voter)
pub type NodeId = u64;

/// Fatal errors. Per-line problems never surface here; they land in the
/// [`ParseReport`] instead.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The input source could not be opened or read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A streamed input failed mid-read
    #[error("failed to read input: {0}")]
    Read(#[source] std::io::Error),

    /// The CSV reader could not decode the header row
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration sources could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// Configuration values are inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Exported values could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for analyzer operations
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

//! # Log Parser
//!
//! Drives tokenizer, layout resolver, extractor and validator over a whole
//! source. Parsing runs in three passes:
//!
//! 1. a sequential walk that tokenizes lines (or reads CSV rows), tracks
//!    header rows and assigns every data row the layout section it belongs to
//! 2. per-row extraction, independent for every row (on the rayon pool with
//!    the `parallel` feature)
//! 3. sequential validation in line order, since the validator owns the
//!    run's voter-set size
//!
//! Only failing to open or read the source is fatal; everything else ends up
//! in the [`ParseReport`].

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::{AnalyzerConfig, SourceFormat};
use crate::extractor::{extract, ExtractionError, ExtractorSettings};
use crate::layout::{ColumnMap, LayoutResolver, ResolvedLayout};
use crate::record::{CandidateRecord, VoteRecord};
use crate::report::ParseReport;
use crate::tokenizer::{tokenize, Fields, SkipKind, TokenizedLine};
use crate::validator::RecordValidator;
use crate::{AnalyzerError, AnalyzerResult};

/// Accepted records plus the report describing everything else
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLog {
    pub records: Vec<VoteRecord>,
    pub report: ParseReport,
}

/// A data row waiting for extraction
#[derive(Debug, Clone)]
struct PendingRow {
    line_number: usize,
    section: usize,
    fields: Result<Fields, String>,
}

/// Rows and layout sections collected by the first pass
#[derive(Debug)]
struct Collected {
    sections: Vec<ResolvedLayout>,
    rows: Vec<PendingRow>,
}

/// Parser for one analyzer configuration. Holds no per-run state, so one
/// instance can parse any number of sources.
#[derive(Debug, Clone, Default)]
pub struct LogParser {
    config: AnalyzerConfig,
}

impl LogParser {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Read and parse a file. The format comes from the configuration, or is
    /// detected from the extension and content when set to `Auto`.
    ///
    /// The file is read as bytes: a line that is not valid UTF-8 is rejected
    /// on its own instead of failing the whole source.
    pub fn parse_path(&self, path: &Path) -> AnalyzerResult<ParsedLog> {
        let bytes = fs::read(path).map_err(|source| AnalyzerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let format = match self.config.format {
            SourceFormat::Auto => detect_format(Some(path), &String::from_utf8_lossy(&bytes)),
            format => format,
        };
        info!("parsing {} as {:?}", path.display(), format);

        match format {
            SourceFormat::Csv => self.parse_csv(bytes.as_slice()),
            _ => Ok(self.parse_box_bytes(&bytes)),
        }
    }

    /// Parse in-memory text, detecting the format when set to `Auto`
    pub fn parse_str(&self, text: &str) -> AnalyzerResult<ParsedLog> {
        let format = match self.config.format {
            SourceFormat::Auto => detect_format(None, text),
            format => format,
        };
        match format {
            SourceFormat::Csv => self.parse_csv(text.as_bytes()),
            _ => Ok(self.parse_box_table(text)),
        }
    }

    /// Parse a box-drawn table held in memory
    pub fn parse_box_table(&self, text: &str) -> ParsedLog {
        self.parse_box_bytes(text.as_bytes())
    }

    /// Parse a box-drawn table from a reader. Only a failing read is fatal.
    pub fn parse_box_reader<R: Read>(&self, mut reader: R) -> AnalyzerResult<ParsedLog> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(AnalyzerError::Read)?;
        Ok(self.parse_box_bytes(&bytes))
    }

    fn parse_box_bytes(&self, bytes: &[u8]) -> ParsedLog {
        let mut report = ParseReport::new(self.config.max_rejection_samples);
        let collected = self.collect_table_rows(byte_lines(bytes), &mut report);
        self.finish(collected, report)
    }

    /// Parse comma-separated values with a header row
    pub fn parse_csv<R: Read>(&self, reader: R) -> AnalyzerResult<ParsedLog> {
        let mut report = ParseReport::new(self.config.max_rejection_samples);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let titles: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        report.record_skip();
        let section = match ColumnMap::from_titles(&titles) {
            Ok(map) => ResolvedLayout::Resolved(map),
            Err(missing) => {
                warn!("CSV header lacks required columns: {}", missing.join(", "));
                ResolvedLayout::Unresolved { missing }
            }
        };

        let mut collected = Collected {
            sections: vec![section],
            rows: Vec::new(),
        };
        for (index, row) in reader.records().enumerate() {
            // Header is line 1; fall back to the row index when the reader has
            // no position for a broken row.
            let fallback = index + 2;
            let pending = match row {
                Ok(record) => PendingRow {
                    line_number: record
                        .position()
                        .map_or(fallback, |p| p.line() as usize),
                    section: 0,
                    fields: Ok(record.iter().map(str::to_string).collect()),
                },
                Err(err) => PendingRow {
                    line_number: err
                        .position()
                        .map_or(fallback, |p| p.line() as usize),
                    section: 0,
                    fields: Err(err.to_string()),
                },
            };
            collected.rows.push(pending);
        }

        Ok(self.finish(collected, report))
    }

    fn collect_table_rows<'a, I>(&self, lines: I, report: &mut ParseReport) -> Collected
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut resolver = LayoutResolver::new(self.config.layout_hint);
        let mut collected = Collected {
            sections: vec![resolver.current().clone()],
            rows: Vec::new(),
        };

        for (index, line) in lines.into_iter().enumerate() {
            let line = match std::str::from_utf8(line) {
                Ok(line) => line,
                Err(err) => {
                    collected.rows.push(PendingRow {
                        line_number: index + 1,
                        section: collected.sections.len() - 1,
                        fields: Err(format!("line is not valid UTF-8: {}", err)),
                    });
                    continue;
                }
            };
            match tokenize(line) {
                TokenizedLine::Fields(fields) => collected.rows.push(PendingRow {
                    line_number: index + 1,
                    section: collected.sections.len() - 1,
                    fields: Ok(fields),
                }),
                TokenizedLine::Skip(SkipKind::Header(titles)) => {
                    report.record_skip();
                    let resolved = resolver.observe_header(&titles).clone();
                    collected.sections.push(resolved);
                }
                TokenizedLine::Skip(_) => report.record_skip(),
            }
        }

        collected
    }

    fn finish(&self, collected: Collected, mut report: ParseReport) -> ParsedLog {
        let settings = self.config.extractor_settings();
        let outcomes = extract_rows(&collected, &settings);

        let mut validator = RecordValidator::new();
        let mut records = Vec::with_capacity(collected.rows.len());
        for (row, outcome) in collected.rows.iter().zip(outcomes) {
            let candidate = match outcome {
                Ok(candidate) => candidate,
                Err(err) => {
                    debug!("line {}: {}", row.line_number, err);
                    report.record_extraction_error(row.line_number, &err);
                    continue;
                }
            };
            match validator.validate(candidate) {
                Ok(record) => {
                    if let ResolvedLayout::Resolved(map) = &collected.sections[row.section] {
                        report.layout = Some(map.layout);
                    }
                    report.record_accept();
                    records.push(record);
                }
                Err(err) => {
                    debug!("line {}: {}", row.line_number, err);
                    report.record_validation_error(row.line_number, &err);
                }
            }
        }
        report.voter_set_size = validator.voter_set_size();

        if report.rejected > 0 {
            warn!("{} of {} data lines rejected", report.rejected, report.data_lines());
        }
        info!("{}", report);

        ParsedLog { records, report }
    }
}

/// Split on `\n` the way `str::lines` does: no trailing empty line, and a
/// `\r` before the newline is left for the tokenizer to strip.
fn byte_lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    (!bytes.is_empty())
        .then(|| body.split(|&b| b == b'\n'))
        .into_iter()
        .flatten()
}

fn extract_one(
    row: &PendingRow,
    sections: &[ResolvedLayout],
    settings: &ExtractorSettings,
) -> Result<CandidateRecord, ExtractionError> {
    let fields = row
        .fields
        .as_ref()
        .map_err(|reason| ExtractionError::Malformed {
            reason: reason.clone(),
        })?;
    match &sections[row.section] {
        ResolvedLayout::Resolved(map) => extract(row.line_number, fields, map, settings),
        ResolvedLayout::Unresolved { missing } => Err(ExtractionError::UnresolvedHeader {
            missing: missing.clone(),
        }),
    }
}

#[cfg(not(feature = "parallel"))]
fn extract_rows(
    collected: &Collected,
    settings: &ExtractorSettings,
) -> Vec<Result<CandidateRecord, ExtractionError>> {
    collected
        .rows
        .iter()
        .map(|row| extract_one(row, &collected.sections, settings))
        .collect()
}

#[cfg(feature = "parallel")]
fn extract_rows(
    collected: &Collected,
    settings: &ExtractorSettings,
) -> Vec<Result<CandidateRecord, ExtractionError>> {
    use rayon::prelude::*;

    collected
        .rows
        .par_iter()
        .map(|row| extract_one(row, &collected.sections, settings))
        .collect()
}

/// Pick a format from the file extension, then from the first non-blank line.
pub fn detect_format(path: Option<&Path>, text: &str) -> SourceFormat {
    let is_csv_path = path
        .and_then(Path::extension)
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv_path {
        return SourceFormat::Csv;
    }

    let Some(first) = text.lines().find(|line| !line.trim().is_empty()) else {
        return SourceFormat::BoxTable;
    };
    let framed = first.contains(['│', '|'])
        || matches!(tokenize(first), TokenizedLine::Skip(SkipKind::Border));
    if !framed && first.contains(',') {
        SourceFormat::Csv
    } else {
        SourceFormat::BoxTable
    }
}

//! Parse report returned alongside the accepted records, so that rejected
//! lines are counted and sampled instead of silently dropped.

use serde::{Deserialize, Serialize};

use crate::extractor::ExtractionError;
use crate::record::LayoutKind;
use crate::validator::ValidationError;

/// Which stage rejected a line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Extraction,
    Validation,
}

/// One sampled rejection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rejection {
    pub line_number: usize,
    pub kind: RejectionKind,
    pub reason: String,
}

/// Counts and samples for one parse run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ParseReport {
    /// Every line (or CSV row) seen, including skipped ones
    pub total_lines: usize,
    /// Borders, headers, blank and unframed lines
    pub skipped_lines: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub extraction_errors: usize,
    pub validation_errors: usize,
    /// Layout of the last resolved table section
    pub layout: Option<LayoutKind>,
    /// Ballots per record, when the run carried ballots
    pub voter_set_size: Option<usize>,
    /// First rejections, in line order
    pub samples: Vec<Rejection>,
    #[serde(skip)]
    max_samples: usize,
}

impl ParseReport {
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples,
            ..Default::default()
        }
    }

    pub fn record_skip(&mut self) {
        self.total_lines += 1;
        self.skipped_lines += 1;
    }

    pub fn record_accept(&mut self) {
        self.total_lines += 1;
        self.accepted += 1;
    }

    pub fn record_extraction_error(&mut self, line_number: usize, error: &ExtractionError) {
        self.extraction_errors += 1;
        self.reject(line_number, RejectionKind::Extraction, error.to_string());
    }

    pub fn record_validation_error(&mut self, line_number: usize, error: &ValidationError) {
        self.validation_errors += 1;
        self.reject(line_number, RejectionKind::Validation, error.to_string());
    }

    fn reject(&mut self, line_number: usize, kind: RejectionKind, reason: String) {
        self.total_lines += 1;
        self.rejected += 1;
        if self.samples.len() < self.max_samples {
            self.samples.push(Rejection {
                line_number,
                kind,
                reason,
            });
        }
    }

    /// Lines that reached the extractor
    pub fn data_lines(&self) -> usize {
        self.accepted + self.rejected
    }

    pub fn is_clean(&self) -> bool {
        self.rejected == 0
    }

    /// Fraction of data lines rejected; zero when there were none
    pub fn rejection_rate(&self) -> f64 {
        match self.data_lines() {
            0 => 0.0,
            n => self.rejected as f64 / n as f64,
        }
    }
}

impl std::fmt::Display for ParseReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} lines: {} accepted, {} rejected ({} extraction, {} validation), {} skipped",
            self.total_lines,
            self.accepted,
            self.rejected,
            self.extraction_errors,
            self.validation_errors,
            self.skipped_lines
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_samples() {
        let mut report = ParseReport::new(2);
        report.record_skip();
        report.record_accept();
        report.record_extraction_error(3, &ExtractionError::InvalidBallot { token: "x".into() });
        report.record_validation_error(
            4,
            &ValidationError::BallotLengthMismatch {
                expected: 5,
                found: 6,
            },
        );
        report.record_extraction_error(5, &ExtractionError::TooFewFields { expected: 5, found: 1 });

        assert_eq!(report.total_lines, 5);
        assert_eq!(report.skipped_lines, 1);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, 3);
        assert_eq!(report.extraction_errors, 2);
        assert_eq!(report.validation_errors, 1);
        assert_eq!(report.samples.len(), 2);
        assert_eq!(report.samples[0].line_number, 3);
        assert_eq!(report.samples[1].kind, RejectionKind::Validation);
        assert!(report.samples[1].reason.contains("6 entries"));
        assert!(!report.is_clean());
        assert!((report.rejection_rate() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_report() {
        let report = ParseReport::new(10);
        assert!(report.is_clean());
        assert_eq!(report.rejection_rate(), 0.0);
        assert_eq!(
            report.to_string(),
            "0 lines: 0 accepted, 0 rejected (0 extraction, 0 validation), 0 skipped"
        );
    }
}

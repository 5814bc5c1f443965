//! # Record Extractor
//!
//! Decodes one row of fields into a [`CandidateRecord`] using the active
//! [`ColumnMap`]. Every failure is scoped to the row it came from.

use thiserror::Error;

use crate::config::DEFAULT_HONESTY_THRESHOLD;
use crate::layout::{Column, ColumnMap};
use crate::record::{CandidateRecord, LayoutKind, StatusSource};
use crate::NodeId;

/// A data row that could not be decoded into a candidate record
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("layout has no '{field}' column")]
    MissingColumn { field: &'static str },

    #[error("field '{field}' is not an integer: '{value}'")]
    NonNumeric { field: &'static str, value: String },

    #[error("invalid proposer field '{value}'")]
    InvalidProposer { value: String },

    #[error("invalid ballot token '{token}'")]
    InvalidBallot { token: String },

    #[error("row follows a header without {}", missing.join(", "))]
    UnresolvedHeader { missing: Vec<&'static str> },

    #[error("field '{field}' is not a boolean: '{value}'")]
    InvalidFlag { field: &'static str, value: String },

    #[error("malformed row: {reason}")]
    Malformed { reason: String },
}

/// Knobs the extractor needs from the analyzer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorSettings {
    /// Untagged proposers with an id below this value are honest
    pub honesty_threshold: NodeId,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            honesty_threshold: DEFAULT_HONESTY_THRESHOLD,
        }
    }
}

/// Decode one row according to `map`.
pub fn extract<S: AsRef<str>>(
    line_number: usize,
    fields: &[S],
    map: &ColumnMap,
    settings: &ExtractorSettings,
) -> Result<CandidateRecord, ExtractionError> {
    if fields.len() < map.min_fields {
        return Err(ExtractionError::TooFewFields {
            expected: map.min_fields,
            found: fields.len(),
        });
    }

    let block_number = map
        .block
        .map(|column| parse_int("block", field(fields, column, map.min_fields)?))
        .transpose()?;
    let proposer = map
        .proposer
        .map(|column| parse_proposer(field(fields, column, map.min_fields)?))
        .transpose()?;
    let blob_id = parse_int("blob_id", field(fields, map.blob, map.min_fields)?)?;

    let (proposer_id, proposer_is_malicious, proposer_status_source) = match proposer {
        Some((id, Some(is_malicious))) => (Some(id), is_malicious, StatusSource::Tag),
        // Negative ids are rejected by the validator; the flag is irrelevant for them.
        Some((id, None)) => (
            Some(id),
            u64::try_from(id).map_or(false, |id| id >= settings.honesty_threshold),
            StatusSource::Threshold,
        ),
        None => (None, false, StatusSource::Unknown),
    };
    let confirmed = map
        .confirmed
        .map(|column| parse_flag("confirmed", field(fields, column, map.min_fields)?))
        .transpose()?;

    let (ballots, honest_votes, malicious_votes) = match map.layout {
        LayoutKind::Counted => {
            let honest = required(map.honest, "honest_votes")?;
            let malicious = required(map.malicious, "malicious_votes")?;
            (
                None,
                parse_int("honest_votes", field(fields, honest, map.min_fields)?)?,
                parse_int("malicious_votes", field(fields, malicious, map.min_fields)?)?,
            )
        }
        LayoutKind::Bitstring => {
            let column = required(map.ballots, "ballots")?;
            let ballots = parse_ballots(field(fields, column, map.min_fields)?)?;
            let yes = ballots.iter().filter(|&&b| b).count() as i64;
            let no = ballots.len() as i64 - yes;
            (Some(ballots), yes, no)
        }
    };

    Ok(CandidateRecord {
        line_number,
        block_number,
        proposer_id,
        proposer_is_malicious,
        proposer_status_source,
        blob_id,
        ballots,
        honest_votes,
        malicious_votes,
        confirmed,
    })
}

fn field<S: AsRef<str>>(
    fields: &[S],
    column: Column,
    expected: usize,
) -> Result<&str, ExtractionError> {
    column
        .resolve(fields.len())
        .map(|i| fields[i].as_ref())
        .ok_or(ExtractionError::TooFewFields {
            expected,
            found: fields.len(),
        })
}

fn required(column: Option<Column>, field: &'static str) -> Result<Column, ExtractionError> {
    column.ok_or(ExtractionError::MissingColumn { field })
}

fn parse_int(field: &'static str, value: &str) -> Result<i64, ExtractionError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| ExtractionError::NonNumeric {
            field,
            value: value.to_string(),
        })
}

fn parse_flag(field: &'static str, value: &str) -> Result<bool, ExtractionError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ExtractionError::InvalidFlag {
            field,
            value: value.to_string(),
        }),
    }
}

/// Split `8271(malicious)` into the id and, when the label is recognised,
/// whether it marks the proposer malicious.
pub fn parse_proposer(value: &str) -> Result<(i64, Option<bool>), ExtractionError> {
    let value = value.trim();
    let Some(open) = value.find('(') else {
        return Ok((parse_int("proposer", value)?, None));
    };

    let label = value[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| ExtractionError::InvalidProposer {
            value: value.to_string(),
        })?;
    let id = parse_int("proposer", &value[..open])?;
    let tag = match label.trim().to_ascii_lowercase().as_str() {
        "malicious" => Some(true),
        "honest" => Some(false),
        _ => None,
    };
    Ok((id, tag))
}

/// Parse `1, 0, 1` (or `1(honest);0(malicious)`) into one bool per voter.
pub fn parse_ballots(value: &str) -> Result<Vec<bool>, ExtractionError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }

    value
        .split([',', ';'])
        .map(|token| {
            let token = token.trim();
            let bit = token.split_once('(').map_or(token, |(bit, _)| bit.trim());
            match bit {
                "1" => Ok(true),
                "0" => Ok(false),
                _ => Err(ExtractionError::InvalidBallot {
                    token: token.to_string(),
                }),
            }
        })
        .collect()
}

//! # Record Validator
//!
//! Turns extractor candidates into immutable [`VoteRecord`]s. Besides the
//! per-field checks, the validator owns the one piece of run-level state: the
//! voter-set size, fixed by the first accepted record that carries ballots.

use thiserror::Error;

use crate::record::{CandidateRecord, VoteRecord};

/// A decoded record that breaks a field-level or run-level invariant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("ballot vector has {found} entries, run voter set has {expected}")]
    BallotLengthMismatch { expected: usize, found: usize },

    #[error("{field} is required when {present} is present")]
    MissingField {
        field: &'static str,
        present: &'static str,
    },
}

/// Stateful validator for one parse run
#[derive(Debug, Clone, Default)]
pub struct RecordValidator {
    voter_set_size: Option<usize>,
}

impl RecordValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Voter-set size established so far, if any ballot vector was accepted
    pub fn voter_set_size(&self) -> Option<usize> {
        self.voter_set_size
    }

    pub fn validate(&mut self, candidate: CandidateRecord) -> Result<VoteRecord, ValidationError> {
        let block_number = candidate
            .block_number
            .map(|value| non_negative("block_number", value))
            .transpose()?;
        let blob_id = non_negative("blob_id", candidate.blob_id)?;
        let proposer_id = candidate
            .proposer_id
            .map(|value| non_negative("proposer_id", value))
            .transpose()?;
        let honest_votes = non_negative("honest_votes", candidate.honest_votes)?;
        let malicious_votes = non_negative("malicious_votes", candidate.malicious_votes)?;

        if let Some(ballots) = &candidate.ballots {
            match self.voter_set_size {
                Some(expected) if expected != ballots.len() => {
                    return Err(ValidationError::BallotLengthMismatch {
                        expected,
                        found: ballots.len(),
                    });
                }
                Some(_) => {}
                None => self.voter_set_size = Some(ballots.len()),
            }
        }

        let record = match (block_number, proposer_id) {
            (Some(block_number), Some(proposer_id)) => VoteRecord::new(
                candidate.line_number,
                block_number,
                proposer_id,
                candidate.proposer_is_malicious,
                candidate.proposer_status_source,
                blob_id,
                candidate.ballots,
                honest_votes,
                malicious_votes,
            ),
            (None, None) => {
                VoteRecord::blob_summary(candidate.line_number, blob_id, honest_votes, malicious_votes)
            }
            (Some(_), None) => {
                return Err(ValidationError::MissingField {
                    field: "proposer_id",
                    present: "block_number",
                })
            }
            (None, Some(_)) => {
                return Err(ValidationError::MissingField {
                    field: "block_number",
                    present: "proposer_id",
                })
            }
        };
        Ok(record.with_confirmed(candidate.confirmed))
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, ValidationError> {
    u64::try_from(value).map_err(|_| ValidationError::Negative { field, value })
}

//! Record model shared by every pipeline stage.

use serde::{Deserialize, Serialize};

use crate::{BlobId, BlockNumber, NodeId};

/// How a source encodes votes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// Separate honest and malicious vote count columns
    Counted,
    /// One column holding a `0`/`1` token per voter
    Bitstring,
}

impl Default for LayoutKind {
    fn default() -> Self {
        LayoutKind::Counted
    }
}

impl std::str::FromStr for LayoutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counted" => Ok(LayoutKind::Counted),
            "bitstring" => Ok(LayoutKind::Bitstring),
            other => Err(format!("unknown layout '{}'", other)),
        }
    }
}

/// Which input decided `proposer_is_malicious`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// An explicit `(honest)` / `(malicious)` tag in the proposer field
    Tag,
    /// The proposer id compared against the honesty threshold
    Threshold,
    /// The source has no proposer column (blob summaries)
    Unknown,
}

/// Output of the extractor, before run-level validation.
///
/// Numeric fields are signed so that negative values reach the validator
/// as a validation failure rather than a parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub line_number: usize,
    /// `None` for blob-summary rows, which carry no block column
    pub block_number: Option<i64>,
    /// `None` for blob-summary rows, which carry no proposer column
    pub proposer_id: Option<i64>,
    pub proposer_is_malicious: bool,
    pub proposer_status_source: StatusSource,
    pub blob_id: i64,
    pub ballots: Option<Vec<bool>>,
    pub honest_votes: i64,
    pub malicious_votes: i64,
    pub confirmed: Option<bool>,
}

/// One (block, blob) observation, or one blob outcome from a blob summary.
/// Immutable once built.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VoteRecord {
    line_number: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_number: Option<BlockNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proposer_id: Option<NodeId>,
    proposer_is_malicious: bool,
    proposer_status_source: StatusSource,
    blob_id: BlobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    ballots: Option<Vec<bool>>,
    honest_votes: u64,
    malicious_votes: u64,
    total_votes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirmed: Option<bool>,
}

impl VoteRecord {
    /// Build a record; `total_votes` is always derived from the two counts
    /// and saturates at `u64::MAX`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        line_number: usize,
        block_number: BlockNumber,
        proposer_id: NodeId,
        proposer_is_malicious: bool,
        proposer_status_source: StatusSource,
        blob_id: BlobId,
        ballots: Option<Vec<bool>>,
        honest_votes: u64,
        malicious_votes: u64,
    ) -> Self {
        Self {
            line_number,
            block_number: Some(block_number),
            proposer_id: Some(proposer_id),
            proposer_is_malicious,
            proposer_status_source,
            blob_id,
            ballots,
            honest_votes,
            malicious_votes,
            total_votes: honest_votes.saturating_add(malicious_votes),
            confirmed: None,
        }
    }

    /// Build a blob outcome from a source without block or proposer columns
    pub fn blob_summary(
        line_number: usize,
        blob_id: BlobId,
        honest_votes: u64,
        malicious_votes: u64,
    ) -> Self {
        Self {
            line_number,
            block_number: None,
            proposer_id: None,
            proposer_is_malicious: false,
            proposer_status_source: StatusSource::Unknown,
            blob_id,
            ballots: None,
            honest_votes,
            malicious_votes,
            total_votes: honest_votes.saturating_add(malicious_votes),
            confirmed: None,
        }
    }

    pub fn with_confirmed(mut self, confirmed: Option<bool>) -> Self {
        self.confirmed = confirmed;
        self
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Block the blob was proposed in; `None` for blob-summary rows
    pub fn block_number(&self) -> Option<BlockNumber> {
        self.block_number
    }

    pub fn proposer_id(&self) -> Option<NodeId> {
        self.proposer_id
    }

    pub fn proposer_is_malicious(&self) -> bool {
        self.proposer_is_malicious
    }

    pub fn proposer_status_source(&self) -> StatusSource {
        self.proposer_status_source
    }

    pub fn blob_id(&self) -> BlobId {
        self.blob_id
    }

    /// Per-voter ballots, present only for bitstring sources
    pub fn ballots(&self) -> Option<&[bool]> {
        self.ballots.as_deref()
    }

    pub fn honest_votes(&self) -> u64 {
        self.honest_votes
    }

    pub fn malicious_votes(&self) -> u64 {
        self.malicious_votes
    }

    pub fn total_votes(&self) -> u64 {
        self.total_votes
    }

    /// Whether the producer marked the blob confirmed, when the source says
    pub fn confirmed(&self) -> Option<bool> {
        self.confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_is_recomputed() {
        let record = VoteRecord::new(1, 4, 150, false, StatusSource::Threshold, 9, None, 3, 1);
        assert_eq!(record.total_votes(), 4);
        assert_eq!(
            record.honest_votes() + record.malicious_votes(),
            record.total_votes()
        );
    }

    #[test]
    fn test_ballots_accessor() {
        let record = VoteRecord::new(
            7,
            1,
            2,
            true,
            StatusSource::Tag,
            3,
            Some(vec![true, false]),
            1,
            1,
        );
        assert_eq!(record.ballots(), Some(&[true, false][..]));
        assert_eq!(record.line_number(), 7);
    }

    #[test]
    fn test_blob_summary_record() {
        let record = VoteRecord::blob_summary(2, 11, 6, 4).with_confirmed(Some(true));
        assert_eq!(record.block_number(), None);
        assert_eq!(record.proposer_id(), None);
        assert_eq!(record.proposer_status_source(), StatusSource::Unknown);
        assert!(!record.proposer_is_malicious());
        assert_eq!(record.total_votes(), 10);
        assert_eq!(record.confirmed(), Some(true));

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("block_number").is_none());
        assert_eq!(json["confirmed"], true);
    }

    #[test]
    fn test_total_saturates() {
        let record = VoteRecord::new(1, 1, 1, false, StatusSource::Threshold, 0, None, u64::MAX, 5);
        assert_eq!(record.total_votes(), u64::MAX);
    }

    #[test]
    fn test_layout_from_str() {
        assert_eq!("Counted".parse::<LayoutKind>(), Ok(LayoutKind::Counted));
        assert_eq!(" bitstring ".parse::<LayoutKind>(), Ok(LayoutKind::Bitstring));
        assert!("matrix".parse::<LayoutKind>().is_err());
    }
}

//! # Aggregator
//!
//! Pure functions from an accepted record sequence to read-only views:
//!
//! - **Per-block / per-blob views**: vote sums per group plus descriptive
//!   statistics over those sums
//! - **Rolling averages**: trailing or centred windows over a grouped series,
//!   with edge positions reported as missing
//! - **Voter correlation**: Pearson matrix across per-voter ballot columns
//!
//! Nothing here keeps state between calls; the same records always produce
//! equal views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};

use crate::record::VoteRecord;

/// Rolling window used for the per-block series
pub const DEFAULT_BLOCK_WINDOW: usize = 50;

/// Rolling window used for the per-blob series
pub const DEFAULT_BLOB_WINDOW: usize = 100;

/// Grouping key of an [`AggregateView`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    Block,
    Blob,
}

impl Grouping {
    /// Blob-summary records have no block and stay out of the per-block view
    fn key(self, record: &VoteRecord) -> Option<u64> {
        match self {
            Grouping::Block => record.block_number(),
            Grouping::Blob => Some(record.blob_id()),
        }
    }
}

/// Sums for one group. Vote sums saturate at `u64::MAX`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GroupTotals {
    /// Records folded into this group
    pub observations: usize,
    pub honest_votes: u64,
    pub malicious_votes: u64,
    pub total_votes: u64,
    /// Records whose proposer was malicious
    pub malicious_proposals: usize,
    /// Records the producer marked confirmed
    pub confirmed: usize,
}

impl GroupTotals {
    fn add(&mut self, record: &VoteRecord) {
        self.observations += 1;
        self.honest_votes = self.honest_votes.saturating_add(record.honest_votes());
        self.malicious_votes = self.malicious_votes.saturating_add(record.malicious_votes());
        self.total_votes = self.total_votes.saturating_add(record.total_votes());
        if record.proposer_is_malicious() {
            self.malicious_proposals += 1;
        }
        if record.confirmed() == Some(true) {
            self.confirmed += 1;
        }
    }
}

/// Descriptive statistics over one series. Undefined values are `None`:
/// everything for an empty series, the standard deviation below two points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SeriesStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// Sample standard deviation (n - 1 denominator)
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SeriesStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let std_dev = if values.len() >= 2 {
            Some(Statistics::std_dev(values.iter()))
        } else {
            None
        };

        Self {
            count: values.len(),
            mean: Some(Statistics::mean(values.iter())),
            median: Some(Data::new(values.to_vec()).median()),
            std_dev,
            min: Some(Statistics::min(values.iter())),
            max: Some(Statistics::max(values.iter())),
        }
    }
}

/// Statistics for the three vote series of a view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct VoteStatistics {
    pub honest: SeriesStats,
    pub malicious: SeriesStats,
    pub total: SeriesStats,
}

/// Read-only projection of the records onto one grouping key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateView {
    pub grouping: Grouping,
    pub groups: BTreeMap<u64, GroupTotals>,
    pub statistics: VoteStatistics,
}

impl AggregateView {
    pub fn build(grouping: Grouping, records: &[VoteRecord]) -> Self {
        let mut groups: BTreeMap<u64, GroupTotals> = BTreeMap::new();
        for record in records {
            if let Some(key) = grouping.key(record) {
                groups.entry(key).or_default().add(record);
            }
        }

        let mut view = Self {
            grouping,
            groups,
            statistics: VoteStatistics::default(),
        };
        view.statistics = VoteStatistics {
            honest: SeriesStats::from_values(&view.honest_series()),
            malicious: SeriesStats::from_values(&view.malicious_series()),
            total: SeriesStats::from_values(&view.total_series()),
        };
        view
    }

    pub fn group(&self, key: u64) -> Option<&GroupTotals> {
        self.groups.get(&key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups holding at least one confirmed record
    pub fn confirmed_groups(&self) -> usize {
        self.groups.values().filter(|g| g.confirmed > 0).count()
    }

    /// Group keys in ascending order
    pub fn keys(&self) -> Vec<u64> {
        self.groups.keys().copied().collect()
    }

    pub fn honest_series(&self) -> Vec<f64> {
        self.series(|g| g.honest_votes)
    }

    pub fn malicious_series(&self) -> Vec<f64> {
        self.series(|g| g.malicious_votes)
    }

    pub fn total_series(&self) -> Vec<f64> {
        self.series(|g| g.total_votes)
    }

    fn series(&self, pick: impl Fn(&GroupTotals) -> u64) -> Vec<f64> {
        self.groups.values().map(|g| pick(g) as f64).collect()
    }

    /// Rolling means of the three series, in key order
    pub fn rolling(&self, window: RollingWindow) -> RollingSeries {
        RollingSeries {
            grouping: self.grouping,
            window,
            keys: self.keys(),
            honest: rolling_mean(&self.honest_series(), window),
            malicious: rolling_mean(&self.malicious_series(), window),
            total: rolling_mean(&self.total_series(), window),
        }
    }
}

/// Sliding window parameters. No `Default`: centering is always spelled out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RollingWindow {
    pub size: usize,
    pub centered: bool,
}

impl RollingWindow {
    pub fn new(size: usize, centered: bool) -> Self {
        Self { size, centered }
    }

    pub fn trailing(size: usize) -> Self {
        Self::new(size, false)
    }

    pub fn centered(size: usize) -> Self {
        Self::new(size, true)
    }
}

/// Mean over a sliding window of `window.size` consecutive points.
///
/// A trailing window ends at the current index. A centred window starts
/// `(size - 1) / 2` points before it, so even sizes lean one point forward.
/// Positions where the window would leave the series are `None`.
pub fn rolling_mean(values: &[f64], window: RollingWindow) -> Vec<Option<f64>> {
    let size = window.size;
    if size == 0 || size > values.len() {
        return vec![None; values.len()];
    }

    let lead = if window.centered { (size - 1) / 2 } else { size - 1 };
    (0..values.len())
        .map(|i| {
            let start = i.checked_sub(lead)?;
            let slice = values.get(start..start + size)?;
            Some(slice.iter().sum::<f64>() / size as f64)
        })
        .collect()
}

/// Rolling means for one view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollingSeries {
    pub grouping: Grouping,
    pub window: RollingWindow,
    pub keys: Vec<u64>,
    pub honest: Vec<Option<f64>>,
    pub malicious: Vec<Option<f64>>,
    pub total: Vec<Option<f64>>,
}

/// Pairwise Pearson correlation between voters' ballot columns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationMatrix {
    pub voters: usize,
    /// Row-major `voters x voters`; the diagonal is 1.0, pairs involving a
    /// constant column are `None`
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    /// Build from records that all carry equally long ballot vectors. Returns
    /// `None` when any record lacks ballots or fewer than two records exist.
    pub fn from_records(records: &[VoteRecord]) -> Option<Self> {
        if records.len() < 2 {
            return None;
        }

        let ballots: Vec<&[bool]> = records
            .iter()
            .map(|r| r.ballots())
            .collect::<Option<Vec<_>>>()?;
        let voters = ballots[0].len();
        if voters == 0 || ballots.iter().any(|b| b.len() != voters) {
            return None;
        }

        let columns: Vec<Vec<f64>> = (0..voters)
            .map(|v| ballots.iter().map(|b| if b[v] { 1.0 } else { 0.0 }).collect())
            .collect();
        let std_devs: Vec<f64> = columns
            .iter()
            .map(|c| Statistics::std_dev(c.iter()))
            .collect();

        let mut values = vec![vec![None; voters]; voters];
        for i in 0..voters {
            values[i][i] = Some(1.0);
            for j in (i + 1)..voters {
                let denominator = std_devs[i] * std_devs[j];
                let r = if denominator > 0.0 {
                    let covariance = Statistics::covariance(columns[i].iter(), columns[j].iter());
                    Some((covariance / denominator).clamp(-1.0, 1.0))
                } else {
                    None
                };
                values[i][j] = r;
                values[j][i] = r;
            }
        }

        Some(Self { voters, values })
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.values.get(i)?.get(j).copied().flatten()
    }

    /// Mean of the defined off-diagonal correlations, each pair counted once
    pub fn mean_pairwise(&self) -> Option<f64> {
        let pairs: Vec<f64> = (0..self.voters)
            .flat_map(|i| ((i + 1)..self.voters).map(move |j| (i, j)))
            .filter_map(|(i, j)| self.get(i, j))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.iter().sum::<f64>() / pairs.len() as f64)
        }
    }
}

/// All views derived from one record sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Aggregates {
    pub per_block: AggregateView,
    pub per_blob: AggregateView,
    pub voter_correlation: Option<CorrelationMatrix>,
}

/// Group by block and by blob and compute voter correlation when ballots
/// are available.
pub fn aggregate(records: &[VoteRecord]) -> Aggregates {
    Aggregates {
        per_block: AggregateView::build(Grouping::Block, records),
        per_blob: AggregateView::build(Grouping::Blob, records),
        voter_correlation: CorrelationMatrix::from_records(records),
    }
}

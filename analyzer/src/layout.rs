//! # Layout Resolution
//!
//! Producer versions disagree on column order, column count and on whether
//! votes come as per-voter ballots or as two counts. A [`ColumnMap`] records
//! where each logical field lives; [`LayoutResolver`] builds one from header
//! titles, or from a layout hint when the table has no header.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::record::LayoutKind;

/// Position of a logical field inside a row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Column {
    /// Zero-based index from the start of the row
    Index(usize),
    /// One-based position from the end of the row (`FromEnd(1)` is the last field)
    FromEnd(usize),
}

impl Column {
    /// Resolve against a row of `len` fields
    pub fn resolve(self, len: usize) -> Option<usize> {
        match self {
            Column::Index(i) if i < len => Some(i),
            Column::FromEnd(k) if k >= 1 && k <= len => Some(len - k),
            _ => None,
        }
    }
}

/// Where the logical fields of one layout live
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMap {
    pub layout: LayoutKind,
    /// `None` only for the blob-summary schema
    pub block: Option<Column>,
    /// `None` only for the blob-summary schema
    pub proposer: Option<Column>,
    pub blob: Column,
    pub ballots: Option<Column>,
    pub honest: Option<Column>,
    pub malicious: Option<Column>,
    pub confirmed: Option<Column>,
    /// Fewest fields a row needs for every mapped column to exist
    pub min_fields: usize,
}

impl ColumnMap {
    /// Positional map for headerless tables
    pub fn positional(layout: LayoutKind) -> Self {
        match layout {
            LayoutKind::Counted => Self {
                layout,
                block: Some(Column::Index(0)),
                proposer: Some(Column::Index(1)),
                blob: Column::Index(2),
                ballots: None,
                honest: Some(Column::FromEnd(2)),
                malicious: Some(Column::FromEnd(1)),
                confirmed: None,
                min_fields: 5,
            },
            LayoutKind::Bitstring => Self {
                layout,
                block: Some(Column::Index(0)),
                proposer: Some(Column::Index(1)),
                blob: Column::Index(2),
                ballots: Some(Column::Index(3)),
                honest: None,
                malicious: None,
                confirmed: None,
                min_fields: 4,
            },
        }
    }

    /// Build a map from header titles, selecting the layout from which vote
    /// columns are present.
    ///
    /// A header with neither block nor proposer column resolves to the
    /// blob-summary schema (`blob_id,total_votes,honest_votes,malicious_votes,confirmed`)
    /// only when it carries both counts and a `confirmed` column. Other
    /// block-less tables repeat the per-block rows and stay unresolved.
    pub fn from_titles<S: AsRef<str>>(titles: &[S]) -> Result<Self, Vec<&'static str>> {
        let mut roles: IndexMap<Role, usize> = IndexMap::new();
        for (index, title) in titles.iter().enumerate() {
            match classify_title(title.as_ref()) {
                Some(role) => {
                    // Keep the first column claiming a role.
                    roles.entry(role).or_insert(index);
                }
                None => debug!("ignoring column '{}'", title.as_ref()),
            }
        }

        let has_counts = roles.contains_key(&Role::Honest) && roles.contains_key(&Role::Malicious);
        let blob_summary = has_counts
            && roles.contains_key(&Role::Confirmed)
            && !roles.contains_key(&Role::Block)
            && !roles.contains_key(&Role::Proposer);

        let mut missing = Vec::new();
        for (role, name) in [
            (Role::Block, "block"),
            (Role::Proposer, "proposer"),
            (Role::Blob, "blob"),
        ] {
            let optional = blob_summary && role != Role::Blob;
            if !optional && !roles.contains_key(&role) {
                missing.push(name);
            }
        }

        let column = |role: Role| roles.get(&role).copied().map(Column::Index);
        let (layout, ballots) = if blob_summary {
            (LayoutKind::Counted, None)
        } else if let Some(ballots) = column(Role::Bitstring) {
            (LayoutKind::Bitstring, Some(ballots))
        } else if has_counts {
            // Annotated vote lists next to count columns only hold the non-zero
            // votes, so the counts are the source of truth.
            (LayoutKind::Counted, None)
        } else if let Some(ballots) = column(Role::AnnotatedBallots) {
            (LayoutKind::Bitstring, Some(ballots))
        } else {
            missing.push("votes");
            (LayoutKind::Counted, None)
        };

        if !missing.is_empty() {
            return Err(missing);
        }

        let (honest, malicious) = match layout {
            LayoutKind::Counted => (column(Role::Honest), column(Role::Malicious)),
            LayoutKind::Bitstring => (None, None),
        };
        let min_fields = roles.values().copied().max().map_or(0, |max| max + 1);

        Ok(Self {
            layout,
            block: column(Role::Block),
            proposer: column(Role::Proposer),
            blob: Column::Index(roles[&Role::Blob]),
            ballots,
            honest,
            malicious,
            confirmed: column(Role::Confirmed),
            min_fields,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Role {
    Block,
    Proposer,
    Blob,
    Bitstring,
    AnnotatedBallots,
    Honest,
    Malicious,
    Confirmed,
}

/// Lowercase and drop everything that is not a letter or digit, so that
/// `Blob ID`, `blob_id` and `BlobId` compare equal.
fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn classify_title(title: &str) -> Option<Role> {
    let role = match normalize_title(title).as_str() {
        "block" | "blocknumber" => Role::Block,
        "proposer" | "proposerstatus" | "proposerid" => Role::Proposer,
        "blob" | "blobid" => Role::Blob,
        "votesbitstring" | "ballots" | "bitstring" | "votes" => Role::Bitstring,
        "votesstatus" => Role::AnnotatedBallots,
        "honestvotes" | "honest" => Role::Honest,
        "maliciousvotes" | "malicious" => Role::Malicious,
        "confirmed" | "isconfirmed" => Role::Confirmed,
        _ => return None,
    };
    Some(role)
}

/// Layout state for the current table section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLayout {
    Resolved(ColumnMap),
    /// The last header lacked required columns; rows under it cannot be decoded
    Unresolved { missing: Vec<&'static str> },
}

/// Tracks the active layout while walking a source top to bottom. Every
/// header row replaces the previous layout.
#[derive(Debug, Clone)]
pub struct LayoutResolver {
    current: ResolvedLayout,
    header_seen: bool,
}

impl LayoutResolver {
    /// Start with the positional map for `hint`, used until a header appears
    pub fn new(hint: LayoutKind) -> Self {
        Self {
            current: ResolvedLayout::Resolved(ColumnMap::positional(hint)),
            header_seen: false,
        }
    }

    pub fn observe_header<S: AsRef<str>>(&mut self, titles: &[S]) -> &ResolvedLayout {
        self.header_seen = true;
        self.current = match ColumnMap::from_titles(titles) {
            Ok(map) => {
                debug!("header resolved to {:?} layout", map.layout);
                ResolvedLayout::Resolved(map)
            }
            Err(missing) => {
                warn!("header lacks required columns: {}", missing.join(", "));
                ResolvedLayout::Unresolved { missing }
            }
        };
        &self.current
    }

    pub fn current(&self) -> &ResolvedLayout {
        &self.current
    }

    pub fn header_seen(&self) -> bool {
        self.header_seen
    }
}

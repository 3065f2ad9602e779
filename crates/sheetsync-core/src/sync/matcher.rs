//! Row Matcher
//!
//! Resolves each canonical record to at most one stored record. Records are
//! visited in sheet row order and stored candidates are consumed as they
//! match, so no stored record is matched twice. Strategies, in order:
//!
//! 1. `sheet_row_id` equal to the row id, unless the identities conflict
//! 2. normalized email
//! 3. normalized mobile and name together
//!
//! Once a row is matched by any strategy, other unmatched records sharing
//! its mobile + name pair are reported as ambiguous. Step 3 keeps the
//! earliest-created candidate. Ambiguous leftovers are never merged and
//! never offered for deletion, so repeated syncs leave them in place.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::error::RowIssue;
use crate::models::{CanonicalRecord, IdentityBundle, PersistedRecord};

/// How a pair was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    RowId,
    Email,
    MobileAndName,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::RowId => write!(f, "row_id"),
            MatchStrategy::Email => write!(f, "email"),
            MatchStrategy::MobileAndName => write!(f, "mobile_and_name"),
        }
    }
}

/// A sheet row and the stored record it resolved to
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub source: CanonicalRecord,
    pub persisted: PersistedRecord,
    pub strategy: MatchStrategy,
}

/// A matched row whose mobile + name is shared by other stored records
#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguousMatch {
    pub row_id: String,
    /// Record the row was matched to
    pub kept: i64,
    /// Records left untouched
    pub others: Vec<i64>,
}

impl AmbiguousMatch {
    pub fn issue(&self) -> RowIssue {
        RowIssue::AmbiguousDuplicate {
            kept: self.kept,
            others: self.others.clone(),
        }
    }
}

/// Matcher output
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub pairs: Vec<MatchedPair>,
    /// Rows with no stored counterpart (insert candidates)
    pub unmatched_source: Vec<CanonicalRecord>,
    /// Stored records with no row (delete candidates)
    pub unmatched_persisted: Vec<PersistedRecord>,
    /// Ambiguous rows; their leftover records are in neither list above
    pub ambiguous: Vec<AmbiguousMatch>,
}

struct Candidate {
    record: PersistedRecord,
    identity: IdentityBundle,
}

/// Match canonical records against a tenant's stored records
pub fn match_records(mut source: Vec<CanonicalRecord>, persisted: Vec<PersistedRecord>) -> MatchOutcome {
    source.sort_by_key(|r| r.sheet_row);

    let mut candidates: Vec<Candidate> = persisted
        .into_iter()
        .map(|record| Candidate {
            identity: record.identity(),
            record,
        })
        .collect();
    // Earliest-created first, so every lookup below prefers older records
    candidates.sort_by(|a, b| {
        (a.record.created_at, a.record.id).cmp(&(b.record.created_at, b.record.id))
    });

    let mut by_row_id: HashMap<String, Vec<usize>> = HashMap::new();
    let mut by_email: HashMap<String, Vec<usize>> = HashMap::new();
    let mut by_composite: HashMap<(String, String), Vec<usize>> = HashMap::new();
    for (i, c) in candidates.iter().enumerate() {
        if let Some(row_id) = &c.record.sheet_row_id {
            by_row_id.entry(row_id.clone()).or_default().push(i);
        }
        if let Some(email) = &c.identity.email {
            by_email.entry(email.clone()).or_default().push(i);
        }
        if let Some(key) = c.identity.composite_key() {
            by_composite.entry(key).or_default().push(i);
        }
    }

    let mut consumed = vec![false; candidates.len()];
    let mut matches: Vec<(CanonicalRecord, usize, MatchStrategy)> = Vec::new();
    let mut unmatched_source = Vec::new();
    let mut ambiguous: Vec<(String, usize, Vec<usize>)> = Vec::new();

    for record in source {
        let free = |idxs: Option<&Vec<usize>>| -> Vec<usize> {
            idxs.map(|v| v.iter().copied().filter(|i| !consumed[*i]).collect())
                .unwrap_or_default()
        };

        let by_row = free(by_row_id.get(record.row_id.as_str()))
            .into_iter()
            .find(|i| !candidates[*i].identity.conflicts_with(&record.identity));

        let found = if let Some(i) = by_row {
            Some((i, MatchStrategy::RowId))
        } else if let Some(i) = record
            .identity
            .email
            .as_deref()
            .and_then(|e| free(by_email.get(e)).first().copied())
        {
            Some((i, MatchStrategy::Email))
        } else {
            record
                .identity
                .composite_key()
                .and_then(|key| free(by_composite.get(&key)).first().copied())
                .map(|i| (i, MatchStrategy::MobileAndName))
        };

        match found {
            Some((i, strategy)) => {
                // Free records sharing the mobile + name pair are duplicates
                let key = record
                    .identity
                    .composite_key()
                    .or_else(|| candidates[i].identity.composite_key());
                let others: Vec<usize> = key
                    .map(|key| free(by_composite.get(&key)))
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|j| *j != i && !candidates[*j].identity.conflicts_with(&record.identity))
                    .collect();
                if !others.is_empty() {
                    ambiguous.push((record.row_id.clone(), i, others));
                }

                consumed[i] = true;
                debug!(
                    row_id = %record.row_id,
                    record_id = candidates[i].record.id,
                    %strategy,
                    "Matched row"
                );
                matches.push((record, i, strategy));
            }
            None => unmatched_source.push(record),
        }
    }

    // Leftovers a later row consumed are no longer ambiguous
    let ambiguous: Vec<AmbiguousMatch> = ambiguous
        .into_iter()
        .filter_map(|(row_id, kept, others)| {
            let others: Vec<usize> = others.into_iter().filter(|i| !consumed[*i]).collect();
            (!others.is_empty()).then(|| AmbiguousMatch {
                row_id,
                kept: candidates[kept].record.id,
                others: others.iter().map(|i| candidates[*i].record.id).collect(),
            })
        })
        .collect();
    let protected: HashSet<i64> = ambiguous.iter().flat_map(|a| a.others.iter().copied()).collect();

    let mut slots: Vec<Option<PersistedRecord>> = candidates.into_iter().map(|c| Some(c.record)).collect();

    let pairs = matches
        .into_iter()
        .filter_map(|(source, i, strategy)| {
            slots[i].take().map(|persisted| MatchedPair {
                source,
                persisted,
                strategy,
            })
        })
        .collect();

    let unmatched_persisted = slots
        .into_iter()
        .flatten()
        .filter(|r| !protected.contains(&r.id))
        .collect();

    MatchOutcome {
        pairs,
        unmatched_source,
        unmatched_persisted,
        ambiguous,
    }
}

use crate::error::{EngineError, Result};
use crate::index::EligibilityIndex;
use crate::normalize::categories::canonical_category;
use crate::types::{CutoffRecord, GroupKey, Quota};
use serde::{Deserialize, Serialize};

/// An eligibility request as it arrives from the caller, a flat key/value
/// shape so the excluded API layer can pass it through as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityQuery {
    pub rank: u64,
    pub category: String,
    pub quota: String,
    pub state: String,
    /// Omitted: query the latest round known for the state.
    #[serde(default)]
    pub round: Option<u32>,
    /// Case-insensitive substring filter on the program name.
    #[serde(default)]
    pub program_contains: Option<String>,
}

/// Aggregate view over a result set, for display next to the match rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySummary {
    pub total: usize,
    pub lowest_closing_rank: Option<u64>,
    pub mean_closing_rank: Option<u64>,
}

/// Answer an eligibility query against an index snapshot.
///
/// A record matches iff its group key equals the filter tuple and
/// `rank <= closing_rank`. Unknown filter values are caller errors,
/// distinct from an empty result; results come back ascending by closing
/// rank with a deterministic tie order.
pub fn run(index: &EligibilityIndex, query: &EligibilityQuery) -> Result<Vec<CutoffRecord>> {
    if query.rank < 1 {
        return Err(EngineError::InvalidInput(
            "rank must be a positive integer".to_string(),
        ));
    }

    let domain = index.state(&query.state).ok_or_else(|| {
        EngineError::UnknownFilterValue {
            field: "state",
            value: query.state.clone(),
        }
    })?;

    let quota = Quota::parse(&query.quota);
    if !domain.quotas.contains(&quota.key()) {
        return Err(EngineError::UnknownFilterValue {
            field: "quota",
            value: query.quota.clone(),
        });
    }

    let (category, _) = canonical_category(&query.category);
    if !domain.categories.contains(&category) {
        return Err(EngineError::UnknownFilterValue {
            field: "category",
            value: query.category.clone(),
        });
    }

    let round = match query.round {
        Some(round) => {
            if !domain.rounds.contains(&round) {
                return Err(EngineError::UnknownFilterValue {
                    field: "round",
                    value: round.to_string(),
                });
            }
            round
        }
        // Forward-looking eligibility cares about the most recent round.
        None => index
            .latest_round(&query.state)
            .expect("state with a domain always has at least one round"),
    };

    let key = GroupKey {
        state: query.state.clone(),
        quota,
        category,
        round,
    };
    let group = match index.group(&key) {
        Some(group) => group,
        None => return Ok(Vec::new()),
    };

    // Groups are sorted ascending by closing rank, so the eligible records
    // (closing_rank >= rank) form a suffix.
    let start = group.partition_point(|r| r.closing_rank < query.rank);
    let mut matches: Vec<CutoffRecord> = group[start..].to_vec();

    if let Some(needle) = &query.program_contains {
        let needle = needle.to_lowercase();
        matches.retain(|r| r.program_name.to_lowercase().contains(&needle));
    }

    crate::metrics::record_query(matches.len());
    Ok(matches)
}

pub fn summarize(matches: &[CutoffRecord]) -> QuerySummary {
    let lowest = matches.iter().map(|r| r.closing_rank).min();
    let mean = if matches.is_empty() {
        None
    } else {
        let sum: u64 = matches.iter().map(|r| r.closing_rank).sum();
        Some(sum / matches.len() as u64)
    };
    QuerySummary {
        total: matches.len(),
        lowest_closing_rank: lowest,
        mean_closing_rank: mean,
    }
}

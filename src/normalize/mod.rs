pub mod categories;
pub mod profiles;

use crate::error::{EngineError, Result};
use crate::types::{CutoffRecord, FileId, Quota, RowWarning};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use profiles::{ColumnProfile, ProfileKind};

/// The normalized output of one source file: records after deduplication
/// plus every row-level defect encountered along the way.
#[derive(Debug, Clone)]
pub struct NormalizedFile {
    pub records: Vec<CutoffRecord>,
    pub warnings: Vec<RowWarning>,
    pub profile: &'static str,
}

// Payload extractors for the aggregator's raw exports, where cells carry
// Python-literal dicts like {'name': 'X Medical College'} or
// {'closing_rank': '4521'}.
static NAME_PAYLOAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['"]name['"]\s*:\s*['"]([^'"]+)['"]"#).unwrap());
static CLOSING_PAYLOAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['"]closing_rank['"]\s*:\s*['"]?(-?[0-9][0-9,.]*)"#).unwrap());

fn extract_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.starts_with('{') {
        if let Some(caps) = NAME_PAYLOAD_RE.captures(trimmed) {
            return caps[1].trim().to_string();
        }
    }
    trimmed.to_string()
}

fn extract_closing(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.starts_with('{') {
        if let Some(caps) = CLOSING_PAYLOAD_RE.captures(trimmed) {
            return caps[1].to_string();
        }
    }
    trimmed.to_string()
}

/// Parse a closing-rank cell. Accepts thousands separators and the float
/// renderings some exports carry ("4521.0"); rejects anything non-positive.
fn parse_rank(cell: &str) -> std::result::Result<u64, String> {
    let cleaned = cell.trim().replace(',', "");
    if cleaned.is_empty() {
        return Err("empty closing rank".to_string());
    }
    if let Ok(rank) = cleaned.parse::<u64>() {
        if rank >= 1 {
            return Ok(rank);
        }
        return Err(format!("non-positive closing rank {cell:?}"));
    }
    if let Ok(value) = cleaned.parse::<f64>() {
        if value.is_finite() && value >= 0.5 {
            return Ok(value.round() as u64);
        }
        return Err(format!("non-positive closing rank {cell:?}"));
    }
    Err(format!("unparseable closing rank {cell:?}"))
}

fn state_key(raw: &str) -> String {
    raw.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

/// Rows under construction, keyed by the identity tuple. A later row with
/// the same tuple supersedes the earlier one while keeping its position, so
/// output order stays deterministic.
struct RowAccumulator {
    records: Vec<CutoffRecord>,
    by_tuple: HashMap<(String, String, String, String, String, u32), usize>,
}

impl RowAccumulator {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            by_tuple: HashMap::new(),
        }
    }

    fn push(&mut self, record: CutoffRecord) {
        match self.by_tuple.get(&record.tuple_key()) {
            Some(&slot) => {
                debug!(
                    program = %record.program_name,
                    round = record.round,
                    "duplicate tuple superseded by later row"
                );
                self.records[slot] = record;
            }
            None => {
                self.by_tuple.insert(record.tuple_key(), self.records.len());
                self.records.push(record);
            }
        }
    }
}

/// Normalize one raw spreadsheet export into cutoff records. Row-level
/// defects are downgraded to warnings; only an unrecognized column layout
/// (or unreadable file) fails the whole file.
pub fn normalize_file(path: &Path, file_id: FileId, state_hint: &str) -> Result<NormalizedFile> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let profile = profiles::detect(&headers).ok_or_else(|| EngineError::SchemaUnrecognized {
        file: path.display().to_string(),
    })?;

    let mut rows = RowAccumulator::new();
    let mut warnings = Vec::new();

    for (i, row) in reader.records().enumerate() {
        // 1-indexed plus the header row, matching what editors show.
        let line = i + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warnings.push(RowWarning::RowSkipped {
                    line,
                    reason: format!("malformed row: {e}"),
                });
                continue;
            }
        };
        normalize_row(&profile, &row, line, file_id, state_hint, &mut rows, &mut warnings);
    }

    metrics::counter!(crate::metrics::ROWS_SKIPPED).increment(
        warnings
            .iter()
            .filter(|w| matches!(w, RowWarning::RowSkipped { .. }))
            .count() as u64,
    );

    Ok(NormalizedFile {
        records: rows.records,
        warnings,
        profile: profile.kind.name(),
    })
}

fn cell<'a>(row: &'a csv::StringRecord, idx: Option<usize>) -> &'a str {
    idx.and_then(|i| row.get(i)).unwrap_or("")
}

#[allow(clippy::too_many_arguments)]
fn normalize_row(
    profile: &ColumnProfile,
    row: &csv::StringRecord,
    line: usize,
    file_id: FileId,
    state_hint: &str,
    rows: &mut RowAccumulator,
    warnings: &mut Vec<RowWarning>,
) {
    let raw_payloads = profile.kind == ProfileKind::RawExport;

    let program_cell = row.get(profile.program).unwrap_or("");
    let program_name = if raw_payloads {
        extract_name(program_cell)
    } else {
        program_cell.trim().to_string()
    };
    if program_name.is_empty() {
        warnings.push(RowWarning::RowSkipped {
            line,
            reason: "missing program name".to_string(),
        });
        return;
    }

    let location = cell(row, profile.location).trim().to_string();

    let state_cell = cell(row, profile.state);
    let state = if state_cell.trim().is_empty() {
        state_hint.to_string()
    } else {
        state_key(state_cell)
    };

    let quota_cell = cell(row, profile.quota);
    let quota_label = if raw_payloads {
        extract_name(quota_cell)
    } else {
        quota_cell.trim().to_string()
    };
    let quota = if quota_label.is_empty() {
        Quota::Other("unspecified".to_string())
    } else {
        Quota::parse(&quota_label)
    };

    let category_label = cell(row, profile.category).trim().to_string();
    if category_label.is_empty() {
        warnings.push(RowWarning::RowSkipped {
            line,
            reason: "missing category".to_string(),
        });
        return;
    }
    let (category, mapped) = categories::canonical_category(&category_label);
    if !mapped {
        warnings.push(RowWarning::UnmappedCategory {
            line,
            label: category_label.clone(),
        });
    }

    let base = CutoffRecord {
        program_name,
        location,
        state,
        quota,
        category,
        round: 1,
        closing_rank: 1,
        source_file_id: file_id,
    };

    match profile.kind {
        ProfileKind::Long => {
            let round = match profile.round {
                // No round column at all: every outcome belongs to round 1.
                None => 1,
                Some(idx) => {
                    let round_cell = row.get(idx).unwrap_or("").trim();
                    match round_cell.parse::<u32>() {
                        Ok(round) if round >= 1 => round,
                        _ => {
                            warnings.push(RowWarning::RowSkipped {
                                line,
                                reason: format!("invalid round {round_cell:?}"),
                            });
                            return;
                        }
                    }
                }
            };
            match parse_rank(cell(row, profile.closing_rank)) {
                Ok(closing_rank) => rows.push(CutoffRecord {
                    round,
                    closing_rank,
                    ..base
                }),
                Err(reason) => warnings.push(RowWarning::RowSkipped { line, reason }),
            }
        }
        ProfileKind::WideRounds | ProfileKind::RawExport => {
            for rc in &profile.round_columns {
                let raw_cell = row.get(rc.index).unwrap_or("");
                let value = if raw_payloads {
                    extract_closing(raw_cell)
                } else {
                    raw_cell.trim().to_string()
                };
                // A blank round cell is ordinary sparsity, not a defect.
                if value.is_empty() {
                    continue;
                }
                match parse_rank(&value) {
                    Ok(closing_rank) => rows.push(CutoffRecord {
                        round: rc.round,
                        closing_rank,
                        ..base.clone()
                    }),
                    Err(reason) => warnings.push(RowWarning::RowSkipped {
                        line,
                        reason: format!("{} in {}", reason, rc.label),
                    }),
                }
            }
        }
    }
}

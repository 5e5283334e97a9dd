use csv::StringRecord;
use once_cell::sync::Lazy;
use regex::Regex;

/// Column-name variants accepted for the program column, in priority order.
/// Mirrors the layouts seen across the per-state exports.
const PROGRAM_COLUMNS: &[&str] = &[
    "program",
    "program_name",
    "college_name",
    "name",
    "institute",
    "college",
    "institution",
];
const LOCATION_COLUMNS: &[&str] = &["location", "city", "district", "place"];
const QUOTA_COLUMNS: &[&str] = &["quota_name", "quota"];
const CATEGORY_COLUMNS: &[&str] = &["category", "seat_category"];
const CLOSING_COLUMNS: &[&str] = &["closing_rank", "cutoff_rank", "cutoff", "rank"];

/// Round columns in the wide layouts: `cr_<year>_<n>`.
static ROUND_COL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^cr_(\d{4})_(\d+)$").unwrap());

/// Named column-mapping profiles, tried in priority order. A file matching
/// none of them is a schema failure, not a best-effort guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    /// Explicit `round` and `closing_rank` columns, one outcome per row.
    Long,
    /// One `cr_<year>_<n>` column per round (the cleaned per-state exports).
    WideRounds,
    /// Wide layout straight from the aggregator, with dict payloads in the
    /// `institute`/`quota`/`cr_*` cells.
    RawExport,
}

impl ProfileKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProfileKind::Long => "long",
            ProfileKind::WideRounds => "wide_rounds",
            ProfileKind::RawExport => "raw_export",
        }
    }
}

/// A wide-layout round column, ordered by `(year, n)` and numbered
/// sequentially within the file so the highest round is the most recent
/// counseling cycle.
#[derive(Debug, Clone)]
pub struct RoundColumn {
    pub index: usize,
    pub round: u32,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct ColumnProfile {
    pub kind: ProfileKind,
    pub program: usize,
    pub location: Option<usize>,
    pub state: Option<usize>,
    pub quota: Option<usize>,
    pub category: Option<usize>,
    /// Long layout only.
    pub round: Option<usize>,
    pub closing_rank: Option<usize>,
    /// Wide layouts only.
    pub round_columns: Vec<RoundColumn>,
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|cand| headers.iter().position(|h| h == cand))
}

fn is_reserved(header: &str) -> bool {
    ROUND_COL_RE.is_match(header)
        || QUOTA_COLUMNS.contains(&header)
        || CATEGORY_COLUMNS.contains(&header)
        || CLOSING_COLUMNS.contains(&header)
        || LOCATION_COLUMNS.contains(&header)
        || header == "state"
        || header == "round"
}

/// Sniff the header row against the known profiles. Returns `None` when the
/// layout is unrecognized; the caller surfaces that as `SchemaUnrecognized`.
pub fn detect(headers: &StringRecord) -> Option<ColumnProfile> {
    let folded: Vec<String> = headers
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    // Program column: known names first, then the original sniffer's
    // fallback of the first column that is not claimed by anything else.
    let program = find_column(&folded, PROGRAM_COLUMNS)
        .or_else(|| folded.iter().position(|h| !is_reserved(h)))?;

    let location = find_column(&folded, LOCATION_COLUMNS);
    let state = folded.iter().position(|h| h == "state");
    let quota = find_column(&folded, QUOTA_COLUMNS);
    let category = find_column(&folded, CATEGORY_COLUMNS);

    if let Some(closing_rank) = find_column(&folded, CLOSING_COLUMNS) {
        return Some(ColumnProfile {
            kind: ProfileKind::Long,
            program,
            location,
            state,
            quota,
            category,
            round: folded.iter().position(|h| h == "round"),
            closing_rank: Some(closing_rank),
            round_columns: Vec::new(),
        });
    }

    let mut rounds: Vec<(u32, u32, usize, String)> = folded
        .iter()
        .enumerate()
        .filter_map(|(index, header)| {
            let caps = ROUND_COL_RE.captures(header)?;
            let year: u32 = caps[1].parse().ok()?;
            let n: u32 = caps[2].parse().ok()?;
            Some((year, n, index, header.clone()))
        })
        .collect();
    if rounds.is_empty() {
        return None;
    }
    rounds.sort_by_key(|(year, n, _, _)| (*year, *n));
    let round_columns = rounds
        .into_iter()
        .enumerate()
        .map(|(ordinal, (_, _, index, label))| RoundColumn {
            index,
            round: ordinal as u32 + 1,
            label,
        })
        .collect();

    // The aggregator's raw export keeps the `institute` column with dict
    // payloads; the cleaned files rename it to `college_name`.
    let kind = if folded.iter().any(|h| h == "institute") {
        ProfileKind::RawExport
    } else {
        ProfileKind::WideRounds
    };

    Some(ColumnProfile {
        kind,
        program,
        location,
        state,
        quota,
        category,
        round: None,
        closing_rank: None,
        round_columns,
    })
}

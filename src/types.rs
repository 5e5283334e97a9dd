use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Stable identifier for a source file, derived from its path so that
/// re-scanning the same physical file always yields the same id.
pub type FileId = Uuid;

pub fn file_id_for_path(path: &Path) -> FileId {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes())
}

/// Admission channel under which a seat is offered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quota {
    AllIndia,
    StateQuota,
    Other(String),
}

impl Quota {
    /// Parse a source label into its canonical quota, preserving unknown
    /// quotas verbatim rather than discarding them.
    pub fn parse(label: &str) -> Quota {
        let key = label.trim().to_lowercase().replace(['_', '-'], " ");
        match key.as_str() {
            "all india" | "aiq" | "all india quota" | "ai" => Quota::AllIndia,
            "state" | "state quota" | "sq" | "home state" => Quota::StateQuota,
            _ => Quota::Other(label.trim().to_lowercase()),
        }
    }

    /// Canonical key used in metadata listings and query filters.
    pub fn key(&self) -> String {
        match self {
            Quota::AllIndia => "all-india".to_string(),
            Quota::StateQuota => "state".to_string(),
            Quota::Other(label) => label.clone(),
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One historical admission outcome row, immutable once normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutoffRecord {
    pub program_name: String,
    /// Empty when the source file carries no location column.
    pub location: String,
    pub state: String,
    pub quota: Quota,
    pub category: String,
    pub round: u32,
    pub closing_rank: u64,
    pub source_file_id: FileId,
}

impl CutoffRecord {
    /// The identity tuple used for in-file deduplication and index grouping.
    pub fn tuple_key(&self) -> (String, String, String, String, String, u32) {
        (
            self.program_name.clone(),
            self.location.clone(),
            self.state.clone(),
            self.quota.key(),
            self.category.clone(),
            self.round,
        )
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            state: self.state.clone(),
            quota: self.quota.clone(),
            category: self.category.clone(),
            round: self.round,
        }
    }
}

/// Grouping key of the eligibility index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub state: String,
    pub quota: Quota,
    pub category: String,
    pub round: u32,
}

/// Row-level normalization defect. Never fatal; accumulated on the file's
/// metadata so skipped data stays inspectable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowWarning {
    RowSkipped { line: usize, reason: String },
    UnmappedCategory { line: usize, label: String },
}

impl fmt::Display for RowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowWarning::RowSkipped { line, reason } => {
                write!(f, "RowSkipped: line {line}: {reason}")
            }
            RowWarning::UnmappedCategory { line, label } => {
                write!(f, "UnmappedCategory: line {line}: {label:?} kept verbatim")
            }
        }
    }
}

/// Per-file metadata maintained by the cache and persisted across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFileMetadata {
    pub file_id: FileId,
    pub path: String,
    pub state: String,
    pub content_fingerprint: String,
    pub distinct_quotas: Vec<String>,
    pub distinct_categories: Vec<String>,
    pub distinct_rounds: Vec<u32>,
    pub row_count: usize,
    pub last_ingested_at: DateTime<Utc>,
    pub ingestion_errors: Vec<String>,
}

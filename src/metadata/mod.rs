pub mod store;

use crate::error::Result;
use crate::fingerprint::fingerprint_bytes;
use crate::metrics::{FILES_NORMALIZED, FILES_SCANNED};
use crate::normalize::normalize_file;
use crate::types::{file_id_for_path, CutoffRecord, FileId, SourceFileMetadata};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use store::MetaStore;

/// Outcome of one scan/refresh pass over the data directory.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    /// Metadata for every file currently present, in path order.
    pub files: Vec<SourceFileMetadata>,
    /// Files that failed at the file level this pass (unreadable or
    /// unrecognized layout). Their metadata entries are still applied.
    pub failed: Vec<String>,
    /// Whether the record set changed and the index needs a rebuild.
    pub changed: bool,
}

/// Owns every `SourceFileMetadata` entry plus the in-memory normalized
/// records backing the index. Single writer; all mutation goes through
/// `refresh`.
pub struct MetadataCache {
    data_dir: PathBuf,
    store: Box<dyn MetaStore>,
    entries: HashMap<FileId, SourceFileMetadata>,
    records: HashMap<FileId, Vec<CutoffRecord>>,
}

/// Derive the state key from the export's filename, following the
/// aggregator's `<prefix>_<state>` naming.
pub fn state_from_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_lowercase();
    for prefix in ["neet_college_data_", "cleaned_data_", "cutoffs_", "cutoff_"] {
        if let Some(state) = stem.strip_prefix(prefix) {
            if !state.is_empty() {
                return state.to_string();
            }
        }
    }
    stem
}

impl MetadataCache {
    /// Open the cache over a data directory, restoring persisted entries so
    /// unchanged files are not re-scanned after a restart.
    pub fn open<P: Into<PathBuf>>(data_dir: P, store: Box<dyn MetaStore>) -> Result<Self> {
        let entries = store
            .load_all()?
            .into_iter()
            .map(|meta| (meta.file_id, meta))
            .collect();
        Ok(Self {
            data_dir: data_dir.into(),
            store,
            entries,
            records: HashMap::new(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Scan the data directory. Only files whose fingerprint differs from
    /// the cached value (or whose records are not in memory yet) are
    /// re-normalized; `force` re-normalizes everything. Per-file failures
    /// are isolated; only an unreadable directory is fatal.
    pub fn refresh(&mut self, force: bool) -> Result<RefreshReport> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.data_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        metrics::counter!(FILES_SCANNED).increment(paths.len() as u64);

        let mut report = RefreshReport {
            files: Vec::new(),
            failed: Vec::new(),
            changed: false,
        };
        let mut seen: HashSet<FileId> = HashSet::new();

        for path in &paths {
            let file_id = file_id_for_path(path);
            seen.insert(file_id);

            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "source file unreadable");
                    report.failed.push(path.display().to_string());
                    if let Some(existing) = self.entries.get(&file_id) {
                        report.files.push(existing.clone());
                    }
                    continue;
                }
            };
            let fingerprint = fingerprint_bytes(&bytes);

            let unchanged = !force
                && self
                    .entries
                    .get(&file_id)
                    .map(|e| e.content_fingerprint == fingerprint)
                    .unwrap_or(false);
            if unchanged && self.records.contains_key(&file_id) {
                report.files.push(self.entries[&file_id].clone());
                continue;
            }

            self.ingest_file(path, file_id, fingerprint, unchanged, &mut report);
        }

        // Entries whose physical file disappeared are dropped wholesale.
        let gone: Vec<FileId> = self
            .entries
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for file_id in gone {
            if let Some(old) = self.entries.remove(&file_id) {
                info!(file = %old.path, "source file removed, dropping cache entry");
            }
            self.records.remove(&file_id);
            self.store.remove(&file_id)?;
            report.changed = true;
        }

        Ok(report)
    }

    fn ingest_file(
        &mut self,
        path: &Path,
        file_id: FileId,
        fingerprint: String,
        unchanged: bool,
        report: &mut RefreshReport,
    ) {
        let state_hint = state_from_filename(path);
        match normalize_file(path, file_id, &state_hint) {
            Ok(normalized) => {
                metrics::counter!(FILES_NORMALIZED).increment(1);

                let mut quotas: BTreeSet<String> = BTreeSet::new();
                let mut categories: BTreeSet<String> = BTreeSet::new();
                let mut rounds: BTreeSet<u32> = BTreeSet::new();
                for record in &normalized.records {
                    quotas.insert(record.quota.key());
                    categories.insert(record.category.clone());
                    rounds.insert(record.round);
                }
                let state = normalized
                    .records
                    .first()
                    .map(|r| r.state.clone())
                    .unwrap_or(state_hint);

                // Re-normalizing purely to repopulate records after a
                // restart keeps the original ingestion timestamp.
                let last_ingested_at = if unchanged {
                    self.entries[&file_id].last_ingested_at
                } else {
                    Utc::now()
                };

                let meta = SourceFileMetadata {
                    file_id,
                    path: path.display().to_string(),
                    state,
                    content_fingerprint: fingerprint,
                    distinct_quotas: quotas.into_iter().collect(),
                    distinct_categories: categories.into_iter().collect(),
                    distinct_rounds: rounds.into_iter().collect(),
                    row_count: normalized.records.len(),
                    last_ingested_at,
                    ingestion_errors: normalized.warnings.iter().map(|w| w.to_string()).collect(),
                };
                info!(
                    file = %meta.path,
                    profile = normalized.profile,
                    rows = meta.row_count,
                    warnings = meta.ingestion_errors.len(),
                    "normalized source file"
                );
                if let Err(e) = self.store.upsert(&meta) {
                    warn!(file = %meta.path, error = %e, "failed to persist metadata entry");
                }
                self.entries.insert(file_id, meta.clone());
                self.records.insert(file_id, normalized.records);
                report.files.push(meta);
                report.changed = true;
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "file-level ingestion failure");
                let meta = SourceFileMetadata {
                    file_id,
                    path: path.display().to_string(),
                    state: state_hint,
                    content_fingerprint: fingerprint,
                    distinct_quotas: Vec::new(),
                    distinct_categories: Vec::new(),
                    distinct_rounds: Vec::new(),
                    row_count: 0,
                    last_ingested_at: Utc::now(),
                    ingestion_errors: vec![e.to_string()],
                };
                if let Err(e) = self.store.upsert(&meta) {
                    warn!(file = %meta.path, error = %e, "failed to persist metadata entry");
                }
                self.entries.insert(file_id, meta.clone());
                self.records.insert(file_id, Vec::new());
                report.files.push(meta);
                report.failed.push(path.display().to_string());
                report.changed = true;
            }
        }
    }

    /// Every normalized record currently cached, in path order. Input for
    /// an index rebuild.
    pub fn all_records(&self) -> Vec<CutoffRecord> {
        let mut entries: Vec<&SourceFileMetadata> = self.entries.values().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
            .iter()
            .filter_map(|meta| self.records.get(&meta.file_id))
            .flatten()
            .cloned()
            .collect()
    }

    pub fn list_states(&self) -> Vec<String> {
        let states: BTreeSet<String> = self.entries.values().map(|m| m.state.clone()).collect();
        states.into_iter().collect()
    }

    /// Metadata entries covering one state (one per source file).
    pub fn get(&self, state: &str) -> Vec<SourceFileMetadata> {
        let mut matches: Vec<SourceFileMetadata> = self
            .entries
            .values()
            .filter(|m| m.state == state)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        matches
    }

    pub fn list_quotas(&self, state: &str) -> Vec<String> {
        self.union_for_state(state, |m| m.distinct_quotas.clone())
    }

    pub fn list_categories(&self, state: &str) -> Vec<String> {
        self.union_for_state(state, |m| m.distinct_categories.clone())
    }

    pub fn list_rounds(&self, state: &str) -> Vec<u32> {
        let rounds: BTreeSet<u32> = self
            .entries
            .values()
            .filter(|m| m.state == state)
            .flat_map(|m| m.distinct_rounds.clone())
            .collect();
        rounds.into_iter().collect()
    }

    fn union_for_state<F>(&self, state: &str, f: F) -> Vec<String>
    where
        F: Fn(&SourceFileMetadata) -> Vec<String>,
    {
        let values: BTreeSet<String> = self
            .entries
            .values()
            .filter(|m| m.state == state)
            .flat_map(|m| f(m))
            .collect();
        values.into_iter().collect()
    }
}

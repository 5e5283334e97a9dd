use crate::error::{EngineError, Result};
use crate::index::EligibilityIndex;
use crate::metadata::MetadataCache;
use crate::predict::RankModel;
use crate::query::{self, EligibilityQuery};
use crate::types::{CutoffRecord, SourceFileMetadata};
use std::sync::{Arc, RwLock};
use tracing::info;

/// The boundary the API layer talks to. Single-writer, multi-reader:
/// `refresh_metadata` is the only mutating operation and is serialized
/// behind one async mutex (a second concurrent refresh waits for the first
/// rather than scanning the same files in parallel); queries read an index
/// snapshot and never observe a half-rebuilt one.
pub struct Engine {
    cache: tokio::sync::Mutex<MetadataCache>,
    index: RwLock<Arc<EligibilityIndex>>,
    model: RankModel,
}

impl Engine {
    pub fn new(cache: MetadataCache, model: RankModel) -> Self {
        Self {
            cache: tokio::sync::Mutex::new(cache),
            index: RwLock::new(Arc::new(EligibilityIndex::default())),
            model,
        }
    }

    /// Re-scan the data directory and rebuild the index if anything
    /// changed. Successfully ingested files are applied even when some
    /// files fail; those failures come back as `PartialFailure`.
    pub async fn refresh_metadata(&self, force: bool) -> Result<Vec<SourceFileMetadata>> {
        let mut cache = self.cache.lock().await;
        let report = cache.refresh(force)?;

        if report.changed {
            // Build on private data first, then publish: in-flight queries
            // keep the snapshot they already hold.
            let rebuilt = Arc::new(EligibilityIndex::build(cache.all_records()));
            *self.index.write().unwrap() = rebuilt;
            info!(files = report.files.len(), "eligibility index rebuilt");
        }

        if report.failed.is_empty() {
            Ok(report.files)
        } else {
            Err(EngineError::PartialFailure {
                failed: report.failed,
            })
        }
    }

    /// Answer an eligibility query against the current index snapshot.
    pub fn query(&self, query: &EligibilityQuery) -> Result<Vec<CutoffRecord>> {
        let snapshot = self.index.read().unwrap().clone();
        query::run(&snapshot, query)
    }

    pub fn predict_rank(&self, score: f64, category: &str) -> Result<u64> {
        self.model.predict_rank(score, category)
    }

    pub async fn list_states(&self) -> Vec<String> {
        self.cache.lock().await.list_states()
    }

    pub async fn list_quotas(&self, state: &str) -> Vec<String> {
        self.cache.lock().await.list_quotas(state)
    }

    pub async fn list_categories(&self, state: &str) -> Vec<String> {
        self.cache.lock().await.list_categories(state)
    }

    pub async fn list_rounds(&self, state: &str) -> Vec<u32> {
        self.cache.lock().await.list_rounds(state)
    }

    pub async fn get_metadata(&self, state: &str) -> Vec<SourceFileMetadata> {
        self.cache.lock().await.get(state)
    }
}

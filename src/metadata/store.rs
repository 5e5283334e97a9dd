use crate::error::{EngineError, Result};
use crate::types::{FileId, SourceFileMetadata};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Persistence boundary for the metadata cache. The cache itself owns the
/// in-memory view; a store only has to round-trip entries losslessly.
pub trait MetaStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<SourceFileMetadata>>;
    fn upsert(&self, meta: &SourceFileMetadata) -> Result<()>;
    fn remove(&self, file_id: &FileId) -> Result<()>;
}

/// SQLite-backed store so restarts do not re-scan unchanged files.
pub struct SqliteMetaStore {
    conn: Mutex<Connection>,
}

impl SqliteMetaStore {
    pub fn open_at<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS source_files (
                file_id           TEXT PRIMARY KEY,
                path              TEXT NOT NULL,
                state             TEXT NOT NULL,
                fingerprint       TEXT NOT NULL,
                row_count         INTEGER NOT NULL,
                last_ingested_at  TEXT NOT NULL,
                quotas            TEXT NOT NULL,
                categories        TEXT NOT NULL,
                rounds            TEXT NOT NULL,
                warnings          TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl MetaStore for SqliteMetaStore {
    fn load_all(&self) -> Result<Vec<SourceFileMetadata>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT file_id, path, state, fingerprint, row_count, last_ingested_at,
                    quotas, categories, rounds, warnings
             FROM source_files ORDER BY path",
        )?;
        let rows = stmt.query_map(params![], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, path, state, fingerprint, row_count, ingested, quotas, categories, rounds, warnings) =
                row?;
            entries.push(SourceFileMetadata {
                file_id: id
                    .parse()
                    .map_err(|e| EngineError::Config(format!("corrupt file_id in store: {e}")))?,
                path,
                state,
                content_fingerprint: fingerprint,
                distinct_quotas: serde_json::from_str(&quotas)?,
                distinct_categories: serde_json::from_str(&categories)?,
                distinct_rounds: serde_json::from_str(&rounds)?,
                row_count: row_count as usize,
                last_ingested_at: DateTime::parse_from_rfc3339(&ingested)
                    .map_err(|e| EngineError::Config(format!("corrupt timestamp in store: {e}")))?
                    .with_timezone(&Utc),
                ingestion_errors: serde_json::from_str(&warnings)?,
            });
        }
        Ok(entries)
    }

    fn upsert(&self, meta: &SourceFileMetadata) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO source_files
               (file_id, path, state, fingerprint, row_count, last_ingested_at,
                quotas, categories, rounds, warnings)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(file_id) DO UPDATE SET
               path=excluded.path, state=excluded.state, fingerprint=excluded.fingerprint,
               row_count=excluded.row_count, last_ingested_at=excluded.last_ingested_at,
               quotas=excluded.quotas, categories=excluded.categories,
               rounds=excluded.rounds, warnings=excluded.warnings",
            params![
                meta.file_id.to_string(),
                meta.path,
                meta.state,
                meta.content_fingerprint,
                meta.row_count as i64,
                meta.last_ingested_at.to_rfc3339(),
                serde_json::to_string(&meta.distinct_quotas)?,
                serde_json::to_string(&meta.distinct_categories)?,
                serde_json::to_string(&meta.distinct_rounds)?,
                serde_json::to_string(&meta.ingestion_errors)?,
            ],
        )?;
        Ok(())
    }

    fn remove(&self, file_id: &FileId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM source_files WHERE file_id = ?1",
            params![file_id.to_string()],
        )?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryMetaStore {
    entries: Mutex<HashMap<FileId, SourceFileMetadata>>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetaStore for InMemoryMetaStore {
    fn load_all(&self) -> Result<Vec<SourceFileMetadata>> {
        let entries = self.entries.lock().unwrap();
        let mut all: Vec<SourceFileMetadata> = entries.values().cloned().collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(all)
    }

    fn upsert(&self, meta: &SourceFileMetadata) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(meta.file_id, meta.clone());
        Ok(())
    }

    fn remove(&self, file_id: &FileId) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(file_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::file_id_for_path;

    fn sample(path: &str) -> SourceFileMetadata {
        SourceFileMetadata {
            file_id: file_id_for_path(Path::new(path)),
            path: path.to_string(),
            state: "gujarat".to_string(),
            content_fingerprint: "deadbeef".to_string(),
            distinct_quotas: vec!["all-india".to_string(), "state".to_string()],
            distinct_categories: vec!["obc-ncl".to_string(), "open".to_string()],
            distinct_rounds: vec![1, 2, 3],
            row_count: 42,
            last_ingested_at: Utc::now(),
            ingestion_errors: vec!["RowSkipped: line 7: empty closing rank".to_string()],
        }
    }

    #[test]
    fn sqlite_store_round_trips_entries_losslessly() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMetaStore::open_at(dir.path().join("meta.db")).unwrap();
        let meta = sample("/data/cutoffs_gujarat.csv");
        store.upsert(&meta).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].file_id, meta.file_id);
        assert_eq!(loaded[0].content_fingerprint, meta.content_fingerprint);
        assert_eq!(loaded[0].distinct_quotas, meta.distinct_quotas);
        assert_eq!(loaded[0].distinct_categories, meta.distinct_categories);
        assert_eq!(loaded[0].distinct_rounds, meta.distinct_rounds);
        assert_eq!(loaded[0].ingestion_errors, meta.ingestion_errors);
        assert_eq!(
            loaded[0].last_ingested_at.timestamp(),
            meta.last_ingested_at.timestamp()
        );
    }

    #[test]
    fn sqlite_upsert_replaces_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMetaStore::open_at(dir.path().join("meta.db")).unwrap();
        let mut meta = sample("/data/cutoffs_gujarat.csv");
        store.upsert(&meta).unwrap();
        meta.content_fingerprint = "cafebabe".to_string();
        meta.row_count = 50;
        store.upsert(&meta).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content_fingerprint, "cafebabe");
        assert_eq!(loaded[0].row_count, 50);
    }

    #[test]
    fn remove_deletes_entry() {
        let store = InMemoryMetaStore::new();
        let meta = sample("/data/cutoffs_gujarat.csv");
        store.upsert(&meta).unwrap();
        store.remove(&meta.file_id).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}

//! Metric name catalog. Counters are emitted through the `metrics` facade;
//! whatever recorder the embedding process installs picks them up.

pub const FILES_SCANNED: &str = "ingest_files_scanned_total";
pub const FILES_NORMALIZED: &str = "ingest_files_normalized_total";
pub const ROWS_SKIPPED: &str = "ingest_rows_skipped_total";
pub const QUERIES_TOTAL: &str = "query_requests_total";
pub const QUERY_MATCH_ROWS: &str = "query_match_rows";

pub fn record_query(matches: usize) {
    metrics::counter!(QUERIES_TOTAL).increment(1);
    metrics::histogram!(QUERY_MATCH_ROWS).record(matches as f64);
}

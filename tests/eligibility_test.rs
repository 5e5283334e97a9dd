use std::io::Write;
use std::path::Path;

use neet_counsel::engine::Engine;
use neet_counsel::error::EngineError;
use neet_counsel::metadata::store::SqliteMetaStore;
use neet_counsel::metadata::MetadataCache;
use neet_counsel::predict::RankModel;
use neet_counsel::query::EligibilityQuery;

fn write_csv(dir: &Path, name: &str, content: &str) {
    let mut f = std::fs::File::create(dir.join(name)).unwrap();
    f.write_all(content.as_bytes()).unwrap();
}

fn engine_at(data_dir: &Path, db_path: &Path) -> Engine {
    let store = SqliteMetaStore::open_at(db_path).unwrap();
    let cache = MetadataCache::open(data_dir, Box::new(store)).unwrap();
    Engine::new(cache, RankModel::builtin())
}

fn query(state: &str, rank: u64, round: Option<u32>) -> EligibilityQuery {
    EligibilityQuery {
        rank,
        category: "open".to_string(),
        quota: "state".to_string(),
        state: state.to_string(),
        round,
        program_contains: None,
    }
}

#[tokio::test]
async fn eligibility_matches_the_reference_example() {
    let data = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    write_csv(
        data.path(),
        "cutoffs_maharashtra.csv",
        "program,location,state,quota,category,round,closing_rank\n\
         X,Mumbai,maharashtra,State,Open,1,5000\n",
    );
    let engine = engine_at(data.path(), &db.path().join("meta.db"));
    engine.refresh_metadata(false).await.unwrap();

    let eligible = engine.query(&query("maharashtra", 4500, Some(1))).unwrap();
    let programs: Vec<&str> = eligible.iter().map(|r| r.program_name.as_str()).collect();
    assert_eq!(programs, vec!["X"]);

    assert!(engine
        .query(&query("maharashtra", 5200, Some(1)))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn worse_ranks_never_gain_programs() {
    let data = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    write_csv(
        data.path(),
        "cutoffs_maharashtra.csv",
        "program,category,quota,round,closing_rank\n\
         A,Open,State,1,800\n\
         B,Open,State,1,2500\n\
         C,Open,State,1,2500\n\
         D,Open,State,1,9000\n",
    );
    let engine = engine_at(data.path(), &db.path().join("meta.db"));
    engine.refresh_metadata(false).await.unwrap();

    for rank in [1u64, 500, 801, 2500, 2501, 9001] {
        let at_rank = engine.query(&query("maharashtra", rank, Some(1))).unwrap();
        let at_worse = engine
            .query(&query("maharashtra", rank + 1, Some(1)))
            .unwrap();
        for record in &at_worse {
            assert!(
                at_rank.contains(record),
                "rank {rank} lost {} held at rank {}",
                record.program_name,
                rank + 1
            );
        }
    }
}

#[tokio::test]
async fn omitted_round_queries_the_latest_round() {
    let data = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    write_csv(
        data.path(),
        "cleaned_data_gujarat.csv",
        "college_name,state,quota_name,category,cr_2022_1,cr_2022_2,cr_2023_1\n\
         College A,gujarat,State,Open,4000,5000,6000\n\
         College B,gujarat,State,Open,1500,,2500\n",
    );
    let engine = engine_at(data.path(), &db.path().join("meta.db"));
    engine.refresh_metadata(false).await.unwrap();

    let max_round = 3; // cr_2023_1 is the most recent of the three columns
    let defaulted = engine.query(&query("gujarat", 2000, None)).unwrap();
    let explicit = engine
        .query(&query("gujarat", 2000, Some(max_round)))
        .unwrap();
    assert_eq!(defaulted, explicit);
    let programs: Vec<&str> = defaulted.iter().map(|r| r.program_name.as_str()).collect();
    assert_eq!(programs, vec!["College B", "College A"]);
}

#[tokio::test]
async fn bad_rows_degrade_to_warnings_not_failures() {
    let data = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    write_csv(
        data.path(),
        "cutoffs_kerala.csv",
        "program,category,quota,round,closing_rank\n\
         Good College,Open,State,1,3000\n\
         Broken College,Open,State,1,N/A\n",
    );
    let engine = engine_at(data.path(), &db.path().join("meta.db"));
    let files = engine.refresh_metadata(false).await.unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].row_count, 1);
    assert_eq!(files[0].ingestion_errors.len(), 1);
    assert!(files[0].ingestion_errors[0].contains("RowSkipped"));

    let eligible = engine.query(&query("kerala", 100, Some(1))).unwrap();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].program_name, "Good College");
}

#[tokio::test]
async fn partial_failure_names_the_broken_file_and_keeps_the_rest() {
    let data = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    write_csv(data.path(), "cutoffs_noise.csv", "x,y,z\n1,2,3\n");
    write_csv(
        data.path(),
        "cutoffs_kerala.csv",
        "program,category,quota,round,closing_rank\nGood College,Open,State,1,3000\n",
    );
    let engine = engine_at(data.path(), &db.path().join("meta.db"));

    match engine.refresh_metadata(false).await {
        Err(EngineError::PartialFailure { failed }) => {
            assert_eq!(failed.len(), 1);
            assert!(failed[0].contains("cutoffs_noise.csv"));
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }
    assert_eq!(engine.query(&query("kerala", 100, Some(1))).unwrap().len(), 1);
}

#[tokio::test]
async fn restart_reuses_the_durable_cache_without_restamping() {
    let data = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    let db_path = db.path().join("meta.db");
    write_csv(
        data.path(),
        "cutoffs_kerala.csv",
        "program,category,quota,round,closing_rank\nGood College,Open,State,1,3000\n",
    );

    let engine = engine_at(data.path(), &db_path);
    let first = engine.refresh_metadata(false).await.unwrap();
    let stamped = first[0].last_ingested_at;
    drop(engine);

    let reopened = engine_at(data.path(), &db_path);
    let second = reopened.refresh_metadata(false).await.unwrap();
    assert_eq!(second[0].last_ingested_at, stamped);
    assert_eq!(second[0].content_fingerprint, first[0].content_fingerprint);

    // Forced refresh re-stamps even though the bytes did not change.
    let forced = reopened.refresh_metadata(true).await.unwrap();
    assert!(forced[0].last_ingested_at > stamped);
}

#[tokio::test]
async fn score_to_rank_feeds_the_query_path() {
    let data = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    write_csv(
        data.path(),
        "cutoffs_kerala.csv",
        "program,category,quota,round,closing_rank\n\
         Selective College,Open,State,1,40\n\
         Open College,Open,State,1,2000\n",
    );
    let engine = engine_at(data.path(), &db.path().join("meta.db"));
    engine.refresh_metadata(false).await.unwrap();

    // A perfect score predicts rank 1 and is eligible everywhere.
    let rank = engine.predict_rank(720.0, "open").unwrap();
    assert_eq!(rank, 1);
    let eligible = engine.query(&query("kerala", rank, Some(1))).unwrap();
    assert_eq!(eligible.len(), 2);

    // A middling score lands past the selective program.
    let rank = engine.predict_rank(650.0, "open").unwrap();
    assert!(rank > 40);
    let eligible = engine.query(&query("kerala", rank, Some(1))).unwrap();
    let programs: Vec<&str> = eligible.iter().map(|r| r.program_name.as_str()).collect();
    assert_eq!(programs, vec!["Open College"]);
}

#[tokio::test]
async fn distinct_sets_drive_the_form_projections() {
    let data = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    write_csv(
        data.path(),
        "cutoffs_kerala.csv",
        "program,category,quota,round,closing_rank\n\
         College A,Open,All India,1,1000\n\
         College A,SC,All India,2,4000\n",
    );
    write_csv(
        data.path(),
        "cutoffs_gujarat.csv",
        "program,category,quota,round,closing_rank\nCollege G,OBC,State,1,2000\n",
    );
    let engine = engine_at(data.path(), &db.path().join("meta.db"));
    engine.refresh_metadata(false).await.unwrap();

    assert_eq!(engine.list_states().await, vec!["gujarat", "kerala"]);
    assert_eq!(engine.list_quotas("kerala").await, vec!["all-india"]);
    assert_eq!(engine.list_categories("kerala").await, vec!["open", "sc"]);
    assert_eq!(engine.list_rounds("kerala").await, vec![1, 2]);
    assert_eq!(engine.list_categories("gujarat").await, vec!["obc-ncl"]);
}

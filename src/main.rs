use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use neet_counsel::config::Config;
use neet_counsel::engine::Engine;
use neet_counsel::error::EngineError;
use neet_counsel::logging;
use neet_counsel::metadata::store::SqliteMetaStore;
use neet_counsel::metadata::MetadataCache;
use neet_counsel::predict::RankModel;
use neet_counsel::query::{summarize, EligibilityQuery};
use neet_counsel::types::CutoffRecord;

#[derive(Parser)]
#[command(name = "neet_counsel")]
#[command(about = "NEET counseling cutoff eligibility engine")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the data directory and refresh the metadata cache
    Refresh {
        /// Re-normalize every file regardless of fingerprint
        #[arg(long)]
        force: bool,
    },
    /// List programs a candidate would have been admitted to
    Query {
        /// Admission rank; either this or --score is required
        #[arg(long)]
        rank: Option<u64>,
        /// Exam score, converted to a rank via the percentile model
        #[arg(long)]
        score: Option<f64>,
        #[arg(long)]
        category: String,
        #[arg(long)]
        quota: String,
        #[arg(long)]
        state: String,
        /// Counseling round; defaults to the latest known for the state
        #[arg(long)]
        round: Option<u32>,
        /// Only programs whose name contains this text
        #[arg(long)]
        contains: Option<String>,
        /// Write the matches as CSV to this path instead of printing them
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Predict an admission rank from an exam score
    Predict {
        #[arg(long)]
        score: f64,
        #[arg(long)]
        category: String,
    },
    /// List states known to the metadata cache
    States,
    /// Show filter choices and file metadata for one state
    Meta { state: String },
}

fn build_engine(config: &Config) -> anyhow::Result<Engine> {
    let store = SqliteMetaStore::open_at(&config.meta_db)
        .with_context(|| format!("failed to open metadata store at {}", config.meta_db.display()))?;
    let cache = MetadataCache::open(config.data_dir.clone(), Box::new(store))?;
    let model = match &config.curves {
        Some(path) => RankModel::from_path(path)
            .with_context(|| format!("failed to load curve table {}", path.display()))?,
        None => RankModel::builtin(),
    };
    Ok(Engine::new(cache, model))
}

/// Refresh before reading, downgrading a partial failure to a warning so
/// the good files stay usable.
async fn refresh_tolerant(engine: &Engine, force: bool) -> anyhow::Result<()> {
    match engine.refresh_metadata(force).await {
        Ok(_) => Ok(()),
        Err(EngineError::PartialFailure { failed }) => {
            warn!(failed = failed.len(), "refresh partially failed");
            println!("⚠️  {} file(s) failed to ingest:", failed.len());
            for file in failed {
                println!("   - {file}");
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_matches(matches: &[CutoffRecord], round_shown: Option<u32>) {
    let summary = summarize(matches);
    println!("\n📊 {} eligible program(s)", summary.total);
    if let Some(round) = round_shown {
        println!("   Round: {round}");
    }
    if let Some(lowest) = summary.lowest_closing_rank {
        println!("   Most competitive closing rank: {lowest}");
    }
    if let Some(mean) = summary.mean_closing_rank {
        println!("   Mean closing rank: {mean}");
    }
    for record in matches {
        if record.location.is_empty() {
            println!("   {:>8}  {}", record.closing_rank, record.program_name);
        } else {
            println!(
                "   {:>8}  {} ({})",
                record.closing_rank, record.program_name, record.location
            );
        }
    }
}

fn export_csv(matches: &[CutoffRecord], path: &PathBuf) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record([
        "program",
        "location",
        "state",
        "quota",
        "category",
        "round",
        "closing_rank",
    ])?;
    for record in matches {
        let quota = record.quota.key();
        let round = record.round.to_string();
        let closing = record.closing_rank.to_string();
        writer.write_record([
            record.program_name.as_str(),
            record.location.as_str(),
            record.state.as_str(),
            quota.as_str(),
            record.category.as_str(),
            round.as_str(),
            closing.as_str(),
        ])?;
    }
    writer.flush()?;
    println!("💾 Wrote {} row(s) to {}", matches.len(), path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;
    let engine = build_engine(&config)?;

    match cli.command {
        Commands::Refresh { force } => {
            println!("🔄 Refreshing metadata cache...");
            match engine.refresh_metadata(force).await {
                Ok(files) => {
                    println!("✅ {} source file(s) cached", files.len());
                    for meta in &files {
                        println!(
                            "   {} :: state {}, {} row(s), {} warning(s)",
                            meta.path,
                            meta.state,
                            meta.row_count,
                            meta.ingestion_errors.len()
                        );
                    }
                }
                Err(EngineError::PartialFailure { failed }) => {
                    println!("⚠️  Refresh applied with {} failed file(s):", failed.len());
                    for file in failed {
                        println!("   - {file}");
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Query {
            rank,
            score,
            category,
            quota,
            state,
            round,
            contains,
            csv,
        } => {
            refresh_tolerant(&engine, false).await?;

            let rank = match (rank, score) {
                (Some(rank), _) => rank,
                (None, Some(score)) => {
                    let predicted = engine.predict_rank(score, &category)?;
                    println!("🎯 Score {score} → predicted rank {predicted}");
                    predicted
                }
                (None, None) => anyhow::bail!("either --rank or --score is required"),
            };

            let query = EligibilityQuery {
                rank,
                category,
                quota,
                state,
                round,
                program_contains: contains,
            };
            let matches = engine.query(&query)?;
            info!(rank, matches = matches.len(), "query answered");

            match csv {
                Some(path) => export_csv(&matches, &path)?,
                None => print_matches(&matches, query.round.or(matches.first().map(|r| r.round))),
            }
        }
        Commands::Predict { score, category } => {
            let rank = engine.predict_rank(score, &category)?;
            println!("🎯 Predicted rank for score {score} ({category}): {rank}");
        }
        Commands::States => {
            refresh_tolerant(&engine, false).await?;
            for state in engine.list_states().await {
                println!("{state}");
            }
        }
        Commands::Meta { state } => {
            refresh_tolerant(&engine, false).await?;
            let files = engine.get_metadata(&state).await;
            if files.is_empty() {
                println!("⚠️  No source files for state {state}");
                return Ok(());
            }
            println!("Quotas:     {}", engine.list_quotas(&state).await.join(", "));
            println!("Categories: {}", engine.list_categories(&state).await.join(", "));
            println!(
                "Rounds:     {}",
                engine
                    .list_rounds(&state)
                    .await
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            for meta in files {
                println!(
                    "\n📄 {}\n   fingerprint {}\n   {} row(s), ingested {}",
                    meta.path,
                    &meta.content_fingerprint[..12.min(meta.content_fingerprint.len())],
                    meta.row_count,
                    meta.last_ingested_at
                );
                for warning in &meta.ingestion_errors {
                    println!("   ⚠️  {warning}");
                }
            }
        }
    }
    Ok(())
}

//! Forgeflow ETL - run one batch in the foreground

use anyhow::{Context, Result};
use clap::Parser;
use forgeflow_common::logging::{init_logging, LogConfig, LogLevel};
use forgeflow_common::ForgeflowError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use forgeflow_server::config::Config;
use forgeflow_server::db;
use forgeflow_server::etl::memory::MemoryTargetStore;
use forgeflow_server::etl::postgres::PgTargetStore;
use forgeflow_server::etl::staging::{PgStagingSource, StagingSource};
use forgeflow_server::etl::{parse_batch, BatchOrchestrator, BatchOutcome, RecordValidator, TargetStore};

#[derive(Parser, Debug)]
#[command(name = "forgeflow-etl")]
#[command(author, version, about = "Run a Forgeflow batch from a file or the staging store")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Load the records of a JSON file (an array of record objects)
    Run {
        /// Input file
        #[arg(short, long)]
        file: PathBuf,

        /// Load into an in-memory store instead of the target database
        #[arg(long)]
        dry_run: bool,
    },

    /// Load every pending row of the staging store
    Staging {
        /// Load into an in-memory store and leave staging rows pending
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("forgeflow-etl")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    dotenvy::dotenv().ok();
    let config = Config::from_env();
    config.validate_pipeline()?;
    let validator = RecordValidator::new(config.etl.policy);

    let outcome = match cli.command {
        Command::Run { file, dry_run } => {
            let records = read_records(&file)?;
            info!(file = %file.display(), records = records.len(), dry_run, "Loading records from file");

            let store = target_store(&config, dry_run).await?;
            BatchOrchestrator::new(store, validator).run(records).await?
        },
        Command::Staging { dry_run } => {
            let staging_config = config
                .staging_db
                .as_ref()
                .context("STAGING_DATABASE_URL must be set to pull from staging")?;
            let source = Arc::new(PgStagingSource::new(db::create_pool("staging", staging_config).await?));
            let store = target_store(&config, dry_run).await?;

            if dry_run {
                let records = source
                    .fetch_pending()
                    .await?
                    .into_iter()
                    .map(|row| row.record)
                    .collect();
                BatchOrchestrator::new(store, validator).run(records).await?
            } else {
                BatchOrchestrator::new(store, validator)
                    .with_staging(source, config.etl.staging_mark_attempts)
                    .run_staging()
                    .await?
            }
        },
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(match outcome {
        BatchOutcome::Success(_) => ExitCode::SUCCESS,
        BatchOutcome::Failure { .. } => ExitCode::FAILURE,
    })
}

fn read_records(path: &PathBuf) -> Result<Vec<forgeflow_server::etl::RawRecord>> {
    let text = std::fs::read_to_string(path)
        .map_err(ForgeflowError::from)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&text).map_err(ForgeflowError::from)?;
    Ok(parse_batch(payload)?)
}

async fn target_store(config: &Config, dry_run: bool) -> Result<Arc<dyn TargetStore>> {
    if dry_run {
        return Ok(Arc::new(MemoryTargetStore::new()));
    }
    let pool = db::create_pool("target", &config.target_db).await?;
    Ok(Arc::new(PgTargetStore::new(pool)))
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use catchem_dim_store::{
    load_or_init_config, run_dimension, DimError, DimResult, DimStore, DimensionReadApi,
    DimensionRecord, DwhConfig, IntegrityApi, NaturalKey, RunMode, RunOptions, RunSummary,
    SnapshotFeed, SnapshotRecord, SqlSnapshotFeed, StaticSnapshotFeed, ValidTime,
};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Baseline(args) => load(RunMode::Baseline, args, None).await,
        Command::Incremental(args) => load(RunMode::Incremental, args.load, args.batch_size).await,
        Command::Verify(args) => verify(args).await,
        Command::History(args) => history(args).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Loads and inspects the historized Catchem user dimension"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed an empty dimension with one version per user.
    Baseline(LoadArgs),
    /// Apply the current snapshot, versioning users whose tracked attributes changed.
    Incremental(IncrementalArgs),
    /// Scan the dimension for broken version chains.
    Verify(VerifyArgs),
    /// Print every version of one user.
    History(HistoryArgs),
}

#[derive(Args)]
struct LoadArgs {
    /// JSON array of snapshot records; defaults to the `source` database in dwh.json.
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Directory holding dwh.json and the default sqlite warehouse.
    #[arg(long, default_value = ".dwh")]
    datastore: PathBuf,
    /// Processing time for the run (RFC 3339); defaults to now.
    #[arg(long, value_parser = parse_processed_at)]
    processed_at: Option<ValidTime>,
    /// Print the run summary as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args)]
struct IncrementalArgs {
    #[command(flatten)]
    load: LoadArgs,
    /// Users sharing one transaction; overrides `scd.batch_size`.
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(long, default_value = ".dwh")]
    datastore: PathBuf,
    /// Print the report as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args)]
struct HistoryArgs {
    /// Natural key of the user (UUID).
    #[arg(long)]
    user_id: String,
    #[arg(long, default_value = ".dwh")]
    datastore: PathBuf,
}

#[derive(Serialize)]
struct HistoryOutput<'a> {
    user_id: NaturalKey,
    versions: &'a [DimensionRecord],
}

fn parse_processed_at(value: &str) -> Result<ValidTime, String> {
    ValidTime::parse_rfc3339(value).map_err(|err| err.to_string())
}

enum Feed {
    File(StaticSnapshotFeed),
    Sql(SqlSnapshotFeed),
}

impl Feed {
    async fn open(snapshot: Option<&Path>, config: &DwhConfig, base: &Path) -> Result<Self> {
        if let Some(path) = snapshot {
            return Ok(Feed::File(StaticSnapshotFeed::new(read_snapshot_file(path)?)));
        }
        let source = config
            .source
            .as_ref()
            .ok_or_else(|| anyhow!("no --snapshot given and dwh.json has no `source` database"))?;
        let feed = SqlSnapshotFeed::connect(source, config.pool.as_ref(), base)
            .await
            .context("connect to source database")?;
        Ok(Feed::Sql(feed))
    }

    fn as_feed(&self) -> &dyn SnapshotFeed {
        match self {
            Feed::File(feed) => feed,
            Feed::Sql(feed) => feed,
        }
    }

    async fn close(self) -> DimResult<()> {
        match self {
            Feed::File(_) => Ok(()),
            Feed::Sql(feed) => feed.close().await,
        }
    }
}

fn read_snapshot_file(path: &Path) -> Result<Vec<SnapshotRecord>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    let records: Vec<SnapshotRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("parse snapshot {}", path.display()))?;
    Ok(records)
}

fn run_options(config: &DwhConfig, args: &LoadArgs, batch_size: Option<usize>) -> RunOptions {
    let mut options = config.run_options();
    if args.processed_at.is_some() {
        options.processed_at = args.processed_at;
    }
    if let Some(batch_size) = batch_size {
        options.batch_size = batch_size.max(1);
    }
    options
}

async fn load(mode: RunMode, args: LoadArgs, batch_size: Option<usize>) -> Result<ExitCode> {
    let config = load_or_init_config(&args.datastore)
        .with_context(|| format!("load config under {}", args.datastore.display()))?;
    let options = run_options(&config, &args, batch_size);
    let summary = execute_load(mode, &args, &config, &options).await?;
    print_summary(&summary, args.json)?;
    if summary.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("{} users failed during the {mode} run", summary.failed_count());
        Ok(ExitCode::FAILURE)
    }
}

/// Opens feed and store, runs once, and releases both on every path.
async fn execute_load(
    mode: RunMode,
    args: &LoadArgs,
    config: &DwhConfig,
    options: &RunOptions,
) -> Result<RunSummary> {
    let feed = Feed::open(args.snapshot.as_deref(), config, &args.datastore).await?;
    let store = match DimStore::connect(config, &args.datastore).await {
        Ok(store) => store,
        Err(err) => {
            if let Err(close_err) = feed.close().await {
                warn!("closing snapshot feed failed: {close_err}");
            }
            return Err(anyhow::Error::new(err).context("open warehouse"));
        }
    };
    let outcome = run_dimension(mode, feed.as_feed(), &store, options).await;
    if let Err(err) = feed.close().await {
        warn!("closing snapshot feed failed: {err}");
    }
    store.close().await.context("close warehouse")?;
    let summary = outcome.with_context(|| format!("{mode} run aborted"))?;
    Ok(summary)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("{summary}");
    for failure in &summary.failed {
        println!("  failed {}: {}", failure.user_id, failure.message);
    }
    Ok(())
}

async fn verify(args: VerifyArgs) -> Result<ExitCode> {
    let config = load_or_init_config(&args.datastore)?;
    let store = DimStore::connect(&config, &args.datastore)
        .await
        .context("open warehouse")?;
    let outcome = store.verify_history().await;
    store.close().await?;
    let report = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "checked {} users / {} versions: {} violations",
            report.users_checked,
            report.versions_checked,
            report.violations.len()
        );
        for violation in &report.violations {
            println!(
                "  {}: {}",
                violation.user_id,
                serde_json::to_string(&violation.issue)?
            );
        }
    }
    if report.is_consistent() {
        info!("dim_user history is consistent");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn history(args: HistoryArgs) -> Result<ExitCode> {
    let user_id = NaturalKey::from_uuid_str(&args.user_id)
        .with_context(|| format!("invalid --user-id {}", args.user_id))?;
    let versions = fetch_history(&args.datastore, user_id).await?;
    let output = HistoryOutput {
        user_id,
        versions: &versions,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(ExitCode::SUCCESS)
}

/// All versions of `user_id`; a user the dimension has never seen is `NotFound`.
async fn fetch_history(datastore: &Path, user_id: NaturalKey) -> Result<Vec<DimensionRecord>> {
    let config = load_or_init_config(datastore)?;
    let store = DimStore::connect(&config, datastore)
        .await
        .context("open warehouse")?;
    let outcome = store.list_versions(user_id).await;
    store.close().await?;
    let versions = outcome?;
    if versions.is_empty() {
        return Err(DimError::not_found(format!("user {user_id} has no versions")).into());
    }
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn parses_incremental_flags() {
        let cli = Cli::try_parse_from([
            "catchem-dwh",
            "incremental",
            "--snapshot",
            "snap.json",
            "--processed-at",
            "2024-01-02T03:04:05Z",
            "--batch-size",
            "25",
        ])
        .expect("parse");
        let Command::Incremental(args) = cli.command else {
            panic!("expected incremental");
        };
        assert_eq!(args.batch_size, Some(25));
        assert_eq!(args.load.snapshot, Some(PathBuf::from("snap.json")));
        assert_eq!(args.load.datastore, PathBuf::from(".dwh"));
        assert_eq!(
            args.load.processed_at,
            Some(ValidTime::parse_rfc3339("2024-01-02T03:04:05Z").expect("time"))
        );
    }

    #[test]
    fn rejects_malformed_processing_time() {
        let result = Cli::try_parse_from(["catchem-dwh", "baseline", "--processed-at", "yesterday"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn loads_snapshot_file_into_warehouse() -> Result<()> {
        let dir = tempdir()?;
        let base = dir.path().to_path_buf();
        let user_id = "0b6f8f1c-3c55-4a8e-9d55-2f0d8f4e1a01";
        let snapshot = base.join("snapshot.json");
        let mut records = json!([{
            "user_id": user_id,
            "first_name": "Anne",
            "last_name": "Bonny",
            "address": "12 Oak St Nassau Bahamas",
            "found_logs": 0,
            "experience_level": "Starter",
            "is_dedicator": false
        }]);
        fs::write(&snapshot, records.to_string())?;

        let args = LoadArgs {
            snapshot: Some(snapshot.clone()),
            datastore: base.clone(),
            processed_at: Some(ValidTime::from_unix_seconds(1_700_000_000)),
            json: false,
        };
        let config = load_or_init_config(&base)?;
        let options = run_options(&config, &args, None);
        let summary = execute_load(RunMode::Baseline, &args, &config, &options).await?;
        assert_eq!(summary.new, 1);

        records[0]["address"] = json!("99 Pine Ave Nassau Bahamas");
        fs::write(&snapshot, records.to_string())?;
        let args = LoadArgs {
            processed_at: Some(ValidTime::from_unix_seconds(1_700_086_400)),
            ..args
        };
        let options = run_options(&config, &args, Some(4));
        assert_eq!(options.batch_size, 4);
        let summary = execute_load(RunMode::Incremental, &args, &config, &options).await?;
        assert_eq!(summary.changed, 1);

        let store = DimStore::connect(&config, &base).await?;
        let versions = store
            .list_versions(NaturalKey::from_uuid_str(user_id)?)
            .await?;
        store.close().await?;
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].address, "99 Pine Ave Nassau Bahamas");
        Ok(())
    }

    #[tokio::test]
    async fn history_of_unknown_user_is_not_found() -> Result<()> {
        let dir = tempdir()?;
        let err = fetch_history(dir.path(), NaturalKey::new())
            .await
            .expect_err("no versions");
        assert!(matches!(
            err.downcast_ref::<DimError>(),
            Some(DimError::NotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_without_snapshot_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let config = load_or_init_config(dir.path())?;
        let result = Feed::open(None, &config, dir.path()).await;
        assert!(result.is_err());
        Ok(())
    }
}

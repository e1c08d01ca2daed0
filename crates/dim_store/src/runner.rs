//! Run entrypoints: pull one snapshot, then hand it to the store.

use log::{error, info};

use catchem_dim_core::{
    DimError, DimResult, DimensionLoadApi, RunMode, RunOptions, RunSummary, SnapshotFeed,
};

/// Runs one load of `mode` over a freshly pulled snapshot.
///
/// A feed failure aborts the run before anything is written.
pub async fn run_dimension<S>(
    mode: RunMode,
    feed: &dyn SnapshotFeed,
    store: &S,
    options: &RunOptions,
) -> DimResult<RunSummary>
where
    S: DimensionLoadApi + ?Sized,
{
    let snapshot = feed.fetch_snapshot().await.map_err(|err| {
        error!("dim_user: snapshot pull failed: {err}");
        match err {
            DimError::Connectivity { .. } | DimError::Source { .. } => err,
            other => DimError::source(other.to_string()),
        }
    })?;
    info!("dim_user: pulled {} snapshot records for {mode}", snapshot.len());
    match mode {
        RunMode::Baseline => store.load_baseline(snapshot, options).await,
        RunMode::Incremental => store.apply_snapshot(snapshot, options).await,
    }
}

pub async fn run_baseline<S>(
    feed: &dyn SnapshotFeed,
    store: &S,
    options: &RunOptions,
) -> DimResult<RunSummary>
where
    S: DimensionLoadApi + ?Sized,
{
    run_dimension(RunMode::Baseline, feed, store, options).await
}

pub async fn run_incremental<S>(
    feed: &dyn SnapshotFeed,
    store: &S,
    options: &RunOptions,
) -> DimResult<RunSummary>
where
    S: DimensionLoadApi + ?Sized,
{
    run_dimension(RunMode::Incremental, feed, store, options).await
}

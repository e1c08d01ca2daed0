use std::path::Path;

use async_trait::async_trait;
use log::{error, info, warn};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, TransactionTrait};
use sea_orm_migration::MigratorTrait;

use catchem_dim_core::{
    ClassificationKind, DimError, DimResult, DimensionLoadApi, DimensionReadApi, DimensionRecord,
    IntegrityApi, IntegrityReport, NaturalKey, RunMode, RunOptions, RunSummary, SnapshotRecord,
    ValidTime, ValidityStartPolicy,
};

use crate::baseline::{ensure_unseeded, seed_entity};
use crate::datastore::connect_database;
use crate::integrity::verify_history;
use crate::lookup::{count_versions, find_active_version, list_versions};
use crate::migration::Migrator;
use crate::writer::process_entity;
use crate::DwhConfig;

/// Historized `dim_user` store on one pooled connection.
#[derive(Clone)]
pub struct DimStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
}

#[derive(Clone, Copy, Debug)]
pub struct BackendCapabilities {
    pub partial_indexes: bool,
    pub savepoints: bool,
}

impl DimStore {
    pub async fn connect(config: &DwhConfig, base_dir: &Path) -> DimResult<Self> {
        let conn = connect_database(&config.warehouse, config.pool.as_ref(), base_dir).await?;
        Self::from_connection(conn).await
    }

    /// Wraps an open connection and brings the schema up to date.
    pub async fn from_connection(conn: DatabaseConnection) -> DimResult<Self> {
        let backend = conn.get_database_backend();
        Migrator::up(&conn, None).await.map_err(DimError::from)?;
        Ok(Self { conn, backend })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        match self.backend {
            DatabaseBackend::Sqlite | DatabaseBackend::Postgres => BackendCapabilities {
                partial_indexes: true,
                savepoints: true,
            },
            DatabaseBackend::MySql => BackendCapabilities {
                partial_indexes: false,
                savepoints: true,
            },
            _ => BackendCapabilities {
                partial_indexes: false,
                savepoints: false,
            },
        }
    }

    pub async fn close(self) -> DimResult<()> {
        self.conn.close().await.map_err(DimError::from)
    }

    async fn run_entities(
        &self,
        mode: RunMode,
        snapshot: &[SnapshotRecord],
        options: &RunOptions,
    ) -> DimResult<RunSummary> {
        let processed_at = options.resolve_processed_at();
        let mut summary = RunSummary::new(mode, processed_at);
        let batch_size = if self.capabilities().savepoints {
            options.batch_size.max(1)
        } else {
            1
        };
        info!(
            "dim_user: {mode} run over {} users at {processed_at} (batch_size={batch_size})",
            snapshot.len()
        );

        for chunk in snapshot.chunks(batch_size) {
            if batch_size == 1 {
                for record in chunk {
                    let outcome = process_one(
                        &self.conn,
                        mode,
                        record,
                        processed_at,
                        options.start_policy,
                    )
                    .await;
                    tally(&mut summary, record.user_id, outcome)?;
                }
                continue;
            }

            let tx = self.conn.begin().await?;
            let mut outcomes = Vec::with_capacity(chunk.len());
            for record in chunk {
                // Each user runs in a savepoint; only a lost connection ends the batch.
                match process_one(&tx, mode, record, processed_at, options.start_policy).await {
                    Err(err) if err.is_fatal() => {
                        error!("dim_user: aborting {mode} run at user {}: {err}", record.user_id);
                        return Err(err);
                    }
                    outcome => outcomes.push((record.user_id, outcome)),
                }
            }
            match tx.commit().await.map_err(DimError::from) {
                Ok(()) => {
                    for (user_id, outcome) in outcomes {
                        tally(&mut summary, user_id, outcome)?;
                    }
                }
                Err(err) if err.is_fatal() => {
                    error!("dim_user: aborting {mode} run: {err}");
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        "dim_user: batch of {} users lost on commit: {err}",
                        chunk.len()
                    );
                    for record in chunk {
                        summary.record_failure(record.user_id, format!("batch commit failed: {err}"));
                    }
                }
            }
        }

        info!("dim_user: {summary}");
        Ok(summary)
    }
}

async fn process_one<C>(
    conn: &C,
    mode: RunMode,
    record: &SnapshotRecord,
    processed_at: ValidTime,
    policy: ValidityStartPolicy,
) -> DimResult<ClassificationKind>
where
    C: ConnectionTrait + TransactionTrait,
{
    match mode {
        RunMode::Baseline => seed_entity(conn, record, processed_at)
            .await
            .map(|_| ClassificationKind::New),
        RunMode::Incremental => process_entity(conn, record, processed_at, policy).await,
    }
}

/// Records one outcome; a fatal error ends the run.
fn tally(
    summary: &mut RunSummary,
    user_id: NaturalKey,
    outcome: DimResult<ClassificationKind>,
) -> DimResult<()> {
    match outcome {
        Ok(kind) => summary.record(kind),
        Err(err) if err.is_fatal() => {
            error!("dim_user: aborting {} run at user {user_id}: {err}", summary.mode);
            return Err(err);
        }
        Err(err) => {
            warn!("dim_user: user {user_id} failed: {err}");
            summary.record_failure(user_id, err.to_string());
        }
    }
    Ok(())
}

#[async_trait]
impl DimensionReadApi for DimStore {
    async fn active_version(&self, user_id: NaturalKey) -> DimResult<Option<DimensionRecord>> {
        find_active_version(&self.conn, user_id).await
    }

    async fn list_versions(&self, user_id: NaturalKey) -> DimResult<Vec<DimensionRecord>> {
        list_versions(&self.conn, user_id).await
    }

    async fn count_versions(&self) -> DimResult<u64> {
        count_versions(&self.conn).await
    }
}

#[async_trait]
impl DimensionLoadApi for DimStore {
    async fn load_baseline(
        &self,
        snapshot: Vec<SnapshotRecord>,
        options: &RunOptions,
    ) -> DimResult<RunSummary> {
        ensure_unseeded(&self.conn).await?;
        self.run_entities(RunMode::Baseline, &snapshot, options).await
    }

    async fn apply_snapshot(
        &self,
        snapshot: Vec<SnapshotRecord>,
        options: &RunOptions,
    ) -> DimResult<RunSummary> {
        self.run_entities(RunMode::Incremental, &snapshot, options)
            .await
    }
}

#[async_trait]
impl IntegrityApi for DimStore {
    async fn verify_history(&self) -> DimResult<IntegrityReport> {
        verify_history(&self.conn).await
    }
}

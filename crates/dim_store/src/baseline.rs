use log::info;
use sea_orm::{ConnectionTrait, TransactionSession, TransactionTrait};

use catchem_dim_core::{
    DimError, DimResult, NewDimensionVersion, SnapshotRecord, SurrogateKey, ValidTime,
};

use crate::lookup::{count_versions, find_active_version};
use crate::writer::insert_version;

/// The baseline only ever runs against an empty dimension.
pub async fn ensure_unseeded<C>(conn: &C) -> DimResult<()>
where
    C: ConnectionTrait,
{
    let existing = count_versions(conn).await?;
    if existing > 0 {
        return Err(DimError::conflict(format!(
            "dim_user already holds {existing} versions; baseline load refused"
        )));
    }
    Ok(())
}

/// Inserts the cold-start version of one user.
///
/// Tier and ownership are forced to their lowest values; the version starts
/// at the user's first log, or at `processed_at` for users without one.
pub async fn seed_entity<C>(
    conn: &C,
    snapshot: &SnapshotRecord,
    processed_at: ValidTime,
) -> DimResult<SurrogateKey>
where
    C: ConnectionTrait + TransactionTrait,
{
    let tx = conn.begin().await?;
    if find_active_version(&tx, snapshot.user_id).await?.is_some() {
        return Err(DimError::conflict(format!(
            "user {} already has an active version",
            snapshot.user_id
        )));
    }
    let row = NewDimensionVersion::baseline(snapshot, processed_at);
    let user_sk = insert_version(&tx, &row).await?;
    tx.commit().await?;
    info!(
        "dim_user: seeded user {} sk={user_sk} start={}",
        snapshot.user_id, row.scd_start
    );
    Ok(user_sk)
}

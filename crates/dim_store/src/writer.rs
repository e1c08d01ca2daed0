//! Version writer: applies a classification to `dim_user`.
//!
//! A changed user is closed and re-inserted inside the caller's transaction.
//! The close is guarded on the surrogate key the lookup returned and on the
//! active flag, so a stale lookup updates nothing and the write is rejected.

use log::{debug, info};
use sea_orm::sea_query::{Expr, ExprTrait, Query};
use sea_orm::{ConnectionTrait, TransactionSession, TransactionTrait};

use catchem_dim_core::{
    classify, Classification, ClassificationKind, DimError, DimResult, DimensionRecord,
    NewDimensionVersion, SnapshotRecord, SurrogateKey, ValidTime, ValidityStartPolicy,
};

use crate::db::DimUser;
use crate::lookup::find_active_version;
use crate::sql::{col_name, exec, key_value, query_one};

pub async fn insert_version<C>(conn: &C, row: &NewDimensionVersion) -> DimResult<SurrogateKey>
where
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    let insert = Query::insert()
        .into_table(DimUser::Table)
        .columns([
            DimUser::UserId,
            DimUser::FirstName,
            DimUser::LastName,
            DimUser::Address,
            DimUser::ExperienceLevel,
            DimUser::IsDedicator,
            DimUser::ScdStart,
            DimUser::ScdEnd,
            DimUser::ScdVersion,
            DimUser::ScdActive,
        ])
        .values_panic([
            key_value(backend, row.user_id).into(),
            row.first_name.clone().into(),
            row.last_name.clone().into(),
            row.address.clone().into(),
            row.experience_level.as_str().into(),
            row.is_dedicator.into(),
            row.scd_start.as_i64().into(),
            row.scd_end().as_i64().into(),
            row.scd_version.into(),
            true.into(),
        ])
        .to_owned();
    exec(conn, &insert).await?;

    // (user_id, scd_version) is unique, which also makes it portable across
    // backends without RETURNING.
    let select = Query::select()
        .from(DimUser::Table)
        .column(DimUser::UserSk)
        .and_where(Expr::col(DimUser::UserId).eq(key_value(backend, row.user_id)))
        .and_where(Expr::col(DimUser::ScdVersion).eq(row.scd_version))
        .to_owned();
    let inserted = query_one(conn, &select)
        .await?
        .ok_or_else(|| DimError::storage("inserted version not readable"))?;
    Ok(SurrogateKey(
        inserted.try_get("", &col_name(DimUser::UserSk))?,
    ))
}

/// Closes `active` at `closed_at`; fails if it is no longer the active row.
pub async fn close_version<C>(
    conn: &C,
    active: &DimensionRecord,
    closed_at: ValidTime,
) -> DimResult<()>
where
    C: ConnectionTrait,
{
    let update = Query::update()
        .table(DimUser::Table)
        .values([
            (DimUser::ScdEnd, closed_at.as_i64().into()),
            (DimUser::ScdActive, false.into()),
        ])
        .and_where(Expr::col(DimUser::UserSk).eq(active.user_sk.0))
        .and_where(Expr::col(DimUser::ScdActive).eq(true))
        .to_owned();
    let affected = exec(conn, &update).await?;
    if affected != 1 {
        return Err(DimError::conflict(format!(
            "user {} version {} is no longer active",
            active.user_id, active.scd_version
        )));
    }
    Ok(())
}

/// Executes the state transition implied by `classification`.
pub async fn write_classification<C>(
    conn: &C,
    snapshot: &SnapshotRecord,
    classification: &Classification,
    processed_at: ValidTime,
    policy: ValidityStartPolicy,
) -> DimResult<Option<SurrogateKey>>
where
    C: ConnectionTrait,
{
    match classification {
        Classification::New => {
            let start = policy.first_version_start(snapshot, processed_at);
            let row = NewDimensionVersion::from_snapshot(snapshot, start, 1);
            let user_sk = insert_version(conn, &row).await?;
            info!(
                "dim_user: inserted user {} version 1 sk={user_sk}",
                snapshot.user_id
            );
            Ok(Some(user_sk))
        }
        Classification::Changed { active, fields } => {
            if processed_at <= active.scd_start {
                return Err(DimError::invalid(format!(
                    "processing time {processed_at} does not follow version {} start {}",
                    active.scd_version, active.scd_start
                )));
            }
            close_version(conn, active, processed_at).await?;
            let row =
                NewDimensionVersion::from_snapshot(snapshot, processed_at, active.scd_version + 1);
            let user_sk = insert_version(conn, &row).await?;
            let fields = fields
                .iter()
                .map(|field| field.as_str())
                .collect::<Vec<_>>()
                .join(",");
            info!(
                "dim_user: updated user {} to version {} sk={user_sk} changed=[{fields}]",
                snapshot.user_id, row.scd_version
            );
            Ok(Some(user_sk))
        }
        Classification::Unchanged { active } => {
            debug!(
                "dim_user: no changes for user {} (version {})",
                snapshot.user_id, active.scd_version
            );
            Ok(None)
        }
    }
}

/// Lookup, classify and write one user inside its own (nested) transaction.
pub async fn process_entity<C>(
    conn: &C,
    snapshot: &SnapshotRecord,
    processed_at: ValidTime,
    policy: ValidityStartPolicy,
) -> DimResult<ClassificationKind>
where
    C: ConnectionTrait + TransactionTrait,
{
    let tx = conn.begin().await?;
    let active = find_active_version(&tx, snapshot.user_id).await?;
    let classification = classify(snapshot, active);
    write_classification(&tx, snapshot, &classification, processed_at, policy).await?;
    tx.commit().await?;
    Ok(classification.kind())
}

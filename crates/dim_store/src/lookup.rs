//! Active-version lookup.
//!
//! Every read goes to the connection it is given, so a lookup issued inside
//! the writer's transaction sees the rows written earlier in the same run.

use sea_orm::sea_query::{Alias, Expr, ExprTrait, Func, Order, Query};
use sea_orm::ConnectionTrait;

use catchem_dim_core::{DimError, DimResult, DimensionRecord, NaturalKey};

use crate::db::{DimUser, DIM_USER_COLUMNS};
use crate::sql::{key_value, query_all, query_one, read_dimension_record};

pub async fn find_active_version<C>(
    conn: &C,
    user_id: NaturalKey,
) -> DimResult<Option<DimensionRecord>>
where
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    let select = Query::select()
        .from(DimUser::Table)
        .columns(DIM_USER_COLUMNS)
        .and_where(Expr::col(DimUser::UserId).eq(key_value(backend, user_id)))
        .and_where(Expr::col(DimUser::ScdActive).eq(true))
        .order_by(DimUser::ScdVersion, Order::Desc)
        .limit(2)
        .to_owned();
    let rows = query_all(conn, &select).await?;
    match rows.as_slice() {
        [] => Ok(None),
        [row] => Ok(Some(read_dimension_record(row)?)),
        _ => Err(DimError::invariant(format!(
            "user {user_id} has more than one active version"
        ))),
    }
}

pub async fn list_versions<C>(conn: &C, user_id: NaturalKey) -> DimResult<Vec<DimensionRecord>>
where
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    let select = Query::select()
        .from(DimUser::Table)
        .columns(DIM_USER_COLUMNS)
        .and_where(Expr::col(DimUser::UserId).eq(key_value(backend, user_id)))
        .order_by(DimUser::ScdVersion, Order::Asc)
        .to_owned();
    query_all(conn, &select)
        .await?
        .iter()
        .map(read_dimension_record)
        .collect()
}

pub async fn count_versions<C>(conn: &C) -> DimResult<u64>
where
    C: ConnectionTrait,
{
    let select = Query::select()
        .from(DimUser::Table)
        .expr_as(Func::count(Expr::col(DimUser::UserSk)), Alias::new("total"))
        .to_owned();
    let total: i64 = match query_one(conn, &select).await? {
        Some(row) => row.try_get("", "total")?,
        None => 0,
    };
    Ok(Ord::max(total, 0) as u64)
}

/// Every row of the table, ordered by user and version.
pub async fn scan_history<C>(conn: &C) -> DimResult<Vec<DimensionRecord>>
where
    C: ConnectionTrait,
{
    let select = Query::select()
        .from(DimUser::Table)
        .columns(DIM_USER_COLUMNS)
        .order_by(DimUser::UserId, Order::Asc)
        .order_by(DimUser::ScdVersion, Order::Asc)
        .to_owned();
    query_all(conn, &select)
        .await?
        .iter()
        .map(read_dimension_record)
        .collect()
}

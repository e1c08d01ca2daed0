use std::str::FromStr;

use sea_orm::sea_query;
use sea_orm::sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder,
    Value as SeaValue,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult, Statement};
use uuid::Uuid;

use catchem_dim_core::{
    DimError, DimResult, DimensionRecord, ExperienceLevel, NaturalKey, SurrogateKey, ValidTime,
};

use crate::db::DimUser;

pub(crate) fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> DimResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> DimResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> DimResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

pub(crate) fn key_value(backend: DatabaseBackend, key: NaturalKey) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => SeaValue::Uuid(Some(Uuid::from_bytes(key.as_bytes()))),
        DatabaseBackend::MySql => SeaValue::Bytes(Some(key.as_vec())),
        _ => SeaValue::String(Some(key.to_uuid_string())),
    }
}

pub(crate) fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

pub(crate) fn read_key_by_name(row: &QueryResult, name: &str) -> DimResult<NaturalKey> {
    if let Ok(value) = row.try_get::<String>("", name) {
        return NaturalKey::from_uuid_str(&value);
    }
    if let Ok(value) = row.try_get::<Uuid>("", name) {
        return Ok(NaturalKey::from_bytes(*value.as_bytes()));
    }
    if let Ok(value) = row.try_get::<Vec<u8>>("", name) {
        return NaturalKey::from_slice(&value);
    }
    Err(DimError::storage(format!("unsupported user id format in '{name}'")))
}

pub(crate) fn read_key(row: &QueryResult, column: impl sea_query::Iden) -> DimResult<NaturalKey> {
    read_key_by_name(row, &col_name(column))
}

pub(crate) fn read_time(row: &QueryResult, column: impl sea_query::Iden) -> DimResult<ValidTime> {
    let value: i64 = row.try_get("", &col_name(column))?;
    Ok(ValidTime(value))
}

pub(crate) fn read_dimension_record(row: &QueryResult) -> DimResult<DimensionRecord> {
    let level: String = row.try_get("", &col_name(DimUser::ExperienceLevel))?;
    Ok(DimensionRecord {
        user_sk: SurrogateKey(row.try_get("", &col_name(DimUser::UserSk))?),
        user_id: read_key(row, DimUser::UserId)?,
        first_name: row.try_get("", &col_name(DimUser::FirstName))?,
        last_name: row.try_get("", &col_name(DimUser::LastName))?,
        address: row.try_get("", &col_name(DimUser::Address))?,
        experience_level: ExperienceLevel::from_str(&level)?,
        is_dedicator: row.try_get("", &col_name(DimUser::IsDedicator))?,
        scd_start: read_time(row, DimUser::ScdStart)?,
        scd_end: read_time(row, DimUser::ScdEnd)?,
        scd_version: row.try_get("", &col_name(DimUser::ScdVersion))?,
        scd_active: row.try_get("", &col_name(DimUser::ScdActive))?,
    })
}

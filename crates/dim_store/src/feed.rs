//! Snapshot feed over the operational Catchem database.
//!
//! One row per user: name, address parts, found-log count and first found
//! log (`log_type = 2`), and the number of owned treasures. Tier bucketing
//! and the dedicator flag are derived in Rust.

use std::path::Path;

use async_trait::async_trait;
use log::info;
use sea_orm::sea_query::{Alias, Expr, ExprTrait, Func, Order, Query, SelectStatement};
use sea_orm::{DatabaseConnection, QueryResult};
use time::{OffsetDateTime, PrimitiveDateTime};
use unicode_normalization::UnicodeNormalization;

use catchem_dim_core::{DimError, DimResult, SnapshotFeed, SnapshotRecord, ValidTime};

use crate::datastore::connect_database;
use crate::db::{SrcCity, SrcCountry, SrcTreasure, SrcTreasureLog, SrcUser};
use crate::sql::{query_all, read_key_by_name};
use crate::{DatabaseConfig, PoolConfig};

/// Log type of a "found" entry in `treasure_log`.
pub const FOUND_LOG_TYPE: i32 = 2;

pub struct SqlSnapshotFeed {
    conn: DatabaseConnection,
}

impl SqlSnapshotFeed {
    pub async fn connect(
        database: &DatabaseConfig,
        pool: Option<&PoolConfig>,
        base_dir: &Path,
    ) -> DimResult<Self> {
        let conn = connect_database(database, pool, base_dir).await?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn close(self) -> DimResult<()> {
        self.conn.close().await.map_err(DimError::from)
    }
}

#[async_trait]
impl SnapshotFeed for SqlSnapshotFeed {
    async fn fetch_snapshot(&self) -> DimResult<Vec<SnapshotRecord>> {
        info!("feed: extracting user snapshot from operational store");
        let rows = query_all(&self.conn, &snapshot_query())
            .await
            .map_err(|err| {
                if err.is_fatal() {
                    err
                } else {
                    DimError::source(format!("snapshot query: {err}"))
                }
            })?;
        let records = rows
            .iter()
            .map(snapshot_from_row)
            .collect::<DimResult<Vec<_>>>()?;
        info!("feed: snapshot holds {} users", records.len());
        Ok(records)
    }
}

pub fn snapshot_query() -> SelectStatement {
    Query::select()
        .expr_as(Expr::col((SrcUser::Table, SrcUser::Id)), Alias::new("user_id"))
        .column((SrcUser::Table, SrcUser::FirstName))
        .column((SrcUser::Table, SrcUser::LastName))
        .column((SrcUser::Table, SrcUser::Number))
        .column((SrcUser::Table, SrcUser::Street))
        .column((SrcCity::Table, SrcCity::CityName))
        .expr_as(
            Expr::col((SrcCountry::Table, SrcCountry::Name)),
            Alias::new("country_name"),
        )
        .expr_as(
            Func::count_distinct(Expr::col((SrcTreasureLog::Table, SrcTreasureLog::Id))),
            Alias::new("found_logs"),
        )
        .expr_as(
            Func::min(Expr::col((SrcTreasureLog::Table, SrcTreasureLog::LogTime))),
            Alias::new("earliest_log"),
        )
        .expr_as(
            Func::count_distinct(Expr::col((SrcTreasure::Table, SrcTreasure::Id))),
            Alias::new("owned_treasures"),
        )
        .from(SrcUser::Table)
        .left_join(
            SrcCity::Table,
            Expr::col((SrcUser::Table, SrcUser::CityCityId))
                .equals((SrcCity::Table, SrcCity::CityId)),
        )
        .left_join(
            SrcCountry::Table,
            Expr::col((SrcCity::Table, SrcCity::CountryCode))
                .equals((SrcCountry::Table, SrcCountry::Code)),
        )
        // Filtering in the join keeps users without found logs (Starters).
        .left_join(
            SrcTreasureLog::Table,
            Expr::col((SrcUser::Table, SrcUser::Id))
                .equals((SrcTreasureLog::Table, SrcTreasureLog::HunterId))
                .and(Expr::col((SrcTreasureLog::Table, SrcTreasureLog::LogType)).eq(FOUND_LOG_TYPE)),
        )
        .left_join(
            SrcTreasure::Table,
            Expr::col((SrcUser::Table, SrcUser::Id))
                .equals((SrcTreasure::Table, SrcTreasure::OwnerId)),
        )
        .group_by_col((SrcUser::Table, SrcUser::Id))
        .group_by_col((SrcUser::Table, SrcUser::FirstName))
        .group_by_col((SrcUser::Table, SrcUser::LastName))
        .group_by_col((SrcUser::Table, SrcUser::Number))
        .group_by_col((SrcUser::Table, SrcUser::Street))
        .group_by_col((SrcCity::Table, SrcCity::CityName))
        .group_by_col((SrcCountry::Table, SrcCountry::Name))
        .order_by((SrcUser::Table, SrcUser::Id), Order::Asc)
        .to_owned()
}

/// `"{number} {street} {city} {country}"`, missing parts left empty.
pub fn compose_address(
    number: Option<&str>,
    street: Option<&str>,
    city: Option<&str>,
    country: Option<&str>,
) -> String {
    let composed = format!(
        "{} {} {} {}",
        number.unwrap_or_default(),
        street.unwrap_or_default(),
        city.unwrap_or_default(),
        country.unwrap_or_default()
    );
    composed.nfc().collect()
}

fn snapshot_from_row(row: &QueryResult) -> DimResult<SnapshotRecord> {
    let user_id = read_key_by_name(row, "user_id")?;
    let first_name = read_text(row, "first_name")?.unwrap_or_default();
    let last_name = read_text(row, "last_name")?.unwrap_or_default();
    let number = read_text(row, "number")?;
    let street = read_text(row, "street")?;
    let city = read_text(row, "city_name")?;
    let country = read_text(row, "country_name")?;
    let found_logs = read_count(row, "found_logs")?;
    let owned_treasures = read_count(row, "owned_treasures")?;
    let earliest_log = read_source_time(row, "earliest_log")?;
    Ok(SnapshotRecord::from_activity(
        user_id,
        first_name.nfc().collect::<String>(),
        last_name.nfc().collect::<String>(),
        compose_address(
            number.as_deref(),
            street.as_deref(),
            city.as_deref(),
            country.as_deref(),
        ),
        found_logs,
        earliest_log,
        owned_treasures,
    ))
}

// House numbers are text in some deployments and integers in others.
fn read_text(row: &QueryResult, name: &str) -> DimResult<Option<String>> {
    if let Ok(value) = row.try_get::<Option<String>>("", name) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<Option<i64>>("", name) {
        return Ok(value.map(|value| value.to_string()));
    }
    if let Ok(value) = row.try_get::<Option<i32>>("", name) {
        return Ok(value.map(|value| value.to_string()));
    }
    Err(DimError::source(format!("unsupported text column '{name}'")))
}

fn read_count(row: &QueryResult, name: &str) -> DimResult<u64> {
    let value: i64 = row
        .try_get("", name)
        .map_err(|err| DimError::source(format!("read {name}: {err}")))?;
    u64::try_from(value).map_err(|_| DimError::source(format!("negative {name}: {value}")))
}

fn read_source_time(row: &QueryResult, name: &str) -> DimResult<Option<ValidTime>> {
    if let Ok(value) = row.try_get::<Option<i64>>("", name) {
        return Ok(value.map(ValidTime));
    }
    if let Ok(value) = row.try_get::<Option<OffsetDateTime>>("", name) {
        return Ok(value.map(ValidTime::from_offset));
    }
    if let Ok(value) = row.try_get::<Option<PrimitiveDateTime>>("", name) {
        return Ok(value.map(|value| ValidTime::from_offset(value.assume_utc())));
    }
    if let Ok(value) = row.try_get::<Option<String>>("", name) {
        return value
            .map(|value| ValidTime::parse_sql_datetime(&value))
            .transpose()
            .map_err(|err| DimError::source(format!("read {name}: {err}")));
    }
    Err(DimError::source(format!("unsupported timestamp column '{name}'")))
}

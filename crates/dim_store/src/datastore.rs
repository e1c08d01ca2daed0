use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use catchem_dim_core::{DimError, DimResult};

use crate::config::DEFAULT_DB_NAME;
use crate::{DatabaseConfig, DimStore, DwhConfig, PoolConfig};

pub fn load_or_init_config(base: &Path) -> DimResult<DwhConfig> {
    let default_sqlite = base.join(DEFAULT_DB_NAME);
    DwhConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_store(base: &Path) -> DimResult<DimStore> {
    let config = load_or_init_config(base)?;
    DimStore::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}

/// Opens a pooled connection; any failure here is a connectivity error.
pub async fn connect_database(
    database: &DatabaseConfig,
    pool: Option<&PoolConfig>,
    base_dir: &Path,
) -> DimResult<DatabaseConnection> {
    let url = database.connection_url(base_dir)?;
    let mut options = ConnectOptions::new(url);
    options.sqlx_logging(false);
    if let Some(pool) = pool {
        if let Some(max) = pool.max_connections {
            options.max_connections(max);
        }
        if let Some(min) = pool.min_connections {
            options.min_connections(min);
        }
        if let Some(timeout_ms) = pool.connect_timeout_ms {
            options.connect_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(timeout_ms) = pool.acquire_timeout_ms {
            options.acquire_timeout(Duration::from_millis(timeout_ms));
        }
        if let Some(timeout_ms) = pool.idle_timeout_ms {
            options.idle_timeout(Duration::from_millis(timeout_ms));
        }
    }
    let conn = Database::connect(options).await.map_err(|err| {
        DimError::connectivity(format!("{} connect: {err}", database.backend_name()))
    })?;
    info!("dwh: connected to {} database", database.backend_name());
    Ok(conn)
}

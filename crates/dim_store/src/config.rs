use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use catchem_dim_core::{DimError, DimResult, RunOptions, ValidityStartPolicy};

pub const DEFAULT_CONFIG_NAME: &str = "dwh.json";
pub const DEFAULT_DB_NAME: &str = "dwh.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
    Mysql { url: String },
}

impl DatabaseConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            DatabaseConfig::Sqlite { .. } => "sqlite",
            DatabaseConfig::Postgres { .. } => "postgres",
            DatabaseConfig::Mysql { .. } => "mysql",
        }
    }

    /// Resolves a relative sqlite path against `base_dir`.
    pub fn sqlite_path(&self, base_dir: &Path) -> DimResult<PathBuf> {
        match self {
            DatabaseConfig::Sqlite { path } => {
                let path = path.clone().unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Ok(candidate)
                } else {
                    Ok(base_dir.join(candidate))
                }
            }
            _ => Err(DimError::invalid("config is not sqlite backend")),
        }
    }

    pub fn connection_url(&self, base_dir: &Path) -> DimResult<String> {
        match self {
            DatabaseConfig::Sqlite { .. } => {
                let path = self.sqlite_path(base_dir)?;
                Ok(format!("sqlite://{}?mode=rwc", path.display()))
            }
            DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Ok(url.clone()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScdConfig {
    pub start_policy: Option<ValidityStartPolicy>,
    pub batch_size: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DwhConfig {
    pub warehouse: DatabaseConfig,
    pub source: Option<DatabaseConfig>,
    pub pool: Option<PoolConfig>,
    pub scd: Option<ScdConfig>,
}

impl DwhConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            warehouse: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            source: None,
            pool: None,
            scd: Some(ScdConfig {
                start_policy: Some(ValidityStartPolicy::ProcessingTime),
                batch_size: Some(1),
            }),
        }
    }

    pub fn load_or_init(base_dir: &Path, default_sqlite_path: &Path) -> DimResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| DimError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| DimError::storage(format!("read config: {err}")))?;
            let config: DwhConfig =
                serde_json::from_str(&raw).map_err(|err| DimError::invalid(err.to_string()))?;
            return Ok(config);
        }
        let default = DwhConfig::default_sqlite(default_sqlite_path.to_string_lossy());
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| DimError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| DimError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    pub fn backend_name(&self) -> &'static str {
        self.warehouse.backend_name()
    }

    pub fn sqlite_path(&self, base_dir: &Path) -> DimResult<PathBuf> {
        self.warehouse.sqlite_path(base_dir)
    }

    /// Run options seeded from the `scd` section.
    pub fn run_options(&self) -> RunOptions {
        let mut options = RunOptions::default();
        if let Some(scd) = &self.scd {
            if let Some(policy) = scd.start_policy {
                options.start_policy = policy;
            }
            if let Some(batch_size) = scd.batch_size {
                options.batch_size = batch_size.max(1);
            }
        }
        options
    }
}

pub mod baseline;
pub mod config;
pub mod datastore;
mod db;
pub mod feed;
pub mod integrity;
pub mod lookup;
pub mod migration;
pub mod runner;
mod sql;
pub mod store;
pub mod writer;

pub use catchem_dim_core::*;
pub use config::{DatabaseConfig, DwhConfig, PoolConfig, ScdConfig};
pub use datastore::{connect_database, default_sqlite_path, load_or_init_config, open_store};
pub use feed::SqlSnapshotFeed;
pub use runner::{run_baseline, run_dimension, run_incremental};
pub use store::{BackendCapabilities, DimStore};

use std::collections::HashSet;

use catchem_dim_store::{DimError, DimResult, DimStore, DwhConfig};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tempfile::tempdir;

async fn list_names(store: &DimStore, kind: &str) -> DimResult<HashSet<String>> {
    let rows = store
        .connection()
        .query_all_raw(Statement::from_string(
            DatabaseBackend::Sqlite,
            format!("SELECT name FROM sqlite_master WHERE type = '{kind}'"),
        ))
        .await
        .map_err(DimError::from)?;
    let mut names = HashSet::new();
    for row in rows {
        let name: String = row.try_get("", "name").map_err(DimError::from)?;
        names.insert(name);
    }
    Ok(names)
}

#[tokio::test]
async fn sqlite_migrations_create_dimension_tables() -> DimResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = DwhConfig::default_sqlite(base.join("dwh.sqlite").to_string_lossy());
    let store = DimStore::connect(&config, base).await?;

    let tables = list_names(&store, "table").await?;
    for table in ["dwh_schema_version", "dim_user"] {
        assert!(tables.contains(table), "expected table '{table}' to exist");
    }
    let indexes = list_names(&store, "index").await?;
    for index in [
        "dim_user_active_lookup_idx",
        "dim_user_version_uq",
        "dim_user_one_active_uq",
    ] {
        assert!(indexes.contains(index), "expected index '{index}' to exist");
    }

    let caps = store.capabilities();
    assert!(caps.partial_indexes);
    assert!(caps.savepoints);
    store.close().await?;

    // Idempotency check.
    let store = DimStore::connect(&config, base).await?;
    let rows = store
        .connection()
        .query_all_raw(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT version, checksum FROM dwh_schema_version",
        ))
        .await
        .map_err(DimError::from)?;
    assert_eq!(rows.len(), 1);
    let checksum: String = rows[0].try_get("", "checksum").map_err(DimError::from)?;
    assert!(!checksum.is_empty());
    store.close().await?;
    Ok(())
}

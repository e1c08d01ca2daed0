use catchem_dim_store::{
    DimError, DimResult, DimStore, DimensionLoadApi, DimensionReadApi, DwhConfig,
    ExperienceLevel, NaturalKey, RunMode, RunOptions, SnapshotRecord, ValidTime, SENTINEL_END,
};
use tempfile::tempdir;

async fn open(dir: &std::path::Path) -> DimResult<DimStore> {
    let config = DwhConfig::default_sqlite(dir.join("dwh.sqlite").to_string_lossy());
    DimStore::connect(&config, dir).await
}

fn crew() -> Vec<SnapshotRecord> {
    vec![
        SnapshotRecord::from_activity(
            NaturalKey::new(),
            "Anne",
            "Bonny",
            "12 Oak St Nassau Bahamas",
            14,
            Some(ValidTime::from_unix_seconds(1_600_000_000)),
            3,
        ),
        SnapshotRecord::from_activity(
            NaturalKey::new(),
            "Mary",
            "Read",
            "7 Harbour Rd Kingston Jamaica",
            2,
            Some(ValidTime::from_unix_seconds(1_650_000_000)),
            0,
        ),
        SnapshotRecord::from_activity(
            NaturalKey::new(),
            "Calico",
            "Jack",
            "1 Port Royal Kingston Jamaica",
            0,
            None,
            0,
        ),
    ]
}

#[tokio::test]
async fn baseline_seeds_every_user_at_lowest_tier() -> DimResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let processed_at = ValidTime::from_unix_seconds(1_700_000_000);
    let snapshot = crew();

    let summary = store
        .load_baseline(snapshot.clone(), &RunOptions::at(processed_at))
        .await?;
    assert_eq!(summary.mode, RunMode::Baseline);
    assert_eq!(summary.processed_at, processed_at);
    assert_eq!(summary.new, 3);
    assert!(summary.is_clean());
    assert_eq!(store.count_versions().await?, 3);

    for record in &snapshot {
        let active = store
            .active_version(record.user_id)
            .await?
            .expect("seeded version");
        assert_eq!(active.scd_version, 1);
        assert!(active.scd_active);
        assert_eq!(active.scd_end, SENTINEL_END);
        assert_eq!(active.experience_level, ExperienceLevel::Starter);
        assert!(!active.is_dedicator);
        assert_eq!(active.address, record.address);
        assert_eq!(active.first_name, record.first_name);
        assert_eq!(
            active.scd_start,
            record.earliest_log.unwrap_or(processed_at)
        );
    }
    store.close().await?;
    Ok(())
}

#[tokio::test]
async fn baseline_refuses_a_seeded_dimension() -> DimResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let options = RunOptions::at(ValidTime::from_unix_seconds(1_700_000_000));
    store.load_baseline(crew(), &options).await?;

    let err = store
        .load_baseline(crew(), &options)
        .await
        .expect_err("second baseline must be refused");
    assert!(matches!(err, DimError::Conflict { .. }), "{err}");
    assert_eq!(store.count_versions().await?, 3);
    store.close().await?;
    Ok(())
}

#[tokio::test]
async fn baseline_records_duplicate_users_as_failures() -> DimResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let mut snapshot = crew();
    snapshot.push(snapshot[0].clone());

    let summary = store
        .load_baseline(
            snapshot.clone(),
            &RunOptions::at(ValidTime::from_unix_seconds(1_700_000_000)),
        )
        .await?;
    assert_eq!(summary.new, 3);
    assert_eq!(summary.failed_count(), 1);
    assert_eq!(summary.failed[0].user_id, snapshot[0].user_id);
    assert_eq!(store.list_versions(snapshot[0].user_id).await?.len(), 1);
    store.close().await?;
    Ok(())
}

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    ClassificationKind, DimResult, DimensionRecord, NaturalKey, SnapshotRecord, ValidTime,
};

/// Produces one current-state record per user for a run.
#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    async fn fetch_snapshot(&self) -> DimResult<Vec<SnapshotRecord>>;
}

/// Fixed snapshot, used for JSON snapshot files and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticSnapshotFeed {
    records: Vec<SnapshotRecord>,
}

impl StaticSnapshotFeed {
    pub fn new(records: Vec<SnapshotRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl SnapshotFeed for StaticSnapshotFeed {
    async fn fetch_snapshot(&self) -> DimResult<Vec<SnapshotRecord>> {
        Ok(self.records.clone())
    }
}

#[async_trait]
pub trait DimensionReadApi {
    async fn active_version(&self, user_id: NaturalKey) -> DimResult<Option<DimensionRecord>>;
    async fn list_versions(&self, user_id: NaturalKey) -> DimResult<Vec<DimensionRecord>>;
    async fn count_versions(&self) -> DimResult<u64>;
}

#[async_trait]
pub trait DimensionLoadApi {
    async fn load_baseline(
        &self,
        snapshot: Vec<SnapshotRecord>,
        options: &RunOptions,
    ) -> DimResult<RunSummary>;

    async fn apply_snapshot(
        &self,
        snapshot: Vec<SnapshotRecord>,
        options: &RunOptions,
    ) -> DimResult<RunSummary>;
}

#[async_trait]
pub trait IntegrityApi {
    async fn verify_history(&self) -> DimResult<IntegrityReport>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Baseline,
    Incremental,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Baseline => "baseline",
            RunMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the validity of a first incremental version starts.
///
/// Changed versions always start at processing time so the closed version
/// ends exactly where its successor begins.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidityStartPolicy {
    #[default]
    ProcessingTime,
    EventTime,
}

impl ValidityStartPolicy {
    pub fn first_version_start(self, snapshot: &SnapshotRecord, processed_at: ValidTime) -> ValidTime {
        match self {
            ValidityStartPolicy::ProcessingTime => processed_at,
            ValidityStartPolicy::EventTime => snapshot.earliest_log.unwrap_or(processed_at),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// Defaults to the wall clock at the start of the run.
    pub processed_at: Option<ValidTime>,
    pub start_policy: ValidityStartPolicy,
    /// Entities sharing one transaction; 1 commits every entity on its own.
    pub batch_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            processed_at: None,
            start_policy: ValidityStartPolicy::default(),
            batch_size: 1,
        }
    }
}

impl RunOptions {
    pub fn at(processed_at: ValidTime) -> Self {
        Self {
            processed_at: Some(processed_at),
            ..Self::default()
        }
    }

    pub fn resolve_processed_at(&self) -> ValidTime {
        self.processed_at.unwrap_or_else(ValidTime::now_micros)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub user_id: NaturalKey,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub processed_at: ValidTime,
    pub new: u64,
    pub changed: u64,
    pub unchanged: u64,
    pub failed: Vec<EntityFailure>,
}

impl RunSummary {
    pub fn new(mode: RunMode, processed_at: ValidTime) -> Self {
        Self {
            mode,
            processed_at,
            new: 0,
            changed: 0,
            unchanged: 0,
            failed: Vec::new(),
        }
    }

    pub fn record(&mut self, kind: ClassificationKind) {
        match kind {
            ClassificationKind::New => self.new += 1,
            ClassificationKind::Changed => self.changed += 1,
            ClassificationKind::Unchanged => self.unchanged += 1,
        }
    }

    pub fn record_failure(&mut self, user_id: NaturalKey, message: impl Into<String>) {
        self.failed.push(EntityFailure {
            user_id,
            message: message.into(),
        });
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.len() as u64
    }

    pub fn processed(&self) -> u64 {
        self.new + self.changed + self.unchanged + self.failed_count()
    }

    pub fn written(&self) -> u64 {
        self.new + self.changed
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} run at {}: new={} changed={} unchanged={} failed={}",
            self.mode,
            self.processed_at,
            self.new,
            self.changed,
            self.unchanged,
            self.failed.len()
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    NoActiveVersion,
    MultipleActiveVersions { count: u64 },
    VersionGap { expected: i32, found: i32 },
    CoverageGap { version: i32, scd_end: ValidTime, next_start: ValidTime },
    NonIncreasingStart { version: i32 },
    ActiveVersionClosed { version: i32, scd_end: ValidTime },
    InactiveVersionOpen { version: i32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub user_id: NaturalKey,
    pub issue: IntegrityIssue,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub users_checked: u64,
    pub versions_checked: u64,
    pub violations: Vec<IntegrityViolation>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{RunMode, RunOptions, RunSummary, ValidityStartPolicy};
    use crate::{ClassificationKind, NaturalKey, SnapshotRecord, ValidTime};

    #[test]
    fn summary_counts_each_kind() {
        let mut summary = RunSummary::new(RunMode::Incremental, ValidTime(0));
        summary.record(ClassificationKind::New);
        summary.record(ClassificationKind::Changed);
        summary.record(ClassificationKind::Unchanged);
        summary.record(ClassificationKind::Unchanged);
        summary.record_failure(NaturalKey::new(), "boom");
        assert_eq!(summary.new, 1);
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.unchanged, 2);
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.processed(), 5);
        assert_eq!(summary.written(), 2);
        assert!(!summary.is_clean());
    }

    #[test]
    fn start_policy_picks_event_or_processing_time() {
        let first_log = ValidTime::from_unix_seconds(1_500_000_000);
        let now = ValidTime::from_unix_seconds(1_700_000_000);
        let active = SnapshotRecord::from_activity(
            NaturalKey::new(),
            "Ching",
            "Shih",
            "1 Canton Rd",
            5,
            Some(first_log),
            0,
        );
        let idle =
            SnapshotRecord::from_activity(NaturalKey::new(), "Ned", "Low", "", 0, None, 0);
        assert_eq!(
            ValidityStartPolicy::ProcessingTime.first_version_start(&active, now),
            now
        );
        assert_eq!(
            ValidityStartPolicy::EventTime.first_version_start(&active, now),
            first_log
        );
        assert_eq!(ValidityStartPolicy::EventTime.first_version_start(&idle, now), now);
    }

    #[test]
    fn default_options_commit_per_entity() {
        let options = RunOptions::default();
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.start_policy, ValidityStartPolicy::ProcessingTime);
        let fixed = RunOptions::at(ValidTime(42));
        assert_eq!(fixed.resolve_processed_at(), ValidTime(42));
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DimError, DimResult, NaturalKey, SurrogateKey, ValidTime, SENTINEL_END};

/// Activity tier derived from the number of found logs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum ExperienceLevel {
    Starter,
    Amateur,
    Professional,
    Pirate,
}

impl ExperienceLevel {
    /// 0 → Starter, 1–3 → Amateur, 4–10 → Professional, above → Pirate.
    pub fn from_log_count(found_logs: u64) -> Self {
        match found_logs {
            0 => ExperienceLevel::Starter,
            1..=3 => ExperienceLevel::Amateur,
            4..=10 => ExperienceLevel::Professional,
            _ => ExperienceLevel::Pirate,
        }
    }

    pub fn lowest() -> Self {
        ExperienceLevel::Starter
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExperienceLevel::Starter => "Starter",
            ExperienceLevel::Amateur => "Amateur",
            ExperienceLevel::Professional => "Professional",
            ExperienceLevel::Pirate => "Pirate",
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperienceLevel {
    type Err = DimError;

    fn from_str(value: &str) -> DimResult<Self> {
        match value {
            "Starter" => Ok(ExperienceLevel::Starter),
            "Amateur" => Ok(ExperienceLevel::Amateur),
            "Professional" => Ok(ExperienceLevel::Professional),
            "Pirate" => Ok(ExperienceLevel::Pirate),
            other => Err(DimError::invalid(format!("unknown experience level '{other}'"))),
        }
    }
}

/// Attributes whose change opens a new dimension version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedAttributes<'a> {
    pub address: &'a str,
    pub is_dedicator: bool,
}

/// Current state of one user as computed from the operational store.
///
/// On deserialization the tier is derived from `found_logs`; a supplied tier
/// that disagrees with it is rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotRecordInput")]
pub struct SnapshotRecord {
    pub user_id: NaturalKey,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub found_logs: u64,
    #[serde(default)]
    pub earliest_log: Option<ValidTime>,
    pub experience_level: ExperienceLevel,
    pub is_dedicator: bool,
}

#[derive(Deserialize)]
struct SnapshotRecordInput {
    user_id: NaturalKey,
    first_name: String,
    last_name: String,
    address: String,
    found_logs: u64,
    #[serde(default)]
    earliest_log: Option<ValidTime>,
    #[serde(default)]
    experience_level: Option<ExperienceLevel>,
    is_dedicator: bool,
}

impl TryFrom<SnapshotRecordInput> for SnapshotRecord {
    type Error = DimError;

    fn try_from(input: SnapshotRecordInput) -> DimResult<Self> {
        let derived = ExperienceLevel::from_log_count(input.found_logs);
        if let Some(level) = input.experience_level {
            if level != derived {
                return Err(DimError::invalid(format!(
                    "user {}: experience level {level} does not match {} found logs",
                    input.user_id, input.found_logs
                )));
            }
        }
        Ok(Self {
            user_id: input.user_id,
            first_name: input.first_name,
            last_name: input.last_name,
            address: input.address,
            found_logs: input.found_logs,
            earliest_log: input.earliest_log,
            experience_level: derived,
            is_dedicator: input.is_dedicator,
        })
    }
}

impl SnapshotRecord {
    /// Derives the tier and dedicator flag from raw activity counts.
    pub fn from_activity(
        user_id: NaturalKey,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        address: impl Into<String>,
        found_logs: u64,
        earliest_log: Option<ValidTime>,
        owned_treasures: u64,
    ) -> Self {
        Self {
            user_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            address: address.into(),
            found_logs,
            earliest_log,
            experience_level: ExperienceLevel::from_log_count(found_logs),
            is_dedicator: owned_treasures > 0,
        }
    }

    pub fn tracked(&self) -> TrackedAttributes<'_> {
        TrackedAttributes {
            address: &self.address,
            is_dedicator: self.is_dedicator,
        }
    }
}

/// One persisted version of a user in `dim_user`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRecord {
    pub user_sk: SurrogateKey,
    pub user_id: NaturalKey,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub experience_level: ExperienceLevel,
    pub is_dedicator: bool,
    pub scd_start: ValidTime,
    pub scd_end: ValidTime,
    pub scd_version: i32,
    pub scd_active: bool,
}

impl DimensionRecord {
    pub fn tracked(&self) -> TrackedAttributes<'_> {
        TrackedAttributes {
            address: &self.address,
            is_dedicator: self.is_dedicator,
        }
    }

    pub fn is_open(&self) -> bool {
        self.scd_end.is_sentinel()
    }
}

/// Row to insert as a new version; the store assigns the surrogate key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDimensionVersion {
    pub user_id: NaturalKey,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub experience_level: ExperienceLevel,
    pub is_dedicator: bool,
    pub scd_start: ValidTime,
    pub scd_version: i32,
}

impl NewDimensionVersion {
    pub fn from_snapshot(snapshot: &SnapshotRecord, scd_start: ValidTime, scd_version: i32) -> Self {
        Self {
            user_id: snapshot.user_id,
            first_name: snapshot.first_name.clone(),
            last_name: snapshot.last_name.clone(),
            address: snapshot.address.clone(),
            experience_level: snapshot.experience_level,
            is_dedicator: snapshot.is_dedicator,
            scd_start,
            scd_version,
        }
    }

    /// Cold-start row: lowest tier and no ownership regardless of the snapshot.
    pub fn baseline(snapshot: &SnapshotRecord, fallback_start: ValidTime) -> Self {
        Self {
            experience_level: ExperienceLevel::lowest(),
            is_dedicator: false,
            ..Self::from_snapshot(snapshot, snapshot.earliest_log.unwrap_or(fallback_start), 1)
        }
    }

    pub fn scd_end(&self) -> ValidTime {
        SENTINEL_END
    }
}

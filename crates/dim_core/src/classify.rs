//! Change detection between a snapshot and the active dimension version.
//!
//! Only the tracked attributes (address and the dedicator flag) take part in
//! the comparison. Log counts and the experience tier move on every run and
//! never open a version on their own.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DimensionRecord, SnapshotRecord};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Address,
    IsDedicator,
}

impl TrackedField {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackedField::Address => "address",
            TrackedField::IsDedicator => "is_dedicator",
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    New,
    Changed {
        active: DimensionRecord,
        fields: Vec<TrackedField>,
    },
    Unchanged {
        active: DimensionRecord,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationKind {
    New,
    Changed,
    Unchanged,
}

impl Classification {
    pub fn kind(&self) -> ClassificationKind {
        match self {
            Classification::New => ClassificationKind::New,
            Classification::Changed { .. } => ClassificationKind::Changed,
            Classification::Unchanged { .. } => ClassificationKind::Unchanged,
        }
    }
}

/// Tracked attributes that differ between the snapshot and `active`.
pub fn changed_fields(snapshot: &SnapshotRecord, active: &DimensionRecord) -> Vec<TrackedField> {
    let current = snapshot.tracked();
    let stored = active.tracked();
    let mut fields = Vec::new();
    if current.address != stored.address {
        fields.push(TrackedField::Address);
    }
    if current.is_dedicator != stored.is_dedicator {
        fields.push(TrackedField::IsDedicator);
    }
    fields
}

pub fn classify(snapshot: &SnapshotRecord, active: Option<DimensionRecord>) -> Classification {
    match active {
        None => Classification::New,
        Some(active) => {
            let fields = changed_fields(snapshot, &active);
            if fields.is_empty() {
                Classification::Unchanged { active }
            } else {
                Classification::Changed { active, fields }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, Classification, ClassificationKind, TrackedField};
    use crate::{
        DimensionRecord, ExperienceLevel, NaturalKey, SnapshotRecord, SurrogateKey, ValidTime,
        SENTINEL_END,
    };

    fn active_for(snapshot: &SnapshotRecord) -> DimensionRecord {
        DimensionRecord {
            user_sk: SurrogateKey(7),
            user_id: snapshot.user_id,
            first_name: snapshot.first_name.clone(),
            last_name: snapshot.last_name.clone(),
            address: snapshot.address.clone(),
            experience_level: snapshot.experience_level,
            is_dedicator: snapshot.is_dedicator,
            scd_start: ValidTime::from_unix_seconds(1_600_000_000),
            scd_end: SENTINEL_END,
            scd_version: 1,
            scd_active: true,
        }
    }

    fn snapshot() -> SnapshotRecord {
        SnapshotRecord::from_activity(
            NaturalKey::new(),
            "Jack",
            "Rackham",
            "12 Oak St Port Royal Jamaica",
            2,
            Some(ValidTime::from_unix_seconds(1_600_000_000)),
            0,
        )
    }

    #[test]
    fn missing_active_record_is_new() {
        assert_eq!(classify(&snapshot(), None), Classification::New);
    }

    #[test]
    fn matching_tracked_attributes_are_unchanged() {
        let snapshot = snapshot();
        let active = active_for(&snapshot);
        assert_eq!(
            classify(&snapshot, Some(active)).kind(),
            ClassificationKind::Unchanged
        );
    }

    #[test]
    fn address_change_is_detected() {
        let snapshot = snapshot();
        let mut active = active_for(&snapshot);
        active.address = "99 Pine Ave Tortuga Haiti".to_string();
        match classify(&snapshot, Some(active)) {
            Classification::Changed { fields, .. } => {
                assert_eq!(fields, vec![TrackedField::Address]);
            }
            other => panic!("expected change, got {other:?}"),
        }
    }

    #[test]
    fn dedicator_flip_is_detected() {
        let snapshot = snapshot();
        let mut active = active_for(&snapshot);
        active.is_dedicator = true;
        active.address = "elsewhere".to_string();
        match classify(&snapshot, Some(active)) {
            Classification::Changed { fields, .. } => {
                assert_eq!(fields, vec![TrackedField::Address, TrackedField::IsDedicator]);
            }
            other => panic!("expected change, got {other:?}"),
        }
    }

    #[test]
    fn informational_attributes_never_trigger_a_version() {
        let snapshot = snapshot();
        let mut active = active_for(&snapshot);
        active.experience_level = ExperienceLevel::Pirate;
        let mut busier = snapshot.clone();
        busier.found_logs = 40;
        busier.experience_level = ExperienceLevel::Pirate;
        assert_eq!(
            classify(&busier, Some(active)).kind(),
            ClassificationKind::Unchanged
        );
    }
}

//! Read-only consistency scan of the historized table. Violations are
//! reported, never repaired.

use sea_orm::ConnectionTrait;

use catchem_dim_core::{
    DimResult, DimensionRecord, IntegrityIssue, IntegrityReport, IntegrityViolation,
};

use crate::lookup::scan_history;

pub async fn verify_history<C>(conn: &C) -> DimResult<IntegrityReport>
where
    C: ConnectionTrait,
{
    let records = scan_history(conn).await?;
    Ok(check_history(&records))
}

/// `records` must be ordered by user and then version.
pub fn check_history(records: &[DimensionRecord]) -> IntegrityReport {
    let mut report = IntegrityReport {
        versions_checked: records.len() as u64,
        ..IntegrityReport::default()
    };
    for versions in records.chunk_by(|a, b| a.user_id == b.user_id) {
        report.users_checked += 1;
        check_user(versions, &mut report.violations);
    }
    report
}

fn check_user(versions: &[DimensionRecord], violations: &mut Vec<IntegrityViolation>) {
    let Some(first) = versions.first() else {
        return;
    };
    let user_id = first.user_id;
    let mut push = |issue| violations.push(IntegrityViolation { user_id, issue });

    let active = versions.iter().filter(|record| record.scd_active).count() as u64;
    match active {
        0 => push(IntegrityIssue::NoActiveVersion),
        1 => {}
        count => push(IntegrityIssue::MultipleActiveVersions { count }),
    }

    let mut expected = 1;
    for record in versions {
        if record.scd_version != expected {
            push(IntegrityIssue::VersionGap {
                expected,
                found: record.scd_version,
            });
        }
        expected = record.scd_version + 1;
        if record.scd_active && !record.is_open() {
            push(IntegrityIssue::ActiveVersionClosed {
                version: record.scd_version,
                scd_end: record.scd_end,
            });
        }
        if !record.scd_active && record.is_open() {
            push(IntegrityIssue::InactiveVersionOpen {
                version: record.scd_version,
            });
        }
    }

    for pair in versions.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        if next.scd_start <= previous.scd_start {
            push(IntegrityIssue::NonIncreasingStart {
                version: next.scd_version,
            });
        }
        if !previous.scd_active && previous.scd_end != next.scd_start {
            push(IntegrityIssue::CoverageGap {
                version: previous.scd_version,
                scd_end: previous.scd_end,
                next_start: next.scd_start,
            });
        }
    }
}

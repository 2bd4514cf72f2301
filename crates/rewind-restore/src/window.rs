//! Recovery window calculator
//!
//! A backup with archived binary logs can be restored to any instant in
//! `[completedAt, latestRestorableTime]`. Without archived logs the only
//! valid target is the backup's own completion instant.

use chrono::{DateTime, Utc};
use serde::Serialize;

use rewind_common::time::{format_timestamp, timestamp};
use rewind_common::Error;

use crate::catalog::BackupRecord;

/// Inclusive interval of valid recovery instants for one backup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RecoveryWindow {
    /// Earliest valid instant (the backup's completion time)
    #[serde(with = "timestamp")]
    pub earliest: DateTime<Utc>,
    /// Latest valid instant (the last archived log)
    #[serde(with = "timestamp")]
    pub latest: DateTime<Utc>,
}

impl RecoveryWindow {
    /// Build a window, `None` if `earliest > latest`
    pub fn new(earliest: DateTime<Utc>, latest: DateTime<Utc>) -> Option<Self> {
        (earliest <= latest).then_some(Self { earliest, latest })
    }

    /// A zero-width window admitting a single instant
    pub fn point(at: DateTime<Utc>) -> Self {
        Self {
            earliest: at,
            latest: at,
        }
    }

    /// Whether only one instant is valid
    pub fn is_point(&self) -> bool {
        self.earliest == self.latest
    }

    /// Whether `instant` lies in the window, bounds included
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.earliest <= instant && instant <= self.latest
    }

    /// Reject an instant outside the window with an OutOfRange error
    pub fn validate(&self, instant: DateTime<Utc>) -> Result<(), Error> {
        if self.contains(instant) {
            Ok(())
        } else {
            Err(Error::out_of_range(instant, self.earliest, self.latest))
        }
    }
}

impl std::fmt::Display for RecoveryWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}]",
            format_timestamp(&self.earliest),
            format_timestamp(&self.latest)
        )
    }
}

/// Point-in-time window of a backup.
///
/// Absent when archiving is disabled, either bound is unset, or the operator
/// reports a latest restorable time before the backup completed.
pub fn window_for(record: &BackupRecord) -> Option<RecoveryWindow> {
    if !record.archiving_enabled {
        return None;
    }
    RecoveryWindow::new(record.completed_at?, record.latest_restorable_time?)
}

/// The window a restore from this backup must land in.
///
/// Falls back to the zero-width window at the completion instant when no
/// point-in-time window exists. A backup without a completion time cannot be
/// restored at all.
pub fn restorable_window(record: &BackupRecord) -> Result<RecoveryWindow, Error> {
    if let Some(window) = window_for(record) {
        return Ok(window);
    }
    record
        .completed_at
        .map(RecoveryWindow::point)
        .ok_or_else(|| {
            Error::validation(format!("backup {} has no completion time", record.name))
        })
}

/// Validate a requested instant against a backup, returning the window used
pub fn validate_instant(
    record: &BackupRecord,
    instant: DateTime<Utc>,
) -> Result<RecoveryWindow, Error> {
    let window = restorable_window(record)?;
    window.validate(instant)?;
    Ok(window)
}

//! Restore state tracker
//!
//! Remembers which backup the standby controller last restored successfully,
//! so a restarted controller does not restore the same backup again. The
//! record lives in a ConfigMap in the target environment and is overwritten
//! with server-side apply on every success. There is no version check: the
//! last writer wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, warn};

use rewind_common::retry::{retry_with_backoff, RetryConfig};
use rewind_common::time::{format_timestamp, parse_timestamp};
use rewind_common::{Error, FIELD_MANAGER_CONTROLLER};

use crate::catalog::BackupRecord;
use crate::client::KubeClient;

/// ConfigMap key holding the completion time of the last restored backup
pub const KEY_LAST_COMPLETED_BACKUP_TIME: &str = "lastCompletedBackupTime";
/// ConfigMap key holding the destination of the last restored backup
pub const KEY_LAST_BACKUP_DESTINATION: &str = "lastBackupDestination";

/// Identity of the most recently restored backup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackingRecord {
    /// Completion time of the restored backup
    pub last_completed_backup_time: DateTime<Utc>,
    /// Storage location of the restored backup
    pub last_backup_destination: String,
}

impl TrackingRecord {
    /// Identity of a backup, `None` if it never finished uploading.
    ///
    /// The completion time is kept at whole seconds, the precision it is stored with.
    pub fn for_backup(record: &BackupRecord) -> Option<Self> {
        Some(Self {
            last_completed_backup_time: record.completed_at?.trunc_subsecs(0),
            last_backup_destination: record.destination.clone()?,
        })
    }

    /// Whether this record identifies the given backup, to the second
    pub fn matches(&self, record: &BackupRecord) -> bool {
        record.completed_at.map(|t| t.trunc_subsecs(0))
            == Some(self.last_completed_backup_time.trunc_subsecs(0))
            && record.destination.as_deref() == Some(self.last_backup_destination.as_str())
    }

    fn to_data(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                KEY_LAST_COMPLETED_BACKUP_TIME.to_string(),
                format_timestamp(&self.last_completed_backup_time),
            ),
            (
                KEY_LAST_BACKUP_DESTINATION.to_string(),
                self.last_backup_destination.clone(),
            ),
        ])
    }

    fn from_data(data: &BTreeMap<String, String>) -> Option<Self> {
        let time = data.get(KEY_LAST_COMPLETED_BACKUP_TIME)?;
        let destination = data.get(KEY_LAST_BACKUP_DESTINATION)?;
        let last_completed_backup_time = match parse_timestamp(time) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(value = %time, error = %e, "ignoring unreadable tracking timestamp");
                return None;
            }
        };
        Some(Self {
            last_completed_backup_time,
            last_backup_destination: destination.clone(),
        })
    }
}

/// Tracking record store for one standby target
pub struct RestoreStateTracker {
    client: Arc<dyn KubeClient>,
    namespace: String,
    config_map: String,
    retry: RetryConfig,
}

impl RestoreStateTracker {
    /// Tracker for the standby cluster `cluster` in `namespace`
    pub fn new(client: Arc<dyn KubeClient>, namespace: &str, cluster: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            config_map: config_map_name(cluster),
            retry: RetryConfig::default(),
        }
    }

    /// Name of the ConfigMap holding the record
    pub fn config_map_name(&self) -> &str {
        &self.config_map
    }

    /// Load the record; absent if never saved or unreadable
    pub async fn load(&self) -> Result<Option<TrackingRecord>, Error> {
        let data = self
            .client
            .get_config_map_data(&self.namespace, &self.config_map)
            .await?;
        let record = data.as_ref().and_then(TrackingRecord::from_data);
        debug!(
            namespace = %self.namespace,
            config_map = %self.config_map,
            found = record.is_some(),
            "loaded tracking record"
        );
        Ok(record)
    }

    /// Overwrite the record
    pub async fn save(&self, record: &TrackingRecord) -> Result<(), Error> {
        let data = record.to_data();
        retry_with_backoff(&self.retry, "save_tracking_record", || {
            let client = self.client.clone();
            let namespace = self.namespace.clone();
            let name = self.config_map.clone();
            let data = data.clone();
            async move {
                client
                    .apply_config_map_data(&namespace, &name, FIELD_MANAGER_CONTROLLER, data)
                    .await
            }
        })
        .await?;
        info!(
            namespace = %self.namespace,
            completed = %format_timestamp(&record.last_completed_backup_time),
            destination = %record.last_backup_destination,
            "tracking record updated"
        );
        Ok(())
    }
}

/// ConfigMap name for a standby cluster's tracking record
pub fn config_map_name(cluster: &str) -> String {
    format!("rewind-standby-{}", cluster)
}

//! Backup catalog reader
//!
//! Lists the backups of a source environment. An unreachable environment or
//! one without backups yields an empty list: "no backups yet" is a normal
//! condition for both the standby controller and the interactive workflow.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use rewind_common::pxc::{BackupState, PerconaXtraDBClusterBackup};
use rewind_common::time::option_timestamp;
use rewind_common::Error;

use crate::client::KubeClient;

/// A backup as seen by the restore core
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    /// Backup object name
    pub name: String,
    /// Cluster the backup was taken from
    pub cluster: String,
    /// Lifecycle state
    pub state: BackupState,
    /// When the backup finished
    #[serde(with = "option_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Storage location of the backup data
    pub destination: Option<String>,
    /// Storage profile the backup was written to
    pub storage_name: Option<String>,
    /// Whether the owning cluster archives binary logs
    pub archiving_enabled: bool,
    /// Latest instant covered by archived logs
    #[serde(with = "option_timestamp")]
    pub latest_restorable_time: Option<DateTime<Utc>>,
}

impl BackupRecord {
    /// Build a record from the operator's object
    pub fn from_backup(backup: &PerconaXtraDBClusterBackup, archiving_enabled: bool) -> Self {
        let status = backup.status.clone().unwrap_or_default();
        Self {
            name: backup.metadata.name.clone(),
            cluster: backup.spec.pxc_cluster.clone(),
            state: backup.state(),
            completed_at: status.completed,
            destination: status.destination.filter(|d| !d.is_empty()),
            storage_name: backup.storage_name().map(str::to_string),
            archiving_enabled,
            latest_restorable_time: status.latest_restorable_time,
        }
    }

    /// Whether the upload finished and the data location is known
    pub fn has_destination(&self) -> bool {
        self.destination.is_some()
    }

    /// Whether this backup can be restored from
    pub fn is_eligible(&self) -> bool {
        self.state == BackupState::Succeeded
    }
}

/// Order records newest first; records without a completion time sort last
pub fn sort_newest_first(records: &mut [BackupRecord]) {
    records.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
}

/// Reads backup records from the orchestration API
pub struct BackupCatalog {
    client: Arc<dyn KubeClient>,
}

impl BackupCatalog {
    /// Create a catalog reader over the given client
    pub fn new(client: Arc<dyn KubeClient>) -> Self {
        Self { client }
    }

    /// Every backup in the environment, whatever its state, newest first
    pub async fn list_all(&self, namespace: &str) -> Vec<BackupRecord> {
        let backups = match self.client.list_backups(namespace).await {
            Ok(backups) => backups,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "failed to list backups, treating as empty");
                return Vec::new();
            }
        };
        if backups.is_empty() {
            debug!(namespace = %namespace, "no backup objects found");
            return Vec::new();
        }

        let archiving = self.archiving_by_cluster(namespace).await;
        let mut records: Vec<BackupRecord> = backups
            .iter()
            .map(|b| {
                let enabled = archiving
                    .get(&b.spec.pxc_cluster)
                    .copied()
                    .unwrap_or(false);
                BackupRecord::from_backup(b, enabled)
            })
            .collect();
        sort_newest_first(&mut records);
        records
    }

    /// Backups in a terminal success state, newest first
    pub async fn list(&self, namespace: &str) -> Vec<BackupRecord> {
        let records: Vec<BackupRecord> = self
            .list_all(namespace)
            .await
            .into_iter()
            .filter(BackupRecord::is_eligible)
            .collect();
        debug!(namespace = %namespace, count = records.len(), "listed eligible backups");
        records
    }

    /// The newest eligible backup, optionally limited to one cluster
    pub async fn newest(&self, namespace: &str, cluster: Option<&str>) -> Option<BackupRecord> {
        self.list(namespace)
            .await
            .into_iter()
            .find(|r| cluster.map_or(true, |c| r.cluster == c))
    }

    /// Look up one eligible backup by name
    pub async fn get(&self, namespace: &str, name: &str) -> Result<BackupRecord, Error> {
        let record = self
            .list_all(namespace)
            .await
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::not_found("backup", name, namespace))?;

        if !record.is_eligible() {
            return Err(Error::validation(format!(
                "backup {} is {}, only Succeeded backups can be restored",
                name, record.state
            )));
        }
        Ok(record)
    }

    async fn archiving_by_cluster(&self, namespace: &str) -> HashMap<String, bool> {
        match self.client.list_clusters(namespace).await {
            Ok(clusters) => clusters
                .iter()
                .map(|c| (c.name(), c.pitr_enabled()))
                .collect(),
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "failed to read clusters, assuming archiving disabled");
                HashMap::new()
            }
        }
    }
}

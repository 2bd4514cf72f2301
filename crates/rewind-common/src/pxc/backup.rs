//! PerconaXtraDBClusterBackup model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};

/// Backup object produced by the operator's backup subsystem
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerconaXtraDBClusterBackup {
    /// API version
    #[serde(default = "PerconaXtraDBClusterBackup::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "PerconaXtraDBClusterBackup::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Backup specification
    #[serde(default)]
    pub spec: BackupSpec,
    /// Backup status, written by the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BackupStatus>,
}

impl HasApiResource for PerconaXtraDBClusterBackup {
    const API_VERSION: &'static str = super::PXC_API_VERSION;
    const KIND: &'static str = "PerconaXtraDBClusterBackup";
}

impl PerconaXtraDBClusterBackup {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Lifecycle state derived from `status.state`
    pub fn state(&self) -> BackupState {
        self.status
            .as_ref()
            .and_then(|s| s.state.as_deref())
            .map(BackupState::parse)
            .unwrap_or(BackupState::Pending)
    }

    /// Storage the backup was written to; status wins over the requested spec
    pub fn storage_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.storage_name.as_deref())
            .or(self.spec.storage_name.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Backup spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    /// Cluster the backup was taken from
    #[serde(default)]
    pub pxc_cluster: String,
    /// Storage the backup was requested on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,
}

/// Backup status
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    /// Raw lifecycle state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// When the backup finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    /// Storage location of the backup data (e.g. `s3://bucket/prefix`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Storage the backup was written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,
    /// Latest instant covered by archived binary logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_restorable_time: Option<DateTime<Utc>>,
}

/// Backup lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupState {
    /// Not started yet (or unrecognized)
    Pending,
    /// Upload in progress
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
}

impl BackupState {
    /// Map the operator's state string onto the lifecycle
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Succeeded" => Self::Succeeded,
            "Failed" | "Error" => Self::Failed,
            "Running" | "Starting" => Self::Running,
            _ => Self::Pending,
        }
    }

    /// Whether no further transition will occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for BackupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

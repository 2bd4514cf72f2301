//! PerconaXtraDBClusterRestore model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kube_utils::{HasApiResource, ObjectMeta};

/// Restore job executed by the operator
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerconaXtraDBClusterRestore {
    /// API version
    #[serde(default = "PerconaXtraDBClusterRestore::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "PerconaXtraDBClusterRestore::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Restore specification
    pub spec: RestoreSpec,
    /// Restore status, written by the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RestoreStatus>,
}

impl HasApiResource for PerconaXtraDBClusterRestore {
    const API_VERSION: &'static str = super::PXC_API_VERSION;
    const KIND: &'static str = "PerconaXtraDBClusterRestore";
}

impl PerconaXtraDBClusterRestore {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Create a new restore with no status
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: RestoreSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta::new(name, namespace),
            spec,
            status: None,
        }
    }

    /// Lifecycle state derived from `status.state`
    pub fn state(&self) -> RestoreState {
        RestoreState::parse(
            self.status
                .as_ref()
                .and_then(|s| s.state.as_deref())
                .unwrap_or_default(),
        )
    }
}

/// Restore spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    /// Cluster to restore into
    pub pxc_cluster: String,
    /// Backup object in the same namespace (unused for cross-environment restores)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_name: Option<String>,
    /// Backup referenced by storage location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_source: Option<BackupSource>,
    /// Point-in-time target; absent means "restore the backup as taken"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitr: Option<PitrSpec>,
}

/// Location of backup data
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSource {
    /// Storage location identifier (e.g. `s3://bucket/prefix`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Storage profile on the target cluster holding the data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,
}

/// Point-in-time recovery target
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PitrSpec {
    /// Target type; rewind always uses `date`
    #[serde(rename = "type")]
    pub target_type: String,
    /// Recovery instant, UTC `YYYY-MM-DD HH:MM:SS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Where the archived logs live
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_source: Option<BackupSource>,
}

/// Restore status
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStatus {
    /// Raw lifecycle state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Operator-provided detail, usually set on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// When the restore finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
}

/// Restore job lifecycle state
///
/// Succeeded, Failed and Error are terminal. Any state string the operator
/// reports that is not recognized is kept as `Unknown` and treated as still
/// in progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestoreState {
    /// Created, not yet picked up
    Starting,
    /// Executor is working
    Running,
    /// Completed successfully
    Succeeded,
    /// Completed unsuccessfully
    Failed,
    /// Executor reported an error
    Error,
    /// Unrecognized state string
    Unknown(String),
}

impl RestoreState {
    /// Map the operator's state string onto the lifecycle
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" | "Starting" => Self::Starting,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Whether no further transition will occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Error)
    }

    /// Whether the job still occupies its target (counts toward in-flight)
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for RestoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Error => write!(f, "Error"),
            Self::Unknown(raw) => write!(f, "Unknown({})", raw),
        }
    }
}

//! Typed models for the database operator's custom resources
//!
//! These resources belong to the external operator; rewind reads backups and
//! clusters and creates restores, always through `DynamicObject` with the
//! `ApiResource` from [`HasApiResource`](crate::kube_utils::HasApiResource).

mod backup;
mod cluster;
mod restore;

pub use backup::{BackupSpec, BackupState, BackupStatus, PerconaXtraDBClusterBackup};
pub use cluster::{ClusterDefinition, StorageCredential, CLONED_FROM_ANNOTATION};
pub use restore::{
    BackupSource, PerconaXtraDBClusterRestore, PitrSpec, RestoreSpec, RestoreState, RestoreStatus,
};

/// API version shared by all operator resources
pub const PXC_API_VERSION: &str = "pxc.percona.com/v1";

/// Maximum length of a cluster name accepted by the operator
pub const MAX_CLUSTER_NAME_LEN: usize = 22;

/// Convert a `DynamicObject` into one of the typed models
pub fn from_dynamic<T>(obj: kube::api::DynamicObject) -> Result<T, crate::Error>
where
    T: serde::de::DeserializeOwned + crate::kube_utils::HasApiResource,
{
    let value = serde_json::to_value(obj)
        .map_err(|e| crate::Error::serialization_for_kind(T::KIND, e.to_string()))?;
    serde_json::from_value(value)
        .map_err(|e| crate::Error::serialization_for_kind(T::KIND, e.to_string()))
}

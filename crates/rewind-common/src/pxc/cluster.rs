//! PerconaXtraDBCluster definition
//!
//! The cluster spec is large and owned by the operator, so it is kept as an
//! opaque `DynamicObject`. Only the handful of paths rewind needs are read.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::Value;

use crate::kube_utils::{strip_export_metadata, HasApiResource};

/// Annotation recording the `<namespace>/<name>` a cluster was cloned from
pub const CLONED_FROM_ANNOTATION: &str = "rewind.dev/cloned-from";

/// Operator state string for a cluster serving traffic
const READY_STATE: &str = "ready";

/// A cluster definition as stored in the orchestration API
#[derive(Clone, Debug)]
pub struct ClusterDefinition {
    /// The full object, including spec and status
    pub object: DynamicObject,
}

/// A backup-storage credential referenced by a cluster spec
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageCredential {
    /// Storage profile name (key under `spec.backup.storages`)
    pub storage_name: String,
    /// Secret holding the storage credentials
    pub secret_name: String,
}

impl HasApiResource for ClusterDefinition {
    const API_VERSION: &'static str = super::PXC_API_VERSION;
    const KIND: &'static str = "PerconaXtraDBCluster";
}

impl From<DynamicObject> for ClusterDefinition {
    fn from(object: DynamicObject) -> Self {
        Self { object }
    }
}

impl ClusterDefinition {
    /// Cluster name
    pub fn name(&self) -> String {
        self.object.name_any()
    }

    /// Cluster namespace
    pub fn namespace(&self) -> Option<String> {
        self.object.namespace()
    }

    fn spec(&self) -> Option<&Value> {
        self.object.data.get("spec")
    }

    /// Root-credential secret name (`spec.secretsName`, default `<name>-secrets`)
    pub fn secrets_name(&self) -> String {
        self.spec()
            .and_then(|s| s.get("secretsName"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-secrets", self.name()))
    }

    /// Every credential secret referenced under `spec.backup.storages`
    pub fn storage_credentials(&self) -> Vec<StorageCredential> {
        let Some(storages) = self
            .spec()
            .and_then(|s| s.pointer("/backup/storages"))
            .and_then(Value::as_object)
        else {
            return Vec::new();
        };

        let mut creds = Vec::new();
        for (storage_name, storage) in storages {
            for backend in ["s3", "azure"] {
                if let Some(secret) = storage
                    .get(backend)
                    .and_then(|b| b.get("credentialsSecret"))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                {
                    creds.push(StorageCredential {
                        storage_name: storage_name.clone(),
                        secret_name: secret.to_string(),
                    });
                }
            }
        }
        creds
    }

    /// Whether continuous binary-log archiving is enabled
    pub fn pitr_enabled(&self) -> bool {
        self.spec()
            .and_then(|s| s.pointer("/backup/pitr/enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Operator-reported state (`status.state`)
    pub fn state(&self) -> Option<&str> {
        self.object
            .data
            .get("status")
            .and_then(|s| s.get("state"))
            .and_then(Value::as_str)
    }

    /// Whether the operator reports the cluster ready
    pub fn is_ready(&self) -> bool {
        self.state() == Some(READY_STATE)
    }

    /// Build an independent copy of this definition for another environment.
    ///
    /// Identity metadata and status are dropped, name and namespace are
    /// rewritten, and backup schedules and log archiving are switched off so
    /// the copy never writes into the source's backup storage. Storage
    /// profiles are kept so a restore can read from them.
    ///
    /// The root-credential secret is pinned to the source's resolved name so
    /// the copy keeps using the copied credentials instead of defaulting to
    /// `<name>-secrets`.
    pub fn clone_for(&self, namespace: &str, name: &str) -> ClusterDefinition {
        let mut object = self.object.clone();
        let secrets_name = self.secrets_name();
        let origin = format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name()
        );

        strip_export_metadata(&mut object.metadata);
        object.metadata.name = Some(name.to_string());
        object.metadata.namespace = Some(namespace.to_string());
        object
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(CLONED_FROM_ANNOTATION.to_string(), origin);

        if let Some(data) = object.data.as_object_mut() {
            data.remove("status");
            let spec = data
                .entry("spec")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Some(spec) = spec.as_object_mut() {
                spec.insert("secretsName".to_string(), Value::String(secrets_name));
            }
        }
        if let Some(backup) = object
            .data
            .pointer_mut("/spec/backup")
            .and_then(Value::as_object_mut)
        {
            backup.remove("schedule");
            if let Some(pitr) = backup.get_mut("pitr").and_then(Value::as_object_mut) {
                pitr.insert("enabled".to_string(), Value::Bool(false));
            }
        }

        ClusterDefinition { object }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cluster() -> ClusterDefinition {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "pxc.percona.com/v1",
            "kind": "PerconaXtraDBCluster",
            "metadata": {
                "name": "cluster1",
                "namespace": "prod",
                "uid": "0d7f",
                "resourceVersion": "4412",
                "generation": 7,
                "creationTimestamp": "2024-01-01T00:00:00Z",
                "labels": { "team": "payments" }
            },
            "spec": {
                "secretsName": "cluster1-secrets",
                "pxc": { "size": 3 },
                "backup": {
                    "storages": {
                        "s3-us-west": {
                            "type": "s3",
                            "s3": { "bucket": "backups", "credentialsSecret": "aws-s3-secret" }
                        },
                        "azure-blob": {
                            "type": "azure",
                            "azure": { "container": "bk", "credentialsSecret": "azure-secret" }
                        },
                        "fs-pvc": { "type": "filesystem" }
                    },
                    "pitr": { "enabled": true, "storageName": "s3-us-west" },
                    "schedule": [ { "name": "daily", "schedule": "0 0 * * *", "storageName": "s3-us-west" } ]
                }
            },
            "status": { "state": "ready", "pxc": { "ready": 3 } }
        }))
        .unwrap();
        ClusterDefinition::from(obj)
    }

    #[test]
    fn test_reads_credential_references() {
        let cluster = sample_cluster();
        assert_eq!(cluster.name(), "cluster1");
        assert_eq!(cluster.secrets_name(), "cluster1-secrets");

        let creds = cluster.storage_credentials();
        assert_eq!(creds.len(), 2);
        assert!(creds.contains(&StorageCredential {
            storage_name: "s3-us-west".to_string(),
            secret_name: "aws-s3-secret".to_string(),
        }));
        assert!(creds.contains(&StorageCredential {
            storage_name: "azure-blob".to_string(),
            secret_name: "azure-secret".to_string(),
        }));
    }

    #[test]
    fn test_default_secrets_name() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "pxc.percona.com/v1",
            "kind": "PerconaXtraDBCluster",
            "metadata": { "name": "db", "namespace": "prod" },
            "spec": {}
        }))
        .unwrap();
        let cluster = ClusterDefinition::from(obj);
        assert_eq!(cluster.secrets_name(), "db-secrets");
        assert!(cluster.storage_credentials().is_empty());
        assert!(!cluster.pitr_enabled());
        assert!(!cluster.is_ready());
    }

    #[test]
    fn test_status_accessors() {
        let cluster = sample_cluster();
        assert!(cluster.pitr_enabled());
        assert_eq!(cluster.state(), Some("ready"));
        assert!(cluster.is_ready());
    }

    #[test]
    fn test_clone_for_rewrites_identity() {
        let clone = sample_cluster().clone_for("staging", "cluster1-restored");
        let meta = &clone.object.metadata;

        assert_eq!(meta.name.as_deref(), Some("cluster1-restored"));
        assert_eq!(meta.namespace.as_deref(), Some("staging"));
        assert!(meta.uid.is_none());
        assert!(meta.resource_version.is_none());
        assert!(meta.generation.is_none());
        assert!(meta.creation_timestamp.is_none());
        assert_eq!(
            meta.annotations
                .as_ref()
                .and_then(|a| a.get(CLONED_FROM_ANNOTATION))
                .map(String::as_str),
            Some("prod/cluster1")
        );
        // Labels are part of the declarative definition and survive
        assert_eq!(
            meta.labels.as_ref().and_then(|l| l.get("team")).map(String::as_str),
            Some("payments")
        );
    }

    #[test]
    fn test_clone_for_drops_status_and_background_backups() {
        let clone = sample_cluster().clone_for("staging", "cluster1-restored");

        assert!(clone.object.data.get("status").is_none());
        assert!(clone.state().is_none());
        assert!(clone.object.data.pointer("/spec/backup/schedule").is_none());
        assert!(!clone.pitr_enabled());
        // Storage profiles and configuration are preserved
        assert_eq!(clone.storage_credentials().len(), 2);
        assert_eq!(clone.secrets_name(), "cluster1-secrets");
        assert_eq!(clone.object.data.pointer("/spec/pxc/size"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_clone_for_pins_default_secrets_name() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "pxc.percona.com/v1",
            "kind": "PerconaXtraDBCluster",
            "metadata": { "name": "db", "namespace": "prod" },
            "spec": { "pxc": { "size": 1 } }
        }))
        .unwrap();
        let source = ClusterDefinition::from(obj);

        let clone = source.clone_for("staging", "db-pitr");

        // The clone must resolve the secret the cloner copies, not db-pitr-secrets
        assert_eq!(clone.secrets_name(), source.secrets_name());
        assert_eq!(
            clone.object.data.pointer("/spec/secretsName"),
            Some(&serde_json::json!("db-secrets"))
        );
    }
}

//! Environment cloner
//!
//! Copies a source cluster's definition and the credentials it references
//! into a target environment. The clone gets topology and configuration, not
//! data: the operator provisions an empty cluster which a restore job then
//! fills.
//!
//! Credentials must exist before the cluster is created: the operator
//! generates fresh root credentials for a cluster whose secret is missing.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use serde::Serialize;
use tracing::{debug, info, warn};

use rewind_common::kube_utils::strip_export_metadata;
use rewind_common::pxc::ClusterDefinition;
use rewind_common::{Error, ANNOTATION_SOURCE_NAMESPACE};

use crate::client::KubeClient;

/// What to clone and where
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloneRequest {
    /// Environment holding the source cluster
    pub source_namespace: String,
    /// Source cluster name
    pub source_cluster: String,
    /// Environment to create the clone in
    pub target_namespace: String,
    /// Name of the new cluster
    pub target_cluster: String,
    /// Storage profile the restore will read from; its credential is essential
    pub restore_storage: Option<String>,
}

/// A credential referenced by the source cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPlan {
    /// Secret name, identical in source and target
    pub secret: String,
    /// Whether the restore cannot proceed without it
    pub essential: bool,
    /// What the secret is for
    pub purpose: String,
    /// Present in the source environment
    pub in_source: bool,
    /// Already present in the target environment (left untouched)
    pub in_target: bool,
}

impl CredentialPlan {
    /// Whether a clone would copy this secret
    pub fn will_copy(&self) -> bool {
        self.in_source && !self.in_target
    }

    /// Whether this secret is essential and cannot be provided
    pub fn is_blocking(&self) -> bool {
        self.essential && !self.in_source && !self.in_target
    }
}

/// Read-only preview of a clone
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClonePlan {
    /// Environment holding the source cluster
    pub source_namespace: String,
    /// Source cluster name
    pub source_cluster: String,
    /// Target environment
    pub target_namespace: String,
    /// Name of the new cluster
    pub target_cluster: String,
    /// A cluster with the target name already exists in the target environment
    pub collision: bool,
    /// Referenced credentials and what would happen to each
    pub credentials: Vec<CredentialPlan>,
}

impl ClonePlan {
    /// Essential credentials that neither environment holds
    pub fn missing_essential(&self) -> Vec<&CredentialPlan> {
        self.credentials.iter().filter(|c| c.is_blocking()).collect()
    }
}

/// Result of a completed clone
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentClone {
    /// Target environment
    pub namespace: String,
    /// Name of the created cluster
    pub cluster_name: String,
    /// Secrets copied into the target
    pub copied_secrets: Vec<String>,
    /// Secrets that already existed in the target
    pub existing_secrets: Vec<String>,
    /// Non-essential problems that did not stop the clone
    pub warnings: Vec<String>,
}

/// A secret the source cluster depends on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRef {
    /// Secret name
    pub secret: String,
    /// Whether the restore cannot proceed without it
    pub essential: bool,
    /// What the secret is for
    pub purpose: String,
}

/// Every credential a cluster references, deduplicated by secret name.
///
/// The root-credential secret is always essential. A storage credential is
/// essential only for the storage profile the restore reads from.
pub fn credential_refs(
    cluster: &ClusterDefinition,
    restore_storage: Option<&str>,
) -> Vec<CredentialRef> {
    let mut refs = vec![CredentialRef {
        secret: cluster.secrets_name(),
        essential: true,
        purpose: "root credentials".to_string(),
    }];

    for cred in cluster.storage_credentials() {
        let essential = restore_storage == Some(cred.storage_name.as_str());
        match refs.iter_mut().find(|r| r.secret == cred.secret_name) {
            Some(existing) => existing.essential |= essential,
            None => refs.push(CredentialRef {
                secret: cred.secret_name,
                essential,
                purpose: format!("storage {}", cred.storage_name),
            }),
        }
    }
    refs
}

/// Copy of a secret for another namespace, data preserved byte for byte
pub fn secret_for_namespace(source: &Secret, source_namespace: &str, namespace: &str) -> Secret {
    let mut metadata = source.metadata.clone();
    strip_export_metadata(&mut metadata);
    metadata.namespace = Some(namespace.to_string());
    metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(
            ANNOTATION_SOURCE_NAMESPACE.to_string(),
            source_namespace.to_string(),
        );

    Secret {
        metadata,
        type_: source.type_.clone(),
        data: source.data.clone(),
        string_data: source.string_data.clone(),
        immutable: source.immutable,
    }
}

/// Clones cluster definitions and credentials across environments
pub struct EnvironmentCloner {
    client: Arc<dyn KubeClient>,
}

impl EnvironmentCloner {
    /// Create a cloner over the given client
    pub fn new(client: Arc<dyn KubeClient>) -> Self {
        Self { client }
    }

    async fn source_cluster(&self, req: &CloneRequest) -> Result<ClusterDefinition, Error> {
        self.client
            .get_cluster(&req.source_namespace, &req.source_cluster)
            .await?
            .ok_or_else(|| {
                Error::not_found("cluster", &req.source_cluster, &req.source_namespace)
            })
    }

    /// Inspect both environments without changing anything
    pub async fn plan(&self, req: &CloneRequest) -> Result<ClonePlan, Error> {
        let source = self.source_cluster(req).await?;
        let collision = self
            .client
            .get_cluster(&req.target_namespace, &req.target_cluster)
            .await?
            .is_some();

        let mut credentials = Vec::new();
        for r in credential_refs(&source, req.restore_storage.as_deref()) {
            let in_source = self
                .client
                .get_secret(&req.source_namespace, &r.secret)
                .await?
                .is_some();
            let in_target = self
                .client
                .get_secret(&req.target_namespace, &r.secret)
                .await?
                .is_some();
            credentials.push(CredentialPlan {
                secret: r.secret,
                essential: r.essential,
                purpose: r.purpose,
                in_source,
                in_target,
            });
        }

        Ok(ClonePlan {
            source_namespace: req.source_namespace.clone(),
            source_cluster: req.source_cluster.clone(),
            target_namespace: req.target_namespace.clone(),
            target_cluster: req.target_cluster.clone(),
            collision,
            credentials,
        })
    }

    /// Copy credentials, then create the cluster in the target environment.
    ///
    /// A missing or uncopyable essential credential aborts before the cluster
    /// is created. Non-essential credential problems are recorded as warnings.
    pub async fn clone_environment(&self, req: &CloneRequest) -> Result<EnvironmentClone, Error> {
        let source = self.source_cluster(req).await?;

        if self
            .client
            .get_cluster(&req.target_namespace, &req.target_cluster)
            .await?
            .is_some()
        {
            return Err(Error::conflict(format!(
                "cluster {} already exists in {}",
                req.target_cluster, req.target_namespace
            )));
        }

        let mut result = EnvironmentClone {
            namespace: req.target_namespace.clone(),
            cluster_name: req.target_cluster.clone(),
            ..Default::default()
        };

        for r in credential_refs(&source, req.restore_storage.as_deref()) {
            match self.copy_secret(req, &r.secret).await {
                Ok(true) => result.copied_secrets.push(r.secret),
                Ok(false) => result.existing_secrets.push(r.secret),
                Err(e) if r.essential => {
                    return Err(Error::external(format!(
                        "copying {} secret {}: {}",
                        r.purpose, r.secret, e
                    )));
                }
                Err(e) => {
                    warn!(
                        secret = %r.secret,
                        purpose = %r.purpose,
                        error = %e,
                        "failed to copy non-essential credential, continuing"
                    );
                    result
                        .warnings
                        .push(format!("{} secret {} not copied: {}", r.purpose, r.secret, e));
                }
            }
        }

        let clone = source.clone_for(&req.target_namespace, &req.target_cluster);
        self.client.create_cluster(&clone).await?;
        info!(
            source = %format!("{}/{}", req.source_namespace, req.source_cluster),
            target = %format!("{}/{}", req.target_namespace, req.target_cluster),
            copied = result.copied_secrets.len(),
            warnings = result.warnings.len(),
            "cluster definition cloned"
        );
        Ok(result)
    }

    /// Copy one secret; `Ok(false)` if the target already has it
    async fn copy_secret(&self, req: &CloneRequest, name: &str) -> Result<bool, Error> {
        if self
            .client
            .get_secret(&req.target_namespace, name)
            .await?
            .is_some()
        {
            debug!(secret = %name, target = %req.target_namespace, "secret already exists in target namespace");
            return Ok(false);
        }

        let source = self
            .client
            .get_secret(&req.source_namespace, name)
            .await?
            .ok_or_else(|| Error::not_found("secret", name, &req.source_namespace))?;

        let copy = secret_for_namespace(&source, &req.source_namespace, &req.target_namespace);
        match self.client.create_secret(&req.target_namespace, &copy).await {
            Ok(()) => {
                info!(
                    secret = %name,
                    source = %req.source_namespace,
                    target = %req.target_namespace,
                    "copied secret to target namespace"
                );
                Ok(true)
            }
            // Created concurrently; the existing secret is left untouched
            Err(Error::Conflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

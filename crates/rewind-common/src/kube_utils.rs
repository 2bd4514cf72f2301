//! Kubernetes helpers shared by the restore core, the HTTP surface and the CLI

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::trace;

use crate::Error;

// =============================================================================
// ObjectMeta - metadata for resources this tool creates
// =============================================================================

/// Kubernetes metadata for resources built by rewind.
///
/// Carries only what we set on creation; server-populated fields (uid,
/// resourceVersion, timestamps) are ignored on deserialization. Management
/// labels are added on construction.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    #[serde(default)]
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create new metadata with the standard management labels
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert(crate::LABEL_NAME.to_string(), name.clone());
        labels.insert(
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_REWIND.to_string(),
        );
        Self {
            name,
            namespace: namespace.into(),
            labels,
            annotations: BTreeMap::new(),
        }
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for types that have a known API group, version, and kind.
///
/// The database operator's resources are not ours, so they are modelled as
/// plain serde structs and accessed through `DynamicObject` using the
/// `ApiResource` derived from these constants.
///
/// # Example
/// ```ignore
/// impl HasApiResource for PerconaXtraDBClusterRestore {
///     const API_VERSION: &'static str = "pxc.percona.com/v1";
///     const KIND: &'static str = "PerconaXtraDBClusterRestore";
/// }
///
/// let ar = PerconaXtraDBClusterRestore::api_resource();
/// ```
pub trait HasApiResource {
    /// Full API version (e.g., "pxc.percona.com/v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "PerconaXtraDBClusterBackup")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an `ApiResource` from an apiVersion and kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into `(group, version)`; core resources have an empty group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind using the API server's simple rules
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

// =============================================================================
// Metadata stripping
// =============================================================================

/// Annotation written by `kubectl apply`; meaningless on a cloned object
const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Strip identity and lifecycle metadata so a resource can be recreated elsewhere.
///
/// Removes fields the API server would reject or that tie the object to its
/// original location: uid, resourceVersion, creationTimestamp, generation,
/// managedFields, ownerReferences, finalizers, deletion markers, and the
/// kubectl last-applied annotation.
pub fn strip_export_metadata(
    meta: &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
) {
    meta.uid = None;
    meta.resource_version = None;
    meta.creation_timestamp = None;
    meta.deletion_timestamp = None;
    meta.deletion_grace_period_seconds = None;
    meta.managed_fields = None;
    meta.generation = None;
    meta.owner_references = None;
    meta.finalizers = None;
    meta.self_link = None;
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.remove(LAST_APPLIED_ANNOTATION);
        if annotations.is_empty() {
            meta.annotations = None;
        }
    }
}

// =============================================================================
// Polling
// =============================================================================

/// Poll until a condition is met or timeout is reached.
///
/// `check_fn` returns `Ok(true)` when the condition holds and `Ok(false)` to
/// keep polling. Check errors are treated as "not yet" since the API may be
/// briefly unavailable while a cluster restarts. Uses tokio's clock so paused
/// time in tests advances the deadline.
pub async fn poll_until<F, Fut>(
    timeout: Duration,
    poll_interval: Duration,
    timeout_msg: impl Into<String>,
    mut check_fn: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let timeout_msg = timeout_msg.into();

    loop {
        match check_fn().await {
            Ok(true) => return Ok(()),
            Ok(false) => trace!("Polling condition not yet met, retrying..."),
            Err(e) => trace!(error = %e, "Polling check returned error (retrying)"),
        }

        if tokio::time::Instant::now() + poll_interval > deadline {
            return Err(Error::timeout(timeout_msg));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

// =============================================================================
// Client construction and namespaces
// =============================================================================

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an optional kubeconfig path and context.
///
/// With neither set, the standard resolution applies (in-cluster config,
/// then `KUBECONFIG` / `~/.kube/config`).
pub async fn create_client(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Client, Error> {
    let options = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };

    let mut config = match kubeconfig {
        Some(path) => {
            let kc = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kc, &options)
                .await
                .map_err(|e| Error::internal_with_context("create_client", e.to_string()))?
        }
        None if context.is_some() => Config::from_kubeconfig(&options)
            .await
            .map_err(|e| Error::internal_with_context("create_client", e.to_string()))?,
        None => Config::infer()
            .await
            .map_err(|e| Error::internal_with_context("create_client", e.to_string()))?,
    };

    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

    Client::try_from(config).map_err(Error::from)
}

/// Ensure a namespace exists (idempotent).
///
/// Uses server-side apply so it never fails on "already exists".
pub async fn ensure_namespace(
    client: &Client,
    name: &str,
    field_manager: &str,
) -> Result<(), kube::Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "labels": { crate::LABEL_MANAGED_BY: crate::LABEL_MANAGED_BY_REWIND }
        }
    });
    api.patch(name, &PatchParams::apply(field_manager), &Patch::Apply(&ns))
        .await?;
    Ok(())
}

/// Validate a name as an RFC 1035 DNS label no longer than `max_len`.
pub fn validate_dns_label(name: &str, max_len: usize) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::validation("name must not be empty"));
    }
    if name.len() > max_len {
        return Err(Error::validation(format!(
            "name '{}' is {} characters, maximum is {}",
            name,
            name.len(),
            max_len
        )));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let starts_alpha = name.starts_with(|c: char| c.is_ascii_lowercase());
    let ends_alnum = name.ends_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !valid_chars || !starts_alpha || !ends_alnum {
        return Err(Error::validation(format!(
            "name '{}' must consist of lowercase letters, digits and '-', \
             start with a letter and end with a letter or digit",
            name
        )));
    }
    Ok(())
}

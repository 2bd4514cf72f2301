//! Kubernetes access for the restore core
//!
//! Every read and write against the orchestration API goes through
//! [`KubeClient`] so components can be tested against a mock.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Secret};
use kube::api::{Api, AttachParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use rewind_common::kube_utils::{ensure_namespace, HasApiResource};
use rewind_common::pxc::{
    from_dynamic, ClusterDefinition, PerconaXtraDBClusterBackup, PerconaXtraDBClusterRestore,
};
use rewind_common::{Error, FIELD_MANAGER_WORKFLOW};

/// Trait abstracting the orchestration API operations used by rewind
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// List every backup object in a namespace, whatever its state
    async fn list_backups(&self, namespace: &str)
        -> Result<Vec<PerconaXtraDBClusterBackup>, Error>;

    /// Get a cluster definition, `None` if it does not exist
    async fn get_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterDefinition>, Error>;

    /// List cluster definitions in a namespace
    async fn list_clusters(&self, namespace: &str) -> Result<Vec<ClusterDefinition>, Error>;

    /// Create a cluster definition; an existing cluster of the same name is a Conflict
    async fn create_cluster(&self, cluster: &ClusterDefinition) -> Result<(), Error>;

    /// Get a secret, `None` if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Create a secret in a namespace; an existing secret of the same name is a Conflict
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<(), Error>;

    /// Whether a namespace exists
    async fn namespace_exists(&self, name: &str) -> Result<bool, Error>;

    /// Create a namespace (idempotent)
    async fn create_namespace(&self, name: &str) -> Result<(), Error>;

    /// Create a restore job
    async fn create_restore(&self, restore: &PerconaXtraDBClusterRestore) -> Result<(), Error>;

    /// Get a restore job, `None` if it does not exist
    async fn get_restore(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PerconaXtraDBClusterRestore>, Error>;

    /// List restore jobs in a namespace
    async fn list_restores(
        &self,
        namespace: &str,
    ) -> Result<Vec<PerconaXtraDBClusterRestore>, Error>;

    /// Read the data of a ConfigMap, `None` if it does not exist
    async fn get_config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, Error>;

    /// Overwrite the data of a ConfigMap with server-side apply
    async fn apply_config_map_data(
        &self,
        namespace: &str,
        name: &str,
        field_manager: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), Error>;

    /// Run a command in a pod container and return its stdout
    async fn exec_in_pod(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<String, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api<T: HasApiResource>(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &T::api_resource())
    }
}

/// Map a create failure, turning "already exists" into a Conflict
fn create_error(kind: &str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => {
            Error::conflict(format!("{} {} already exists", kind, name))
        }
        e => e.into(),
    }
}

/// Deserialize a list of dynamic objects, skipping ones the model cannot read
fn typed_items<T>(items: Vec<DynamicObject>) -> Vec<T>
where
    T: serde::de::DeserializeOwned + HasApiResource,
{
    items
        .into_iter()
        .filter_map(|obj| {
            let name = obj.metadata.name.clone().unwrap_or_default();
            match from_dynamic::<T>(obj) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(kind = T::KIND, name = %name, error = %e, "skipping unreadable object");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn list_backups(
        &self,
        namespace: &str,
    ) -> Result<Vec<PerconaXtraDBClusterBackup>, Error> {
        let list = self
            .dynamic_api::<PerconaXtraDBClusterBackup>(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(typed_items(list.items))
    }

    async fn get_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClusterDefinition>, Error> {
        let api = self.dynamic_api::<ClusterDefinition>(namespace);
        match api.get(name).await {
            Ok(obj) => Ok(Some(ClusterDefinition::from(obj))),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<ClusterDefinition>, Error> {
        let list = self
            .dynamic_api::<ClusterDefinition>(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items.into_iter().map(ClusterDefinition::from).collect())
    }

    async fn create_cluster(&self, cluster: &ClusterDefinition) -> Result<(), Error> {
        let namespace = cluster.namespace().unwrap_or_default();
        let name = cluster.name();
        self.dynamic_api::<ClusterDefinition>(&namespace)
            .create(&PostParams::default(), &cluster.object)
            .await
            .map_err(|e| create_error("cluster", &name, e))?;
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let name = secret.metadata.name.clone().unwrap_or_default();
        api.create(&PostParams::default(), secret)
            .await
            .map_err(|e| create_error("secret", &name, e))?;
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?.is_some())
    }

    async fn create_namespace(&self, name: &str) -> Result<(), Error> {
        ensure_namespace(&self.client, name, FIELD_MANAGER_WORKFLOW).await?;
        Ok(())
    }

    async fn create_restore(&self, restore: &PerconaXtraDBClusterRestore) -> Result<(), Error> {
        let value = serde_json::to_value(restore).map_err(|e| {
            Error::serialization_for_kind(PerconaXtraDBClusterRestore::KIND, e.to_string())
        })?;
        let obj: DynamicObject = serde_json::from_value(value).map_err(|e| {
            Error::serialization_for_kind(PerconaXtraDBClusterRestore::KIND, e.to_string())
        })?;
        self.dynamic_api::<PerconaXtraDBClusterRestore>(&restore.metadata.namespace)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| create_error("restore", &restore.metadata.name, e))?;
        Ok(())
    }

    async fn get_restore(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PerconaXtraDBClusterRestore>, Error> {
        let api = self.dynamic_api::<PerconaXtraDBClusterRestore>(namespace);
        match api.get(name).await {
            Ok(obj) => Ok(Some(from_dynamic(obj)?)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_restores(
        &self,
        namespace: &str,
    ) -> Result<Vec<PerconaXtraDBClusterRestore>, Error> {
        let list = self
            .dynamic_api::<PerconaXtraDBClusterRestore>(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(typed_items(list.items))
    }

    async fn get_config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(cm) => Ok(Some(cm.data.unwrap_or_default())),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_config_map_data(
        &self,
        namespace: &str,
        name: &str,
        field_manager: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let cm = serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "labels": {
                    rewind_common::LABEL_MANAGED_BY: rewind_common::LABEL_MANAGED_BY_REWIND
                }
            },
            "data": data,
        });
        api.patch(
            name,
            &PatchParams::apply(field_manager).force(),
            &Patch::Apply(&cm),
        )
        .await?;
        Ok(())
    }

    async fn exec_in_pod(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<String, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut attached = api.exec(pod, command, &params).await?;

        let mut stdout = attached
            .stdout()
            .ok_or_else(|| Error::internal_with_context("exec_in_pod", "no stdout stream"))?;
        let mut stderr = attached
            .stderr()
            .ok_or_else(|| Error::internal_with_context("exec_in_pod", "no stderr stream"))?;

        // Drain both streams together so a full stderr pipe cannot stall stdout
        let mut out = String::new();
        let mut err = String::new();
        let (out_res, err_res) =
            tokio::join!(stdout.read_to_string(&mut out), stderr.read_to_string(&mut err));
        out_res.map_err(|e| Error::external(format!("reading exec stdout: {}", e)))?;
        err_res.map_err(|e| Error::external(format!("reading exec stderr: {}", e)))?;

        let status = match attached.take_status() {
            Some(status_future) => status_future.await,
            None => None,
        };

        if let Some(status) = status {
            debug!(pod = %pod, ?status, "exec completed with status");
            if status.status.as_deref() == Some("Failure") {
                let detail = if err.trim().is_empty() {
                    status.message.unwrap_or_default()
                } else {
                    err.trim().to_string()
                };
                return Err(Error::external(format!(
                    "command in {}/{} failed: {}",
                    namespace, pod, detail
                )));
            }
        }

        Ok(out)
    }
}

//! Fixtures shared by the component tests

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta as K8sObjectMeta;
use k8s_openapi::ByteString;
use kube::api::DynamicObject;

use rewind_common::kube_utils::ObjectMeta;
use rewind_common::pxc::{
    BackupSpec, BackupStatus, ClusterDefinition, PerconaXtraDBClusterBackup,
    PerconaXtraDBClusterRestore, RestoreSpec, RestoreStatus,
};

/// `T0` of the test timeline: 2024-03-01 00:00:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// `T0` plus a number of hours
pub fn ts(hours: i64) -> DateTime<Utc> {
    t0() + Duration::hours(hours)
}

/// A backup of `cluster1` in `prod` on storage `s3-us-west`
pub fn backup(
    name: &str,
    state: &str,
    completed: Option<DateTime<Utc>>,
    latest_restorable: Option<DateTime<Utc>>,
) -> PerconaXtraDBClusterBackup {
    PerconaXtraDBClusterBackup {
        api_version: "pxc.percona.com/v1".to_string(),
        kind: "PerconaXtraDBClusterBackup".to_string(),
        metadata: ObjectMeta::new(name, "prod"),
        spec: BackupSpec {
            pxc_cluster: "cluster1".to_string(),
            storage_name: Some("s3-us-west".to_string()),
        },
        status: Some(BackupStatus {
            state: Some(state.to_string()),
            completed,
            destination: completed.map(|_| format!("s3://backups/{}", name)),
            storage_name: Some("s3-us-west".to_string()),
            latest_restorable_time: latest_restorable,
        }),
    }
}

/// A ready cluster with one S3 and one Azure storage profile
pub fn cluster(namespace: &str, name: &str, pitr_enabled: bool) -> ClusterDefinition {
    let obj: DynamicObject = serde_json::from_value(serde_json::json!({
        "apiVersion": "pxc.percona.com/v1",
        "kind": "PerconaXtraDBCluster",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": "4f1c",
            "resourceVersion": "1200"
        },
        "spec": {
            "secretsName": format!("{}-secrets", name),
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
                    }
                },
                "pitr": { "enabled": pitr_enabled, "storageName": "s3-us-west" }
            }
        },
        "status": { "state": "ready" }
    }))
    .unwrap();
    ClusterDefinition::from(obj)
}

/// A cluster whose operator state is `state`
pub fn cluster_in_state(namespace: &str, name: &str, state: &str) -> ClusterDefinition {
    let mut c = cluster(namespace, name, true);
    c.object.data["status"] = serde_json::json!({ "state": state });
    c
}

/// A restore job in the given raw state
pub fn restore(namespace: &str, name: &str, state: &str) -> PerconaXtraDBClusterRestore {
    let mut r = PerconaXtraDBClusterRestore::new(
        name,
        namespace,
        RestoreSpec {
            pxc_cluster: "standby1".to_string(),
            ..Default::default()
        },
    );
    r.status = Some(RestoreStatus {
        state: Some(state.to_string()),
        ..Default::default()
    });
    r
}

/// An Opaque secret with a single `root` key
pub fn secret(namespace: &str, name: &str) -> Secret {
    Secret {
        metadata: K8sObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some("9a0e".to_string()),
            resource_version: Some("77".to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([(
            "root".to_string(),
            ByteString(b"s3cr3t".to_vec()),
        )])),
        ..Default::default()
    }
}

//! Interactive restore workflow
//!
//! Restores a source environment's database to an operator-chosen instant in
//! a newly cloned cluster:
//!
//! 1. resolve the source cluster
//! 2. check the target environment exists (optionally create it)
//! 3. pick a backup and validate the instant against its recovery window
//! 4. clone the cluster definition and credentials into the target
//! 5. submit the restore job and wait for it
//! 6. wait for the cluster to report ready and summarize its databases
//!
//! [`RestoreWorkflow::plan`] performs every read and check of steps 1-4 and
//! reports what would change without changing anything (dry run).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rewind_common::kube_utils::{poll_until, validate_dns_label};
use rewind_common::pxc::{ClusterDefinition, MAX_CLUSTER_NAME_LEN};
use rewind_common::retry::{retry_with_backoff, RetryConfig};
use rewind_common::time::{format_timestamp, option_timestamp, timestamp};
use rewind_common::Error;

use crate::catalog::{BackupCatalog, BackupRecord};
use crate::client::KubeClient;
use crate::cloner::{ClonePlan, CloneRequest, EnvironmentClone, EnvironmentCloner};
use crate::job::{JobStatus, RestoreJobManager, DEFAULT_POLL_INTERVAL, DEFAULT_RESTORE_TIMEOUT};
use crate::summary::{parse_summary, query_pod, summary_command, DatabaseSummary, DB_CONTAINER};
use crate::window::{restorable_window, window_for, RecoveryWindow};

/// Default bound on waiting for a restored cluster to become ready
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Caller's choices for one restore
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Environment holding the cluster and its backups
    pub source_namespace: String,
    /// Source cluster; the only cluster in the environment when unset
    pub source_cluster: Option<String>,
    /// Environment to restore into; the source environment when unset
    pub target_namespace: Option<String>,
    /// Name of the new cluster; derived from the source and instant when unset
    pub target_cluster: Option<String>,
    /// Backup to restore; the newest one covering the instant when unset
    pub backup_name: Option<String>,
    /// Instant to restore to; the latest restorable instant when unset
    pub recovery_instant: Option<DateTime<Utc>>,
    /// Create the target environment if it does not exist
    pub create_namespace: bool,
}

impl RestoreOptions {
    /// Target environment after defaulting
    pub fn target_namespace(&self) -> &str {
        self.target_namespace
            .as_deref()
            .unwrap_or(&self.source_namespace)
    }
}

/// A condition that stops a restore before anything is changed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Blocker {
    /// Recovery instant outside the backup's window
    OutOfRange {
        /// Requested instant
        #[serde(with = "timestamp")]
        requested: DateTime<Utc>,
        /// Window start
        #[serde(with = "timestamp")]
        earliest: DateTime<Utc>,
        /// Window end
        #[serde(with = "timestamp")]
        latest: DateTime<Utc>,
    },
    /// A cluster with the target name already exists
    NameCollision {
        /// Target environment
        namespace: String,
        /// Colliding cluster name
        cluster: String,
    },
    /// Target environment missing and creation not requested
    MissingNamespace {
        /// Target environment
        namespace: String,
    },
    /// Essential credential present in neither environment
    MissingCredential {
        /// Secret name
        secret: String,
        /// What the secret is for
        purpose: String,
    },
}

impl Blocker {
    /// The error reported when a restore is attempted despite this blocker
    pub fn to_error(&self) -> Error {
        match self {
            Blocker::OutOfRange {
                requested,
                earliest,
                latest,
            } => Error::out_of_range(*requested, *earliest, *latest),
            Blocker::NameCollision { namespace, cluster } => Error::conflict(format!(
                "cluster {} already exists in {}",
                cluster, namespace
            )),
            Blocker::MissingNamespace { namespace } => Error::not_found_global("namespace", namespace),
            Blocker::MissingCredential { secret, purpose } => Error::external(format!(
                "{} secret {} is missing in the source environment",
                purpose, secret
            )),
        }
    }
}

impl std::fmt::Display for Blocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_error())
    }
}

/// One check performed while planning
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Check {
    /// What was checked
    pub name: String,
    /// Whether it passed
    pub passed: bool,
    /// Outcome detail
    pub detail: String,
}

impl Check {
    fn new(name: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

/// One change a restore would make
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    /// Kind of object created
    pub kind: String,
    /// Object name
    pub name: String,
    /// Namespace the object is created in
    pub namespace: String,
    /// Extra detail
    pub detail: String,
}

impl PlannedAction {
    fn new(kind: &str, name: &str, namespace: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            detail: detail.into(),
        }
    }
}

/// Everything a restore would do, computed without side effects
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorePlan {
    /// Source environment
    pub source_namespace: String,
    /// Source cluster
    pub source_cluster: String,
    /// Target environment
    pub target_namespace: String,
    /// New cluster name
    pub target_cluster: String,
    /// Backup restored from
    pub backup: BackupRecord,
    /// Window the instant must lie in
    pub window: RecoveryWindow,
    /// Whether the backup supports arbitrary instants
    pub point_in_time_available: bool,
    /// Instant restored to
    #[serde(with = "timestamp")]
    pub recovery_instant: DateTime<Utc>,
    /// Storage profile the restore reads from
    pub storage_name: String,
    /// Whether the target environment exists
    pub namespace_exists: bool,
    /// Whether the target environment will be created
    pub create_namespace: bool,
    /// Clone preview
    pub clone: ClonePlan,
    /// Checks performed
    pub checks: Vec<Check>,
    /// Conditions stopping the restore
    pub blockers: Vec<Blocker>,
    /// Changes the restore would make
    pub actions: Vec<PlannedAction>,
}

impl RestorePlan {
    /// Whether any blocking check failed
    pub fn is_blocked(&self) -> bool {
        !self.blockers.is_empty()
    }

    /// Error for the first blocking check, if any
    pub fn first_error(&self) -> Option<Error> {
        self.blockers.first().map(Blocker::to_error)
    }

    fn clone_request(&self) -> CloneRequest {
        CloneRequest {
            source_namespace: self.source_namespace.clone(),
            source_cluster: self.source_cluster.clone(),
            target_namespace: self.target_namespace.clone(),
            target_cluster: self.target_cluster.clone(),
            restore_storage: Some(self.storage_name.clone()),
        }
    }
}

/// Result of starting a restore
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSubmission {
    /// Restore job name
    pub restore_job_id: String,
    /// New cluster name
    pub target_cluster_name: String,
    /// Target environment
    pub target_namespace: String,
    /// Backup restored from
    pub backup_name: String,
    /// Instant restored to
    #[serde(with = "timestamp")]
    pub recovery_instant: DateTime<Utc>,
    /// What the clone copied
    pub clone: EnvironmentClone,
}

/// Result of a complete restore
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    /// The submitted restore
    pub submission: RestoreSubmission,
    /// Databases found on the restored cluster
    pub summary: DatabaseSummary,
}

/// Target environment state
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceCheck {
    /// Environment checked
    pub namespace: String,
    /// Whether it exists
    pub exists: bool,
    /// Clusters already in it
    pub clusters: Vec<String>,
    /// Whether the queried cluster name is taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collision: Option<bool>,
}

/// A cluster's readiness
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Environment
    pub namespace: String,
    /// Cluster name
    pub cluster: String,
    /// Operator-reported state
    pub state: Option<String>,
    /// Whether it serves traffic
    pub ready: bool,
}

/// A backup with its recovery window, for listings
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupListing {
    /// The backup
    #[serde(flatten)]
    pub record: BackupRecord,
    /// Earliest restorable instant
    #[serde(with = "option_timestamp")]
    pub window_start: Option<DateTime<Utc>>,
    /// Latest restorable instant
    #[serde(with = "option_timestamp")]
    pub window_end: Option<DateTime<Utc>>,
    /// Whether arbitrary instants can be restored
    pub point_in_time_available: bool,
}

impl From<BackupRecord> for BackupListing {
    fn from(record: BackupRecord) -> Self {
        let pitr = window_for(&record);
        let window = if record.is_eligible() {
            restorable_window(&record).ok()
        } else {
            None
        };
        Self {
            window_start: window.map(|w| w.earliest),
            window_end: window.map(|w| w.latest),
            point_in_time_available: pitr.is_some(),
            record,
        }
    }
}

/// Default name for a restored cluster: `<source>-<YYYYMMDDHHMM>`, shortened to fit
pub fn default_cluster_name(source: &str, instant: &DateTime<Utc>) -> String {
    let suffix = instant.format("%Y%m%d%H%M").to_string();
    let max_prefix = MAX_CLUSTER_NAME_LEN - suffix.len() - 1;
    let prefix: String = source.chars().take(max_prefix).collect();
    format!("{}-{}", prefix.trim_end_matches('-'), suffix)
}

/// Attended single-shot restore
pub struct RestoreWorkflow {
    client: Arc<dyn KubeClient>,
    catalog: BackupCatalog,
    cloner: EnvironmentCloner,
    jobs: RestoreJobManager,
    restore_timeout: Duration,
    ready_timeout: Duration,
    poll_interval: Duration,
    exec_retry: RetryConfig,
}

impl RestoreWorkflow {
    /// Create a workflow over the given client
    pub fn new(client: Arc<dyn KubeClient>) -> Self {
        Self {
            catalog: BackupCatalog::new(client.clone()),
            cloner: EnvironmentCloner::new(client.clone()),
            jobs: RestoreJobManager::new(client.clone()),
            client,
            restore_timeout: DEFAULT_RESTORE_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            exec_retry: RetryConfig::default(),
        }
    }

    /// Bound the wait for the restore job
    pub fn with_restore_timeout(mut self, timeout: Duration) -> Self {
        self.restore_timeout = timeout;
        self
    }

    /// Bound the wait for cluster readiness
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Interval for restore and readiness polls
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.jobs = self.jobs.with_poll_interval(interval);
        self
    }

    /// Find the source cluster: the named one, or the only one in the environment
    pub async fn resolve_source_cluster(
        &self,
        namespace: &str,
        name: Option<&str>,
    ) -> Result<ClusterDefinition, Error> {
        if let Some(name) = name {
            return self
                .client
                .get_cluster(namespace, name)
                .await?
                .ok_or_else(|| Error::not_found("cluster", name, namespace));
        }

        let mut clusters = self.client.list_clusters(namespace).await?;
        match clusters.len() {
            0 => Err(Error::not_found("cluster", "any", namespace)),
            1 => Ok(clusters.remove(0)),
            _ => Err(Error::validation(format!(
                "{} has several clusters ({}), choose one",
                namespace,
                clusters
                    .iter()
                    .map(ClusterDefinition::name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Whether an environment exists, and whether `cluster` is already taken in it
    pub async fn check_namespace(
        &self,
        namespace: &str,
        cluster: Option<&str>,
    ) -> Result<NamespaceCheck, Error> {
        let exists = self.client.namespace_exists(namespace).await?;
        let clusters: Vec<String> = if exists {
            self.client
                .list_clusters(namespace)
                .await?
                .iter()
                .map(ClusterDefinition::name)
                .collect()
        } else {
            Vec::new()
        };
        let collision = cluster.map(|c| clusters.iter().any(|existing| existing == c));
        Ok(NamespaceCheck {
            namespace: namespace.to_string(),
            exists,
            clusters,
            collision,
        })
    }

    /// Create an environment (idempotent)
    pub async fn create_namespace(&self, namespace: &str) -> Result<(), Error> {
        validate_dns_label(namespace, 63)?;
        self.client.create_namespace(namespace).await?;
        info!(namespace = %namespace, "namespace created");
        Ok(())
    }

    /// Every backup in an environment with its recovery window, newest first
    pub async fn list_backups(&self, namespace: &str) -> Vec<BackupListing> {
        self.catalog
            .list_all(namespace)
            .await
            .into_iter()
            .map(BackupListing::from)
            .collect()
    }

    /// Perform every read and check of a restore without changing anything
    pub async fn plan(&self, opts: &RestoreOptions) -> Result<RestorePlan, Error> {
        let target_namespace = opts.target_namespace().to_string();
        let mut checks = Vec::new();
        let mut blockers = Vec::new();

        let named = match opts.backup_name.as_deref() {
            Some(name) => Some(self.catalog.get(&opts.source_namespace, name).await?),
            None => None,
        };
        let source_hint = opts
            .source_cluster
            .as_deref()
            .or_else(|| named.as_ref().map(|b| b.cluster.as_str()));
        let source = self
            .resolve_source_cluster(&opts.source_namespace, source_hint)
            .await?;
        let source_cluster = source.name();
        checks.push(Check::new(
            "source cluster",
            true,
            format!("{}/{}", opts.source_namespace, source_cluster),
        ));

        let backup = match named {
            Some(b) if b.cluster != source_cluster => {
                return Err(Error::validation(format!(
                    "backup {} belongs to cluster {}, not {}",
                    b.name, b.cluster, source_cluster
                )));
            }
            Some(b) => b,
            None => {
                self.choose_backup(&opts.source_namespace, &source_cluster, opts.recovery_instant)
                    .await?
            }
        };
        let window = restorable_window(&backup)?;
        let point_in_time_available = window_for(&backup).is_some();
        checks.push(Check::new(
            "backup",
            true,
            format!(
                "{} ({})",
                backup.name,
                if point_in_time_available {
                    "point-in-time available"
                } else {
                    "point-in-time unavailable"
                }
            ),
        ));

        let instant = opts.recovery_instant.unwrap_or(window.latest);
        let in_window = window.contains(instant);
        checks.push(Check::new(
            "recovery window",
            in_window,
            format!("{} in {}", format_timestamp(&instant), window),
        ));
        if !in_window {
            blockers.push(Blocker::OutOfRange {
                requested: instant,
                earliest: window.earliest,
                latest: window.latest,
            });
        }

        let storage_name = backup
            .storage_name
            .clone()
            .ok_or_else(|| Error::validation(format!("backup {} does not name its storage", backup.name)))?;
        if !backup.has_destination() {
            return Err(Error::validation(format!(
                "backup {} has no storage destination",
                backup.name
            )));
        }

        let target_cluster = match &opts.target_cluster {
            Some(name) => name.clone(),
            None => default_cluster_name(&source_cluster, &instant),
        };
        validate_dns_label(&target_cluster, MAX_CLUSTER_NAME_LEN)?;

        let namespace_exists = self.client.namespace_exists(&target_namespace).await?;
        let create_namespace = !namespace_exists && opts.create_namespace;
        checks.push(Check::new(
            "target namespace",
            namespace_exists || opts.create_namespace,
            match (namespace_exists, opts.create_namespace) {
                (true, _) => format!("{} exists", target_namespace),
                (false, true) => format!("{} will be created", target_namespace),
                (false, false) => format!("{} does not exist", target_namespace),
            },
        ));
        if !namespace_exists && !opts.create_namespace {
            blockers.push(Blocker::MissingNamespace {
                namespace: target_namespace.clone(),
            });
        }

        let clone = self
            .cloner
            .plan(&CloneRequest {
                source_namespace: opts.source_namespace.clone(),
                source_cluster: source_cluster.clone(),
                target_namespace: target_namespace.clone(),
                target_cluster: target_cluster.clone(),
                restore_storage: Some(storage_name.clone()),
            })
            .await?;

        checks.push(Check::new(
            "cluster name",
            !clone.collision,
            if clone.collision {
                format!("{} already exists in {}", target_cluster, target_namespace)
            } else {
                format!("{} is available", target_cluster)
            },
        ));
        if clone.collision {
            blockers.push(Blocker::NameCollision {
                namespace: target_namespace.clone(),
                cluster: target_cluster.clone(),
            });
        }

        for cred in &clone.credentials {
            let detail = match (cred.in_source, cred.in_target) {
                (_, true) => "already present in target".to_string(),
                (true, false) => "will be copied".to_string(),
                (false, false) if cred.essential => "missing in source".to_string(),
                (false, false) => "missing in source, restore continues without it".to_string(),
            };
            checks.push(Check::new(
                format!("credential {} ({})", cred.secret, cred.purpose),
                !cred.is_blocking(),
                detail,
            ));
            if cred.is_blocking() {
                blockers.push(Blocker::MissingCredential {
                    secret: cred.secret.clone(),
                    purpose: cred.purpose.clone(),
                });
            }
        }

        let mut actions = Vec::new();
        if create_namespace {
            actions.push(PlannedAction::new("Namespace", &target_namespace, "", "create"));
        }
        for cred in clone.credentials.iter().filter(|c| c.will_copy()) {
            actions.push(PlannedAction::new(
                "Secret",
                &cred.secret,
                &target_namespace,
                format!("copy from {}", opts.source_namespace),
            ));
        }
        actions.push(PlannedAction::new(
            "PerconaXtraDBCluster",
            &target_cluster,
            &target_namespace,
            format!("clone of {}/{}", opts.source_namespace, source_cluster),
        ));
        actions.push(PlannedAction::new(
            "PerconaXtraDBClusterRestore",
            &format!("restore-{}-<timestamp>-<nonce>", target_cluster),
            &target_namespace,
            format!(
                "restore {} to {} from storage {}",
                backup.name,
                format_timestamp(&instant),
                storage_name
            ),
        ));

        Ok(RestorePlan {
            source_namespace: opts.source_namespace.clone(),
            source_cluster,
            target_namespace,
            target_cluster,
            backup,
            window,
            point_in_time_available,
            recovery_instant: instant,
            storage_name,
            namespace_exists,
            create_namespace,
            clone,
            checks,
            blockers,
            actions,
        })
    }

    /// Plan, then clone and submit the restore job. Returns once submitted.
    pub async fn execute(&self, opts: &RestoreOptions) -> Result<RestoreSubmission, Error> {
        let plan = self.plan(opts).await?;
        if let Some(err) = plan.first_error() {
            return Err(err);
        }

        if plan.create_namespace {
            self.create_namespace(&plan.target_namespace).await?;
        }

        let clone = self.cloner.clone_environment(&plan.clone_request()).await?;
        for warning in &clone.warnings {
            warn!(warning = %warning, "clone completed with warning");
        }

        let job = self
            .jobs
            .submit(
                &plan.target_namespace,
                &plan.target_cluster,
                &plan.backup,
                plan.recovery_instant,
                &plan.storage_name,
            )
            .await?;

        Ok(RestoreSubmission {
            restore_job_id: job,
            target_cluster_name: plan.target_cluster,
            target_namespace: plan.target_namespace,
            backup_name: plan.backup.name,
            recovery_instant: plan.recovery_instant,
            clone,
        })
    }

    /// Wait for a restore job; failure, timeout and cancellation are errors
    pub async fn await_restore(
        &self,
        namespace: &str,
        job: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        self.jobs
            .await_terminal(namespace, job, self.restore_timeout, cancel)
            .await?
            .into_result(job)
    }

    /// Wait until the operator reports the cluster ready
    pub async fn wait_until_ready(
        &self,
        namespace: &str,
        cluster: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let client = self.client.clone();
        let wait = poll_until(
            self.ready_timeout,
            self.poll_interval,
            format!("cluster {}/{} did not become ready", namespace, cluster),
            || {
                let client = client.clone();
                let namespace = namespace.to_string();
                let cluster = cluster.to_string();
                async move {
                    Ok(client
                        .get_cluster(&namespace, &cluster)
                        .await?
                        .is_some_and(|c| c.is_ready()))
                }
            },
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::internal_with_context(
                "wait_until_ready",
                format!("wait for cluster {}/{} was cancelled", namespace, cluster),
            )),
            result = wait => result,
        }
    }

    /// Count databases and tables on a ready cluster
    pub async fn summary(&self, namespace: &str, cluster: &str) -> Result<DatabaseSummary, Error> {
        let definition = self
            .client
            .get_cluster(namespace, cluster)
            .await?
            .ok_or_else(|| Error::not_found("cluster", cluster, namespace))?;
        if !definition.is_ready() {
            return Err(Error::conflict(format!(
                "cluster {}/{} is not ready (state {})",
                namespace,
                cluster,
                definition.state().unwrap_or("unknown")
            )));
        }

        let pod = query_pod(cluster);
        let output = retry_with_backoff(&self.exec_retry, "database_summary", || {
            let client = self.client.clone();
            let namespace = namespace.to_string();
            let pod = pod.clone();
            let command = summary_command();
            async move {
                client
                    .exec_in_pod(&namespace, &pod, DB_CONTAINER, command)
                    .await
            }
        })
        .await?;

        let summary = parse_summary(cluster, &output)?;
        info!(
            namespace = %namespace,
            cluster = %cluster,
            databases = summary.total_databases,
            tables = summary.total_tables,
            "database summary collected"
        );
        Ok(summary)
    }

    /// Full attended restore: submit, wait, wait for readiness, summarize
    pub async fn run(
        &self,
        opts: &RestoreOptions,
        cancel: &CancellationToken,
    ) -> Result<RestoreReport, Error> {
        let submission = self.execute(opts).await?;
        info!(
            job = %submission.restore_job_id,
            cluster = %submission.target_cluster_name,
            "waiting for restore job"
        );

        self.await_restore(
            &submission.target_namespace,
            &submission.restore_job_id,
            cancel,
        )
        .await?;
        self.wait_until_ready(
            &submission.target_namespace,
            &submission.target_cluster_name,
            cancel,
        )
        .await?;

        let summary = self
            .summary(
                &submission.target_namespace,
                &submission.target_cluster_name,
            )
            .await?;
        Ok(RestoreReport {
            submission,
            summary,
        })
    }

    /// Current state of a restore job
    pub async fn restore_status(&self, namespace: &str, job: &str) -> Result<JobStatus, Error> {
        self.jobs.status(namespace, job).await
    }

    /// Current readiness of a cluster
    pub async fn cluster_status(
        &self,
        namespace: &str,
        cluster: &str,
    ) -> Result<ClusterStatus, Error> {
        let definition = self
            .client
            .get_cluster(namespace, cluster)
            .await?
            .ok_or_else(|| Error::not_found("cluster", cluster, namespace))?;
        Ok(ClusterStatus {
            namespace: namespace.to_string(),
            cluster: cluster.to_string(),
            state: definition.state().map(str::to_string),
            ready: definition.is_ready(),
        })
    }

    /// Pick a backup of `cluster` when none is named.
    ///
    /// The newest backup whose window covers the instant is chosen; when none
    /// does, the newest completed before the instant (or the oldest) is
    /// returned so the window check can report the valid range.
    async fn choose_backup(
        &self,
        namespace: &str,
        cluster: &str,
        instant: Option<DateTime<Utc>>,
    ) -> Result<BackupRecord, Error> {
        let candidates: Vec<BackupRecord> = self
            .catalog
            .list(namespace)
            .await
            .into_iter()
            .filter(|b| b.cluster == cluster && b.completed_at.is_some())
            .collect();

        let Some(instant) = instant else {
            return candidates
                .into_iter()
                .next()
                .ok_or_else(|| Error::not_found("backup", format!("for cluster {}", cluster), namespace));
        };

        let covering = candidates.iter().position(|b| {
            restorable_window(b)
                .map(|w| w.contains(instant))
                .unwrap_or(false)
        });
        let before = candidates
            .iter()
            .position(|b| b.completed_at.is_some_and(|c| c <= instant));
        let index = covering
            .or(before)
            .or_else(|| candidates.len().checked_sub(1));

        match index {
            Some(i) => Ok(candidates[i].clone()),
            None => Err(Error::not_found(
                "backup",
                format!("for cluster {}", cluster),
                namespace,
            )),
        }
    }
}

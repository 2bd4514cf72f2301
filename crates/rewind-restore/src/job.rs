//! Restore job manager
//!
//! Creates restore jobs for the database operator and follows them to a
//! terminal state. Polling is bounded by a caller-supplied timeout and stops
//! early when the cancellation token fires; in both cases the job itself is
//! left running for the operator to finish.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rewind_common::pxc::{
    BackupSource, PerconaXtraDBClusterRestore, PitrSpec, RestoreSpec, RestoreState,
};
use rewind_common::time::{format_timestamp, name_suffix, option_timestamp};
use rewind_common::{Error, ANNOTATION_SOURCE_BACKUP};

use crate::catalog::BackupRecord;
use crate::client::KubeClient;

/// Interval between restore status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on a single restore attempt
pub const DEFAULT_RESTORE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// How waiting on a restore job ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job reached Succeeded
    Succeeded,
    /// The job reached Failed or Error
    Failed {
        /// Terminal state reported
        state: RestoreState,
        /// Operator comments, if any
        message: Option<String>,
    },
    /// The timeout elapsed before a terminal state
    TimedOut {
        /// Last state observed
        last_state: RestoreState,
    },
    /// Waiting was cancelled; the job keeps running
    Cancelled,
}

impl JobOutcome {
    /// Turn a non-success outcome into the matching error
    pub fn into_result(self, job: &str) -> Result<(), Error> {
        match self {
            JobOutcome::Succeeded => Ok(()),
            JobOutcome::Failed { state, message } => Err(Error::external(format!(
                "restore job {} reached state {}{}",
                job,
                state,
                message.map(|m| format!(": {}", m)).unwrap_or_default()
            ))),
            JobOutcome::TimedOut { last_state } => Err(Error::timeout(format!(
                "restore job {} still {} when the wait ended",
                job, last_state
            ))),
            JobOutcome::Cancelled => Err(Error::internal_with_context(
                "await_terminal",
                format!("wait for restore job {} was cancelled", job),
            )),
        }
    }
}

/// Snapshot of a restore job for status reporting
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Job name
    pub name: String,
    /// Cluster being restored
    pub cluster: String,
    /// Lifecycle state
    pub state: String,
    /// Whether the state is final
    pub terminal: bool,
    /// Operator comments
    pub comments: Option<String>,
    /// When the job finished
    #[serde(with = "option_timestamp")]
    pub completed: Option<DateTime<Utc>>,
}

/// Submits and tracks restore jobs
pub struct RestoreJobManager {
    client: Arc<dyn KubeClient>,
    poll_interval: Duration,
}

impl RestoreJobManager {
    /// Create a manager polling every [`DEFAULT_POLL_INTERVAL`]
    pub fn new(client: Arc<dyn KubeClient>) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Create a restore job and return its name
    pub async fn submit(
        &self,
        namespace: &str,
        cluster: &str,
        backup: &BackupRecord,
        instant: DateTime<Utc>,
        storage_name: &str,
    ) -> Result<String, Error> {
        let name = job_name(cluster, Utc::now(), &name_nonce());
        let restore = build_restore(&name, namespace, cluster, backup, instant, storage_name)?;

        self.client.create_restore(&restore).await?;
        info!(
            namespace = %namespace,
            cluster = %cluster,
            job = %name,
            backup = %backup.name,
            instant = %format_timestamp(&instant),
            storage = %storage_name,
            "restore job submitted"
        );
        Ok(name)
    }

    /// Poll a job until it is terminal, `timeout` elapses, or `cancel` fires
    pub async fn await_terminal(
        &self,
        namespace: &str,
        job: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_state = RestoreState::Starting;

        loop {
            match self.client.get_restore(namespace, job).await {
                Ok(Some(restore)) => {
                    let state = restore.state();
                    match &state {
                        RestoreState::Succeeded => {
                            info!(namespace = %namespace, job = %job, "restore job succeeded");
                            return Ok(JobOutcome::Succeeded);
                        }
                        RestoreState::Failed | RestoreState::Error => {
                            let message = restore.status.and_then(|s| s.comments);
                            warn!(
                                namespace = %namespace,
                                job = %job,
                                state = %state,
                                message = message.as_deref().unwrap_or(""),
                                "restore job failed"
                            );
                            return Ok(JobOutcome::Failed {
                                state: state.clone(),
                                message,
                            });
                        }
                        RestoreState::Unknown(raw) => {
                            debug!(job = %job, state = %raw, "unrecognized restore state, still waiting");
                        }
                        _ => debug!(job = %job, state = %state, "restore job in progress"),
                    }
                    last_state = state;
                }
                Ok(None) => return Err(Error::not_found("restore job", job, namespace)),
                Err(e) if e.is_retryable() => {
                    warn!(job = %job, error = %e, "failed to read restore job, will retry");
                }
                Err(e) => return Err(e),
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!(namespace = %namespace, job = %job, state = %last_state, "restore job timed out");
                return Ok(JobOutcome::TimedOut { last_state });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(job = %job, "stopped waiting for restore job");
                    return Ok(JobOutcome::Cancelled);
                }
                _ = tokio::time::sleep(self.poll_interval.min(deadline - now)) => {}
            }
        }
    }

    /// Number of restore jobs in the namespace that are not terminal
    ///
    /// Advisory only: another writer can submit between this count and a
    /// subsequent submit.
    pub async fn count_in_flight(&self, namespace: &str) -> Result<usize, Error> {
        let restores = self.client.list_restores(namespace).await?;
        let count = restores.iter().filter(|r| r.state().is_in_flight()).count();
        debug!(namespace = %namespace, count, "counted in-flight restores");
        Ok(count)
    }

    /// Current status of a job
    pub async fn status(&self, namespace: &str, job: &str) -> Result<JobStatus, Error> {
        let restore = self
            .client
            .get_restore(namespace, job)
            .await?
            .ok_or_else(|| Error::not_found("restore job", job, namespace))?;
        let state = restore.state();
        let status = restore.status.unwrap_or_default();
        Ok(JobStatus {
            name: restore.metadata.name,
            cluster: restore.spec.pxc_cluster,
            terminal: state.is_terminal(),
            state: state.to_string(),
            comments: status.comments,
            completed: status.completed,
        })
    }
}

/// Alphabet for name nonces, vowels dropped as in generated Kubernetes names
const NONCE_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

const NONCE_LEN: usize = 5;

/// Random suffix separating jobs submitted within the same second
fn name_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..NONCE_LEN)
        .map(|_| NONCE_ALPHABET[rng.gen_range(0..NONCE_ALPHABET.len())] as char)
        .collect()
}

/// Name for a new restore job: `restore-<cluster>-<YYYYMMDDHHMMSS>-<nonce>`
pub fn job_name(cluster: &str, at: DateTime<Utc>, nonce: &str) -> String {
    format!("restore-{}-{}-{}", cluster, name_suffix(&at), nonce)
}

/// Build the restore object for a backup and recovery instant.
///
/// The backup is referenced by storage location so it can live in another
/// environment. A point-in-time target is only set when the instant differs
/// from the backup's completion time.
pub fn build_restore(
    name: &str,
    namespace: &str,
    cluster: &str,
    backup: &BackupRecord,
    instant: DateTime<Utc>,
    storage_name: &str,
) -> Result<PerconaXtraDBClusterRestore, Error> {
    let destination = backup.destination.clone().ok_or_else(|| {
        Error::validation(format!(
            "backup {} has no storage destination and cannot be restored",
            backup.name
        ))
    })?;

    let pitr = (backup.completed_at != Some(instant)).then(|| PitrSpec {
        target_type: "date".to_string(),
        date: Some(format_timestamp(&instant)),
        backup_source: Some(BackupSource {
            destination: None,
            storage_name: Some(storage_name.to_string()),
        }),
    });

    let mut restore = PerconaXtraDBClusterRestore::new(
        name,
        namespace,
        RestoreSpec {
            pxc_cluster: cluster.to_string(),
            backup_name: None,
            backup_source: Some(BackupSource {
                destination: Some(destination),
                storage_name: Some(storage_name.to_string()),
            }),
            pitr,
        },
    );
    restore.metadata = restore
        .metadata
        .with_annotation(ANNOTATION_SOURCE_BACKUP, backup.name.clone());
    Ok(restore)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockKubeClient;
    use crate::test_support::{backup, restore, ts};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn record() -> BackupRecord {
        BackupRecord::from_backup(&backup("b1", "Succeeded", Some(ts(0)), Some(ts(4))), true)
    }

    fn manager(mock: MockKubeClient) -> RestoreJobManager {
        RestoreJobManager::new(Arc::new(mock))
    }

    /// Mock whose restore reports `states[i]` on the i-th poll, then the last one
    fn mock_with_states(states: &'static [&'static str], polls: Arc<AtomicU32>) -> MockKubeClient {
        let mut mock = MockKubeClient::new();
        mock.expect_get_restore().returning(move |ns, name| {
            let i = polls.fetch_add(1, Ordering::SeqCst) as usize;
            let state = states[i.min(states.len() - 1)];
            Ok(Some(restore(ns, name, state)))
        });
        mock
    }

    #[test]
    fn test_build_restore_with_point_in_time() {
        let r = build_restore("restore-1", "staging", "c1", &record(), ts(2), "s3-us-west").unwrap();

        assert_eq!(r.metadata.namespace, "staging");
        assert_eq!(r.spec.pxc_cluster, "c1");
        assert_eq!(
            r.metadata.annotations.get(ANNOTATION_SOURCE_BACKUP),
            Some(&"b1".to_string())
        );
        let source = r.spec.backup_source.unwrap();
        assert_eq!(source.destination.as_deref(), Some("s3://backups/b1"));
        assert_eq!(source.storage_name.as_deref(), Some("s3-us-west"));

        let pitr = r.spec.pitr.unwrap();
        assert_eq!(pitr.target_type, "date");
        assert_eq!(pitr.date.as_deref(), Some("2024-03-01 02:00:00"));
        assert_eq!(
            pitr.backup_source.and_then(|s| s.storage_name).as_deref(),
            Some("s3-us-west")
        );
    }

    #[test]
    fn test_build_restore_at_completion_omits_pitr() {
        let r = build_restore("restore-1", "standby", "c1", &record(), ts(0), "s3-us-west").unwrap();
        assert!(r.spec.pitr.is_none());
    }

    #[test]
    fn test_build_restore_requires_destination() {
        let mut rec = record();
        rec.destination = None;
        let err = build_restore("r", "standby", "c1", &rec, ts(0), "s3").unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_job_name() {
        assert_eq!(
            job_name("standby1", ts(4), "x7k2q"),
            "restore-standby1-20240301040000-x7k2q"
        );
        let nonce = name_nonce();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.bytes().all(|b| NONCE_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn test_submits_in_the_same_second_get_distinct_names() {
        let names = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let mut mock = MockKubeClient::new();
        let seen = names.clone();
        mock.expect_create_restore().times(2).returning(move |r| {
            let mut seen = seen.lock().unwrap();
            if seen.contains(&r.metadata.name) {
                return Err(Error::conflict(format!("{} already exists", r.metadata.name)));
            }
            seen.push(r.metadata.name.clone());
            Ok(())
        });

        let jobs = manager(mock);
        let first = jobs
            .submit("standby", "standby1", &record(), ts(0), "s3-us-west")
            .await
            .unwrap();
        let second = jobs
            .submit("standby", "standby1", &record(), ts(0), "s3-us-west")
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(names.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_submit_creates_one_restore() {
        let mut mock = MockKubeClient::new();
        mock.expect_create_restore()
            .withf(|r| {
                r.metadata.namespace == "standby"
                    && r.spec.pxc_cluster == "standby1"
                    && r.metadata.name.starts_with("restore-standby1-")
            })
            .times(1)
            .returning(|_| Ok(()));

        let job = manager(mock)
            .submit("standby", "standby1", &record(), ts(0), "s3-us-west")
            .await
            .unwrap();
        assert!(job.starts_with("restore-standby1-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_terminal_succeeds() {
        let polls = Arc::new(AtomicU32::new(0));
        let mock = mock_with_states(&["Starting", "Running", "Succeeded"], polls.clone());

        let outcome = manager(mock)
            .await_terminal("standby", "r1", DEFAULT_RESTORE_TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    /// A job that fails on the third poll is Failed, not TimedOut
    #[tokio::test(start_paused = true)]
    async fn test_failed_after_three_polls() {
        let polls = Arc::new(AtomicU32::new(0));
        let mock = mock_with_states(&["Starting", "Running", "Failed"], polls.clone());

        let outcome = manager(mock)
            .await_terminal("standby", "r1", Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            JobOutcome::Failed {
                state: RestoreState::Failed,
                ..
            }
        ));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_state_is_failure() {
        let polls = Arc::new(AtomicU32::new(0));
        let mock = mock_with_states(&["Error"], polls);
        let outcome = manager(mock)
            .await_terminal("standby", "r1", Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            JobOutcome::Failed {
                state: RestoreState::Error,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_terminal_times_out() {
        let polls = Arc::new(AtomicU32::new(0));
        let mock = mock_with_states(&["Running"], polls.clone());

        let outcome = manager(mock)
            .await_terminal("standby", "r1", Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            JobOutcome::TimedOut {
                last_state: RestoreState::Running
            }
        );
        // Polls at 0s, 10s, ..., 60s
        assert_eq!(polls.load(Ordering::SeqCst), 7);
    }

    /// Unrecognized states are not failures; polling continues until the bound
    #[tokio::test(start_paused = true)]
    async fn test_unknown_state_keeps_polling() {
        let polls = Arc::new(AtomicU32::new(0));
        let mock = mock_with_states(
            &["Stopping Cluster", "Restoring", "Succeeded"],
            polls.clone(),
        );
        let outcome = manager(mock)
            .await_terminal("standby", "r1", Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_terminal_stops_on_cancel() {
        let polls = Arc::new(AtomicU32::new(0));
        let mock = mock_with_states(&["Running"], polls.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = manager(mock)
            .await_terminal("standby", "r1", DEFAULT_RESTORE_TIMEOUT, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Cancelled);
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_terminal_retries_transient_read_errors() {
        let mut mock = MockKubeClient::new();
        let mut calls = 0;
        mock.expect_get_restore().returning(move |ns, name| {
            calls += 1;
            if calls == 1 {
                Err(Error::external("apiserver unavailable"))
            } else {
                Ok(Some(restore(ns, name, "Succeeded")))
            }
        });
        let outcome = manager(mock)
            .await_terminal("standby", "r1", Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_await_terminal_missing_job_is_not_found() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_restore().returning(|_, _| Ok(None));
        let err = manager(mock)
            .await_terminal("standby", "gone", Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_count_in_flight() {
        let mut mock = MockKubeClient::new();
        mock.expect_list_restores().returning(|ns| {
            Ok(vec![
                restore(ns, "a", "Succeeded"),
                restore(ns, "b", "Running"),
                restore(ns, "c", "Failed"),
                restore(ns, "d", ""),
                restore(ns, "e", "Restoring"),
                restore(ns, "f", "Error"),
            ])
        });
        assert_eq!(manager(mock).count_in_flight("standby").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_status_reports_state() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_restore()
            .returning(|ns, name| Ok(Some(restore(ns, name, "Running"))));
        let status = manager(mock).status("standby", "r1").await.unwrap();
        assert_eq!(status.name, "r1");
        assert_eq!(status.state, "Running");
        assert!(!status.terminal);
    }

    #[test]
    fn test_outcome_into_result() {
        assert!(JobOutcome::Succeeded.into_result("r1").is_ok());
        assert!(matches!(
            JobOutcome::Failed {
                state: RestoreState::Failed,
                message: Some("xtrabackup exited 1".to_string())
            }
            .into_result("r1"),
            Err(Error::ExternalFailure { .. })
        ));
        assert!(matches!(
            JobOutcome::TimedOut {
                last_state: RestoreState::Running
            }
            .into_result("r1"),
            Err(Error::Timeout { .. })
        ));
    }
}

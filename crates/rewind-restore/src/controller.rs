//! Standby reconciliation controller
//!
//! Keeps a standby cluster restored to the newest completed backup of a
//! source environment. Each cycle runs `Idle -> Checking -> (Skip | Restoring)
//! -> Idle`:
//!
//! - skip while any restore job is in flight in the target environment
//! - skip when there is no eligible backup or its upload never finished
//! - skip when the tracking record already names the newest backup
//! - otherwise restore the newest backup at its completion instant and, on
//!   success only, advance the tracking record
//!
//! A failed or timed-out restore leaves the tracking record alone so the same
//! backup is attempted again next cycle.
//!
//! Exclusion is cooperative: the in-flight count and the submit are not
//! atomic, which is sound for a single controller per target environment
//! only.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rewind_common::time::format_timestamp;
use rewind_common::Error;

use crate::catalog::{BackupCatalog, BackupRecord};
use crate::client::KubeClient;
use crate::job::{JobOutcome, RestoreJobManager, DEFAULT_RESTORE_TIMEOUT};
use crate::tracker::{RestoreStateTracker, TrackingRecord};

/// Default pause between reconciliation cycles
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Standby controller configuration
#[derive(Clone, Debug)]
pub struct StandbyConfig {
    /// Environment whose backups are restored
    pub source_namespace: String,
    /// Only follow backups of this cluster (all clusters when unset)
    pub source_cluster: Option<String>,
    /// Environment holding the standby cluster
    pub target_namespace: String,
    /// Standby cluster restored into
    pub target_cluster: String,
    /// Pause between cycles
    pub cycle_interval: Duration,
    /// Upper bound on one restore attempt
    pub restore_timeout: Duration,
}

impl StandbyConfig {
    /// Configuration with default intervals
    pub fn new(source_namespace: &str, target_namespace: &str, target_cluster: &str) -> Self {
        Self {
            source_namespace: source_namespace.to_string(),
            source_cluster: None,
            target_namespace: target_namespace.to_string(),
            target_cluster: target_cluster.to_string(),
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            restore_timeout: DEFAULT_RESTORE_TIMEOUT,
        }
    }
}

/// What one reconciliation cycle did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Restores already in flight in the target; nothing submitted
    InFlight {
        /// Number of in-flight restore jobs
        count: usize,
    },
    /// No eligible backup in the source environment
    NoBackup,
    /// Newest backup has no storage destination yet
    IncompleteBackup {
        /// Backup name
        backup: String,
    },
    /// Newest backup was already restored
    UpToDate {
        /// Backup name
        backup: String,
    },
    /// Newest backup restored and recorded
    Restored {
        /// Backup name
        backup: String,
        /// Restore job name
        job: String,
    },
    /// Restore job reached Failed or Error
    RestoreFailed {
        /// Backup name
        backup: String,
        /// Restore job name
        job: String,
        /// Failure detail
        reason: String,
    },
    /// Restore job did not finish within the timeout
    RestoreTimedOut {
        /// Backup name
        backup: String,
        /// Restore job name
        job: String,
    },
    /// Shutdown requested while waiting on a restore job
    Cancelled {
        /// Backup name
        backup: String,
        /// Restore job name
        job: String,
    },
}

impl CycleOutcome {
    /// Whether the cycle submitted nothing
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::InFlight { .. }
                | Self::NoBackup
                | Self::IncompleteBackup { .. }
                | Self::UpToDate { .. }
        )
    }
}

/// Unattended loop keeping a standby cluster caught up
pub struct StandbyController {
    config: StandbyConfig,
    catalog: BackupCatalog,
    tracker: RestoreStateTracker,
    jobs: RestoreJobManager,
}

impl StandbyController {
    /// Create a controller over the given client
    pub fn new(client: Arc<dyn KubeClient>, config: StandbyConfig) -> Self {
        Self {
            catalog: BackupCatalog::new(client.clone()),
            tracker: RestoreStateTracker::new(
                client.clone(),
                &config.target_namespace,
                &config.target_cluster,
            ),
            jobs: RestoreJobManager::new(client),
            config,
        }
    }

    /// Override the restore status poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.jobs = self.jobs.with_poll_interval(poll_interval);
        self
    }

    /// Run one cycle
    pub async fn reconcile_once(&self, cancel: &CancellationToken) -> Result<CycleOutcome, Error> {
        let cfg = &self.config;

        let in_flight = self.jobs.count_in_flight(&cfg.target_namespace).await?;
        if in_flight > 0 {
            return Ok(CycleOutcome::InFlight { count: in_flight });
        }

        let Some(newest) = self
            .catalog
            .newest(&cfg.source_namespace, cfg.source_cluster.as_deref())
            .await
        else {
            return Ok(CycleOutcome::NoBackup);
        };

        let (Some(completed_at), Some(record)) =
            (newest.completed_at, TrackingRecord::for_backup(&newest))
        else {
            return Ok(CycleOutcome::IncompleteBackup {
                backup: newest.name,
            });
        };

        if let Some(last) = self.tracker.load().await? {
            if last.matches(&newest) {
                return Ok(CycleOutcome::UpToDate {
                    backup: newest.name,
                });
            }
            debug!(
                last_completed = %format_timestamp(&last.last_completed_backup_time),
                last_destination = %last.last_backup_destination,
                "standby is behind the newest backup"
            );
        }

        let storage = storage_for(&newest)?;
        info!(
            backup = %newest.name,
            completed = %format_timestamp(&completed_at),
            target = %format!("{}/{}", cfg.target_namespace, cfg.target_cluster),
            "restoring standby to newest backup"
        );

        let job = self
            .jobs
            .submit(
                &cfg.target_namespace,
                &cfg.target_cluster,
                &newest,
                completed_at,
                storage,
            )
            .await?;

        let outcome = self
            .jobs
            .await_terminal(&cfg.target_namespace, &job, cfg.restore_timeout, cancel)
            .await?;

        let backup = newest.name.clone();
        Ok(match outcome {
            JobOutcome::Succeeded => {
                self.tracker.save(&record).await?;
                CycleOutcome::Restored { backup, job }
            }
            JobOutcome::Failed { state, message } => CycleOutcome::RestoreFailed {
                backup,
                job,
                reason: match message {
                    Some(m) => format!("{}: {}", state, m),
                    None => state.to_string(),
                },
            },
            JobOutcome::TimedOut { .. } => CycleOutcome::RestoreTimedOut { backup, job },
            JobOutcome::Cancelled => CycleOutcome::Cancelled { backup, job },
        })
    }

    /// Run cycles until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            source = %self.config.source_namespace,
            target = %format!("{}/{}", self.config.target_namespace, self.config.target_cluster),
            interval_secs = self.config.cycle_interval.as_secs(),
            "standby controller started"
        );

        loop {
            match self.reconcile_once(&cancel).await {
                Ok(CycleOutcome::Cancelled { backup, job }) => {
                    info!(backup = %backup, job = %job, "shutdown requested, leaving restore job to finish");
                    break;
                }
                Ok(outcome) => log_outcome(&outcome),
                Err(Error::Conflict { message }) => {
                    info!(reason = %message, "skipping cycle");
                }
                Err(e) => error!(error = %e, "reconcile cycle failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.cycle_interval) => {}
            }
        }

        info!("standby controller stopped");
    }
}

/// Storage profile a backup is restored from
fn storage_for(backup: &BackupRecord) -> Result<&str, Error> {
    backup.storage_name.as_deref().ok_or_else(|| {
        Error::validation(format!("backup {} does not name its storage", backup.name))
    })
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::InFlight { count } => {
            info!(count, "restore already in flight, skipping cycle")
        }
        CycleOutcome::NoBackup => debug!("no eligible backup yet"),
        CycleOutcome::IncompleteBackup { backup } => {
            info!(backup = %backup, "newest backup has no destination yet, skipping")
        }
        CycleOutcome::UpToDate { backup } => debug!(backup = %backup, "standby is up to date"),
        CycleOutcome::Restored { backup, job } => {
            info!(backup = %backup, job = %job, "standby restored")
        }
        CycleOutcome::RestoreFailed {
            backup,
            job,
            reason,
        } => warn!(
            backup = %backup,
            job = %job,
            reason = %reason,
            "standby restore failed, will retry next cycle"
        ),
        CycleOutcome::RestoreTimedOut { backup, job } => warn!(
            backup = %backup,
            job = %job,
            "standby restore timed out, will retry next cycle"
        ),
        CycleOutcome::Cancelled { backup, job } => {
            info!(backup = %backup, job = %job, "restore wait cancelled")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockKubeClient;
    use crate::test_support::{backup, restore, ts};
    use rewind_common::pxc::PerconaXtraDBClusterBackup;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Shared fake state behind the mock client
    #[derive(Clone, Default)]
    struct FakeCluster {
        backups: Arc<Mutex<Vec<PerconaXtraDBClusterBackup>>>,
        tracking: Arc<Mutex<Option<BTreeMap<String, String>>>>,
        in_flight: Arc<Mutex<Vec<String>>>,
        submitted: Arc<AtomicU32>,
        final_state: Arc<Mutex<String>>,
    }

    impl FakeCluster {
        fn new() -> Self {
            let fake = Self::default();
            *fake.final_state.lock().unwrap() = "Succeeded".to_string();
            fake
        }

        fn mock(&self) -> MockKubeClient {
            let mut mock = MockKubeClient::new();

            let in_flight = self.in_flight.clone();
            mock.expect_list_restores().returning(move |ns| {
                Ok(in_flight
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|name| restore(ns, name, "Running"))
                    .collect())
            });

            let backups = self.backups.clone();
            mock.expect_list_backups()
                .returning(move |_| Ok(backups.lock().unwrap().clone()));
            mock.expect_list_clusters().returning(|_| Ok(vec![]));

            let tracking = self.tracking.clone();
            mock.expect_get_config_map_data()
                .returning(move |_, _| Ok(tracking.lock().unwrap().clone()));
            let tracking = self.tracking.clone();
            mock.expect_apply_config_map_data()
                .returning(move |_, _, _, data| {
                    *tracking.lock().unwrap() = Some(data);
                    Ok(())
                });

            let submitted = self.submitted.clone();
            mock.expect_create_restore().returning(move |_| {
                submitted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

            let final_state = self.final_state.clone();
            mock.expect_get_restore().returning(move |ns, name| {
                Ok(Some(restore(ns, name, &final_state.lock().unwrap())))
            });
            mock
        }

        fn controller(&self) -> StandbyController {
            let mut config = StandbyConfig::new("prod", "standby", "standby1");
            config.restore_timeout = Duration::from_secs(60);
            StandbyController::new(Arc::new(self.mock()), config)
        }

        fn add_backup(&self, name: &str, completed: i64) {
            self.backups
                .lock()
                .unwrap()
                .push(backup(name, "Succeeded", Some(ts(completed)), None));
        }

        fn tracked_destination(&self) -> Option<String> {
            self.tracking
                .lock()
                .unwrap()
                .as_ref()
                .and_then(|d| d.get("lastBackupDestination").cloned())
        }

        fn submitted(&self) -> u32 {
            self.submitted.load(Ordering::SeqCst)
        }
    }

    // ==========================================================================
    // Story Tests: standby catch-up
    // ==========================================================================

    /// Restore B1, no-op on the same B1, then restore a newer B2
    #[tokio::test(start_paused = true)]
    async fn test_catch_up_is_idempotent() {
        let fake = FakeCluster::new();
        let controller = fake.controller();
        let cancel = CancellationToken::new();
        fake.add_backup("b1", 0);

        // Cycle 1: restores B1 and records it
        let outcome = controller.reconcile_once(&cancel).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Restored { ref backup, .. } if backup == "b1"));
        assert_eq!(fake.submitted(), 1);
        assert_eq!(fake.tracked_destination().as_deref(), Some("s3://backups/b1"));

        // Cycle 2: same newest backup, nothing submitted, record unchanged
        let before = fake.tracking.lock().unwrap().clone();
        let outcome = controller.reconcile_once(&cancel).await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::UpToDate {
                backup: "b1".to_string()
            }
        );
        assert_eq!(fake.submitted(), 1);
        assert_eq!(*fake.tracking.lock().unwrap(), before);

        // Cycle 3: newer B2 appears and is restored
        fake.add_backup("b2", 6);
        let outcome = controller.reconcile_once(&cancel).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Restored { ref backup, .. } if backup == "b2"));
        assert_eq!(fake.submitted(), 2);
        assert_eq!(fake.tracked_destination().as_deref(), Some("s3://backups/b2"));
        let tracking = fake.tracking.lock().unwrap().clone().unwrap();
        assert_eq!(tracking["lastCompletedBackupTime"], "2024-03-01 06:00:00");
    }

    /// A restore already in flight blocks a second submission
    #[tokio::test(start_paused = true)]
    async fn test_in_flight_restore_blocks_submit() {
        let fake = FakeCluster::new();
        fake.add_backup("b1", 0);
        fake.in_flight
            .lock()
            .unwrap()
            .push("restore-standby1-manual".to_string());

        let outcome = fake
            .controller()
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, CycleOutcome::InFlight { count: 1 });
        assert!(outcome.is_skip());
        assert_eq!(fake.submitted(), 0);
    }

    /// At-least-once: a failed restore leaves the record so the backup is retried
    #[tokio::test(start_paused = true)]
    async fn story_failed_restore_is_retried_next_cycle() {
        let fake = FakeCluster::new();
        fake.add_backup("b1", 0);
        *fake.final_state.lock().unwrap() = "Failed".to_string();
        let controller = fake.controller();
        let cancel = CancellationToken::new();

        let outcome = controller.reconcile_once(&cancel).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::RestoreFailed { .. }));
        assert!(fake.tracking.lock().unwrap().is_none());

        // Executor recovers; the same backup is submitted again
        *fake.final_state.lock().unwrap() = "Succeeded".to_string();
        let outcome = controller.reconcile_once(&cancel).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Restored { ref backup, .. } if backup == "b1"));
        assert_eq!(fake.submitted(), 2);
    }

    /// At-least-once: a timed-out restore does not advance the record
    #[tokio::test(start_paused = true)]
    async fn story_timed_out_restore_does_not_advance_record() {
        let fake = FakeCluster::new();
        fake.add_backup("b1", 0);
        *fake.final_state.lock().unwrap() = "Running".to_string();

        let outcome = fake
            .controller()
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, CycleOutcome::RestoreTimedOut { .. }));
        assert!(fake.tracking.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submit_error_does_not_advance_record() {
        let fake = FakeCluster::new();
        fake.add_backup("b1", 0);
        let mut mock = MockKubeClient::new();
        mock.expect_list_restores().returning(|_| Ok(vec![]));
        let backups = fake.backups.clone();
        mock.expect_list_backups()
            .returning(move |_| Ok(backups.lock().unwrap().clone()));
        mock.expect_list_clusters().returning(|_| Ok(vec![]));
        mock.expect_get_config_map_data().returning(|_, _| Ok(None));
        mock.expect_apply_config_map_data().never();
        mock.expect_create_restore()
            .returning(|_| Err(Error::external("webhook unavailable")));

        let controller = StandbyController::new(
            Arc::new(mock),
            StandbyConfig::new("prod", "standby", "standby1"),
        );
        assert!(controller
            .reconcile_once(&CancellationToken::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_skips_without_backups() {
        let fake = FakeCluster::new();
        let outcome = fake
            .controller()
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, CycleOutcome::NoBackup);
        assert_eq!(fake.submitted(), 0);
    }

    #[tokio::test]
    async fn test_skips_backup_without_destination() {
        let fake = FakeCluster::new();
        let mut b = backup("b1", "Succeeded", Some(ts(0)), None);
        if let Some(status) = b.status.as_mut() {
            status.destination = None;
        }
        fake.backups.lock().unwrap().push(b);

        let outcome = fake
            .controller()
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::IncompleteBackup {
                backup: "b1".to_string()
            }
        );
        assert_eq!(fake.submitted(), 0);
    }

    #[tokio::test]
    async fn test_restores_at_completion_instant() {
        let fake = FakeCluster::new();
        fake.add_backup("b1", 0);

        let mut mock = MockKubeClient::new();
        mock.expect_list_restores().returning(|_| Ok(vec![]));
        let backups = fake.backups.clone();
        mock.expect_list_backups()
            .returning(move |_| Ok(backups.lock().unwrap().clone()));
        mock.expect_list_clusters().returning(|_| Ok(vec![]));
        mock.expect_get_config_map_data().returning(|_, _| Ok(None));
        mock.expect_apply_config_map_data()
            .returning(|_, _, _, _| Ok(()));
        mock.expect_create_restore()
            .withf(|r| {
                r.spec.pitr.is_none()
                    && r.spec.pxc_cluster == "standby1"
                    && r.metadata.namespace == "standby"
            })
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_get_restore()
            .returning(|ns, name| Ok(Some(restore(ns, name, "Succeeded"))));

        let controller = StandbyController::new(
            Arc::new(mock),
            StandbyConfig::new("prod", "standby", "standby1"),
        );
        controller
            .reconcile_once(&CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_on_cancel() {
        let fake = FakeCluster::new();
        let controller = Arc::new(fake.controller());
        let cancel = CancellationToken::new();

        let handle = {
            let controller = controller.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { controller.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("controller should stop promptly")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_leaves_job_running() {
        let fake = FakeCluster::new();
        fake.add_backup("b1", 0);
        *fake.final_state.lock().unwrap() = "Running".to_string();
        let mut config = StandbyConfig::new("prod", "standby", "standby1");
        config.restore_timeout = DEFAULT_RESTORE_TIMEOUT;
        let controller = StandbyController::new(Arc::new(fake.mock()), config);
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { controller.reconcile_once(&cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();

        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(outcome, CycleOutcome::Cancelled { .. }));
        assert!(fake.tracking.lock().unwrap().is_none());
    }
}

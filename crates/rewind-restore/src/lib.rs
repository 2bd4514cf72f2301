//! Point-in-time restore orchestration
//!
//! Components, leaf first:
//! - [`catalog`] lists completed backups of a source environment
//! - [`window`] derives and validates each backup's recovery window
//! - [`tracker`] persists what the standby controller last restored
//! - [`cloner`] copies a cluster definition and its credentials to another environment
//! - [`job`] submits restore jobs and waits for them to finish
//! - [`controller`] keeps a standby environment caught up, unattended
//! - [`workflow`] runs a single attended restore to a chosen instant
//!
//! Everything talks to the cluster through the [`client::KubeClient`] seam.

#![deny(missing_docs)]

pub mod catalog;
pub mod client;
pub mod cloner;
pub mod controller;
pub mod job;
pub mod summary;
pub mod tracker;
pub mod window;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{BackupCatalog, BackupRecord};
pub use client::{KubeClient, KubeClientImpl};
pub use cloner::{CloneRequest, EnvironmentClone, EnvironmentCloner};
pub use controller::{CycleOutcome, StandbyConfig, StandbyController, DEFAULT_CYCLE_INTERVAL};
pub use job::{
    JobOutcome, JobStatus, RestoreJobManager, DEFAULT_POLL_INTERVAL, DEFAULT_RESTORE_TIMEOUT,
};
pub use summary::DatabaseSummary;
pub use tracker::{RestoreStateTracker, TrackingRecord};
pub use window::RecoveryWindow;
pub use workflow::{
    RestoreOptions, RestorePlan, RestoreReport, RestoreSubmission, RestoreWorkflow,
    DEFAULT_READY_TIMEOUT,
};

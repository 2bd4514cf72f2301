//! Rewind restore API
//!
//! HTTP front end for the interactive restore workflow. Every endpoint is a
//! thin adapter over [`rewind_restore::RestoreWorkflow`]; long-running work
//! (the restore job itself) is started by `POST /restore` and observed by
//! polling the status endpoints.
//!
//! # Endpoints
//!
//! - `GET /backups?env=` - Backups of an environment with recovery windows
//! - `GET /namespace/check?env=&cluster=` - Environment existence and name collision
//! - `POST /namespace/create` - Create an environment
//! - `POST /restore` - Clone and submit a restore, returns the job name
//! - `POST /restore/plan` - Dry run of `POST /restore`
//! - `GET /restore/status?env=&name=` - Restore job state
//! - `GET /restore/summary?env=&cluster=` - Database and table counts of a ready cluster
//! - `GET /cluster/status?env=&cluster=` - Cluster readiness
//! - `GET /healthz` - Health check
//!
//! All timestamps are UTC in `YYYY-MM-DD HH:MM:SS` form.

#![deny(missing_docs)]

pub mod error;
pub mod handlers;
pub mod server;

pub use error::{Error, Result};
pub use server::{router, start_server, AppState, ServerConfig, DEFAULT_LISTEN_ADDR};

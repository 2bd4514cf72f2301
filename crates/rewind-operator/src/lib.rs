//! Rewind operator
//!
//! Long-running deployment of the restore core. Two modes:
//!
//! - `controller` keeps a standby environment restored to the newest backup
//!   of a source environment
//! - `serve` exposes the interactive restore workflow over HTTP
//!
//! Both stop at their next suspension point on SIGINT or SIGTERM.

pub mod config;
pub mod shutdown;

pub use config::{Cli, Commands};

//! Common types for rewind: errors, resource models, and utilities

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod pxc;
pub mod retry;
pub mod telemetry;
pub mod time;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key identifying the tool that manages a resource
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label value for resources managed by rewind
pub const LABEL_MANAGED_BY_REWIND: &str = "rewind";

/// Label key for the resource name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Annotation recording which backup a restore job was created from
pub const ANNOTATION_SOURCE_BACKUP: &str = "rewind.dev/source-backup";

/// Annotation recording which environment a cloned resource came from
pub const ANNOTATION_SOURCE_NAMESPACE: &str = "rewind.dev/source-namespace";

/// Field manager used by the standby controller
pub const FIELD_MANAGER_CONTROLLER: &str = "rewind-controller";

/// Field manager used by the interactive workflow
pub const FIELD_MANAGER_WORKFLOW: &str = "rewind-workflow";

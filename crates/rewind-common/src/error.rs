//! Error types for restore orchestration
//!
//! Errors are structured so callers can decide how to react: a NotFound or
//! OutOfRange is reported to the operator and never retried, a Conflict is a
//! normal skip for the standby controller, and ExternalFailure/Timeout are kept
//! apart so "still working" can be told from "definitely broken".

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::time::format_timestamp;

/// Main error type for rewind operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A required object does not exist
    #[error("{kind} not found: {name}{}", namespace_suffix(.namespace))]
    NotFound {
        /// Kind of the missing object (e.g. "backup", "cluster")
        kind: String,
        /// Name of the missing object
        name: String,
        /// Namespace that was searched, if any
        namespace: Option<String>,
    },

    /// Requested recovery instant lies outside the backup's recovery window
    #[error(
        "recovery instant {} is outside the recovery window [{}, {}]",
        format_timestamp(.requested),
        format_timestamp(.earliest),
        format_timestamp(.latest)
    )]
    OutOfRange {
        /// The instant the caller asked for
        requested: DateTime<Utc>,
        /// Earliest valid instant
        earliest: DateTime<Utc>,
        /// Latest valid instant
        latest: DateTime<Utc>,
    },

    /// Restore already in flight or a naming collision in the target
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
    },

    /// An external system reported failure (job failed, copy failed)
    #[error("external failure: {message}")]
    ExternalFailure {
        /// Description of what failed
        message: String,
    },

    /// An operation did not reach a terminal state in time
    #[error("timed out: {message}")]
    Timeout {
        /// Description of what timed out
        message: String,
    },

    /// Invalid input from the caller
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

fn namespace_suffix(namespace: &Option<String>) -> String {
    namespace
        .as_ref()
        .map(|ns| format!(" (namespace {})", ns))
        .unwrap_or_default()
}

impl Error {
    /// Create a not-found error for an object in a namespace
    pub fn not_found(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Create a not-found error for a cluster-scoped object
    pub fn not_found_global(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Create an out-of-range error for a requested instant
    pub fn out_of_range(
        requested: DateTime<Utc>,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> Self {
        Self::OutOfRange {
            requested,
            earliest,
            latest,
        }
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
        }
    }

    /// Create an external failure error
    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalFailure {
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout {
            message: msg.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is worth retrying automatically
    ///
    /// NotFound, OutOfRange and Validation need an operator to act. Conflict
    /// and Timeout clear up on their own; Kubernetes errors are retryable
    /// unless the API server rejected the request with a 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::NotFound { .. } => false,
            Error::OutOfRange { .. } => false,
            Error::Conflict { .. } => true,
            Error::ExternalFailure { .. } => true,
            Error::Timeout { .. } => true,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Whether this is a NotFound, either ours or a 404 from the API server
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    // ==========================================================================
    // Story Tests: how each failure category is reported
    // ==========================================================================

    /// Story: an operator asks for an instant after the last archived log
    ///
    /// The message carries the valid window so the operator can pick again.
    #[test]
    fn story_out_of_range_reports_valid_window() {
        let err = Error::out_of_range(ts(5), ts(0), ts(4));
        let msg = err.to_string();
        assert!(msg.contains("2024-03-01 05:00:00"));
        assert!(msg.contains("[2024-03-01 00:00:00, 2024-03-01 04:00:00]"));
        assert!(!err.is_retryable());
    }

    /// Story: the source environment has no cluster to clone
    #[test]
    fn story_not_found_names_the_namespace() {
        let err = Error::not_found("cluster", "cluster1", "prod");
        assert_eq!(err.to_string(), "cluster not found: cluster1 (namespace prod)");
        assert!(err.is_not_found());
        assert!(!err.is_retryable());

        let err = Error::not_found_global("namespace", "staging");
        assert_eq!(err.to_string(), "namespace not found: staging");
    }

    /// Story: the standby controller sees a restore already running
    ///
    /// Conflicts are not failures for the controller; it tries again later.
    #[test]
    fn story_conflict_is_retryable() {
        let err = Error::conflict("restore already in flight in standby");
        assert!(err.to_string().starts_with("conflict:"));
        assert!(err.is_retryable());
    }

    /// Story: timeouts and failures are distinguishable
    #[test]
    fn story_timeout_distinct_from_external_failure() {
        let failed = Error::external("restore job restore-1 reached state Failed");
        let timed_out = Error::timeout("restore job restore-1 still Running after 2h");

        assert!(matches!(failed, Error::ExternalFailure { .. }));
        assert!(matches!(timed_out, Error::Timeout { .. }));
        assert_ne!(failed.to_string(), timed_out.to_string());
    }

    #[test]
    fn test_serialization_error_keeps_kind() {
        let err = Error::serialization_for_kind("PerconaXtraDBClusterRestore", "missing spec");
        match &err {
            Error::Serialization { kind, .. } => {
                assert_eq!(kind.as_deref(), Some("PerconaXtraDBClusterRestore"))
            }
            _ => panic!("Expected Serialization variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_error_with_context() {
        let err = Error::internal_with_context("poll_until", "gave up");
        assert!(err.to_string().contains("[poll_until]"));
        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_validation_not_retryable() {
        assert!(!Error::validation("cluster name too long").is_retryable());
    }
}

//! Error types for the CLI

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Restore(#[from] rewind_common::Error),

    #[error(transparent)]
    Telemetry(#[from] rewind_common::telemetry::TelemetryError),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dry run found {count} blocking problem(s): {first}")]
    Blocked { count: usize, first: String },
}

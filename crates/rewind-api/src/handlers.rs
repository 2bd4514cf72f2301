//! Request handlers
//!
//! Query and body types use the wire names of the HTTP surface (`env`,
//! `sourceEnv`, ...) and are translated into workflow calls here.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use rewind_common::time::parse_timestamp;
use rewind_restore::workflow::{BackupListing, ClusterStatus, NamespaceCheck};
use rewind_restore::{DatabaseSummary, JobStatus, RestoreOptions, RestorePlan, RestoreSubmission};

use crate::error::{Error, Result};
use crate::server::AppState;

/// `?env=`
#[derive(Debug, Deserialize)]
pub struct EnvQuery {
    /// Environment name
    pub env: String,
}

/// `?env=&cluster=` with an optional cluster
#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    /// Environment name
    pub env: String,
    /// Cluster name to check for a collision
    #[serde(default)]
    pub cluster: Option<String>,
}

/// `?env=&cluster=`
#[derive(Debug, Deserialize)]
pub struct ClusterQuery {
    /// Environment name
    pub env: String,
    /// Cluster name
    pub cluster: String,
}

/// `?env=&name=`
#[derive(Debug, Deserialize)]
pub struct JobQuery {
    /// Environment name
    pub env: String,
    /// Restore job name
    pub name: String,
}

/// Body of `POST /namespace/create`
#[derive(Debug, Deserialize)]
pub struct CreateNamespaceRequest {
    /// Environment to create
    pub env: String,
}

/// Response of `POST /namespace/create`
#[derive(Debug, Serialize)]
pub struct CreateNamespaceResponse {
    /// Environment created
    pub env: String,
}

/// Body of `POST /restore` and `POST /restore/plan`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    /// Source environment
    pub source_env: String,
    /// Source cluster, when the environment has several
    #[serde(default)]
    pub source_cluster: Option<String>,
    /// Target environment; the source environment when absent
    #[serde(default)]
    pub target_env: Option<String>,
    /// Name for the restored cluster
    #[serde(default)]
    pub target_cluster: Option<String>,
    /// Backup to restore
    #[serde(default)]
    pub backup_name: Option<String>,
    /// Instant to restore to, `YYYY-MM-DD HH:MM:SS` UTC
    #[serde(default)]
    pub recovery_instant: Option<String>,
    /// Create the target environment if missing
    #[serde(default)]
    pub create_namespace: bool,
}

impl RestoreRequest {
    /// Translate into workflow options; empty strings count as absent
    pub fn into_options(self) -> Result<RestoreOptions> {
        if self.source_env.trim().is_empty() {
            return Err(Error::BadRequest("sourceEnv is required".to_string()));
        }
        let recovery_instant = non_empty(self.recovery_instant)
            .map(|s| parse_timestamp(&s))
            .transpose()?;

        Ok(RestoreOptions {
            source_namespace: self.source_env,
            source_cluster: non_empty(self.source_cluster),
            target_namespace: non_empty(self.target_env),
            target_cluster: non_empty(self.target_cluster),
            backup_name: non_empty(self.backup_name),
            recovery_instant,
            create_namespace: self.create_namespace,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// `GET /backups?env=`
pub async fn list_backups(
    State(state): State<AppState>,
    Query(q): Query<EnvQuery>,
) -> Json<Vec<BackupListing>> {
    Json(state.workflow.list_backups(&q.env).await)
}

/// `GET /namespace/check?env=&cluster=`
pub async fn check_namespace(
    State(state): State<AppState>,
    Query(q): Query<NamespaceQuery>,
) -> Result<Json<NamespaceCheck>> {
    let check = state
        .workflow
        .check_namespace(&q.env, q.cluster.as_deref())
        .await?;
    Ok(Json(check))
}

/// `POST /namespace/create`
pub async fn create_namespace(
    State(state): State<AppState>,
    Json(req): Json<CreateNamespaceRequest>,
) -> Result<(StatusCode, Json<CreateNamespaceResponse>)> {
    state.workflow.create_namespace(&req.env).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateNamespaceResponse { env: req.env }),
    ))
}

/// `POST /restore`
pub async fn start_restore(
    State(state): State<AppState>,
    Json(req): Json<RestoreRequest>,
) -> Result<(StatusCode, Json<RestoreSubmission>)> {
    let opts = req.into_options()?;
    let submission = state.workflow.execute(&opts).await?;
    info!(
        job = %submission.restore_job_id,
        namespace = %submission.target_namespace,
        cluster = %submission.target_cluster_name,
        "restore started via API"
    );
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

/// `POST /restore/plan`
pub async fn plan_restore(
    State(state): State<AppState>,
    Json(req): Json<RestoreRequest>,
) -> Result<Json<RestorePlan>> {
    let opts = req.into_options()?;
    Ok(Json(state.workflow.plan(&opts).await?))
}

/// `GET /restore/status?env=&name=`
pub async fn restore_status(
    State(state): State<AppState>,
    Query(q): Query<JobQuery>,
) -> Result<Json<JobStatus>> {
    Ok(Json(state.workflow.restore_status(&q.env, &q.name).await?))
}

/// `GET /restore/summary?env=&cluster=`
pub async fn restore_summary(
    State(state): State<AppState>,
    Query(q): Query<ClusterQuery>,
) -> Result<Json<DatabaseSummary>> {
    Ok(Json(state.workflow.summary(&q.env, &q.cluster).await?))
}

/// `GET /cluster/status?env=&cluster=`
pub async fn cluster_status(
    State(state): State<AppState>,
    Query(q): Query<ClusterQuery>,
) -> Result<Json<ClusterStatus>> {
    Ok(Json(state.workflow.cluster_status(&q.env, &q.cluster).await?))
}

//! CLI commands

pub mod backups;
pub mod format;
pub mod restore;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use rewind_common::kube_utils::create_client;
use rewind_restore::{KubeClient, KubeClientImpl};

use crate::Result;

/// Kubeconfig resolution overrides
#[derive(Args, Debug, Clone, Default)]
pub struct KubeArgs {
    /// Path to kubeconfig file (default: $KUBECONFIG or ~/.kube/config)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,
}

impl KubeArgs {
    /// Build the orchestration API client
    pub async fn client(&self) -> Result<Arc<dyn KubeClient>> {
        let client = create_client(self.kubeconfig.as_deref(), self.context.as_deref()).await?;
        Ok(Arc::new(KubeClientImpl::new(client)))
    }
}

/// Output format for command results
#[derive(Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Columnar table (default)
    #[default]
    Table,
    /// JSON
    Json,
    /// YAML
    Yaml,
}

/// Print `value` as JSON or YAML; returns false for table output
pub fn print_structured<T: Serialize>(value: &T, output: &OutputFormat) -> Result<bool> {
    match output {
        OutputFormat::Table => Ok(false),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(true)
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
            Ok(true)
        }
    }
}

/// Token cancelled on Ctrl+C so waits stop at the next poll
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted; a submitted restore keeps running in the cluster");
                trigger.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
        }
    });
    token
}

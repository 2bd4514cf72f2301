//! Rewind operator - standby restore controller and restore API server

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use rewind_api::{start_server, AppState, ServerConfig};
use rewind_common::kube_utils::create_client;
use rewind_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use rewind_operator::config::{ControllerArgs, KubeArgs, ServeArgs};
use rewind_operator::shutdown::shutdown_token;
use rewind_operator::{Cli, Commands};
use rewind_restore::{KubeClient, KubeClientImpl, RestoreWorkflow, StandbyController};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig {
        service_name: "rewind-operator".to_string(),
        format: LogFormat::Json,
    })?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Controller(args) => run_controller(&cli.kube, args).await,
        Commands::Serve(args) => run_server(&cli.kube, args).await,
    }
}

async fn kube_client(args: &KubeArgs) -> anyhow::Result<Arc<dyn KubeClient>> {
    let client = create_client(args.kubeconfig.as_deref(), args.context.as_deref())
        .await
        .context("failed to create Kubernetes client")?;
    Ok(Arc::new(KubeClientImpl::new(client)))
}

async fn run_controller(kube: &KubeArgs, args: ControllerArgs) -> anyhow::Result<()> {
    let client = kube_client(kube).await?;
    let config = args.standby_config();
    info!(
        source = %config.source_namespace,
        target = %format!("{}/{}", config.target_namespace, config.target_cluster),
        cycle_interval_secs = config.cycle_interval.as_secs(),
        "Starting standby controller"
    );

    let controller = StandbyController::new(client, config).with_poll_interval(args.poll_interval);
    controller.run(shutdown_token()).await;

    info!("Standby controller stopped");
    Ok(())
}

async fn run_server(kube: &KubeArgs, args: ServeArgs) -> anyhow::Result<()> {
    let client = kube_client(kube).await?;
    let workflow = RestoreWorkflow::new(client)
        .with_restore_timeout(args.restore_timeout)
        .with_poll_interval(args.poll_interval);

    start_server(
        ServerConfig {
            addr: args.listen_addr,
        },
        AppState::new(workflow),
        shutdown_token(),
    )
    .await?;
    Ok(())
}

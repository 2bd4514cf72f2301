//! Command-line and environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use rewind_common::time::parse_duration;
use rewind_restore::{
    StandbyConfig, DEFAULT_CYCLE_INTERVAL, DEFAULT_POLL_INTERVAL, DEFAULT_RESTORE_TIMEOUT,
};

/// Rewind - point-in-time restore orchestration for PXC clusters
#[derive(Parser, Debug)]
#[command(name = "rewind-operator", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub kube: KubeArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Kubeconfig resolution overrides
#[derive(Args, Debug, Clone, Default)]
pub struct KubeArgs {
    /// Path to kubeconfig file (default: in-cluster, $KUBECONFIG or ~/.kube/config)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Keep a standby cluster restored to the newest source backup
    Controller(ControllerArgs),
    /// Serve the interactive restore API
    Serve(ServeArgs),
}

/// Standby controller settings
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Environment whose backups are restored
    #[arg(long, env = "REWIND_SOURCE_NAMESPACE")]
    pub source_namespace: String,

    /// Only follow backups of this source cluster
    #[arg(long, env = "REWIND_SOURCE_CLUSTER")]
    pub source_cluster: Option<String>,

    /// Environment holding the standby cluster
    #[arg(long, env = "REWIND_TARGET_NAMESPACE")]
    pub target_namespace: String,

    /// Standby cluster restored into
    #[arg(long, env = "REWIND_TARGET_CLUSTER")]
    pub target_cluster: String,

    /// Pause between reconciliation cycles
    #[arg(long, env = "REWIND_CYCLE_INTERVAL", value_parser = parse_duration, default_value = "5m")]
    pub cycle_interval: Duration,

    /// Upper bound on one restore attempt
    #[arg(long, env = "REWIND_RESTORE_TIMEOUT", value_parser = parse_duration, default_value = "2h")]
    pub restore_timeout: Duration,

    /// Interval between restore job polls
    #[arg(long, env = "REWIND_POLL_INTERVAL", value_parser = parse_duration, default_value = "10s")]
    pub poll_interval: Duration,
}

impl ControllerArgs {
    /// Controller configuration from the parsed flags
    pub fn standby_config(&self) -> StandbyConfig {
        StandbyConfig {
            source_cluster: self.source_cluster.clone(),
            cycle_interval: self.cycle_interval,
            restore_timeout: self.restore_timeout,
            ..StandbyConfig::new(
                &self.source_namespace,
                &self.target_namespace,
                &self.target_cluster,
            )
        }
    }
}

/// API server settings
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "REWIND_LISTEN_ADDR", default_value = rewind_api::DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    /// Upper bound on waiting for a restore job
    #[arg(long, env = "REWIND_RESTORE_TIMEOUT", value_parser = parse_duration, default_value = "2h")]
    pub restore_timeout: Duration,

    /// Interval between restore job and readiness polls
    #[arg(long, env = "REWIND_POLL_INTERVAL", value_parser = parse_duration, default_value = "10s")]
    pub poll_interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_library() {
        let cli = Cli::try_parse_from([
            "rewind-operator",
            "controller",
            "--source-namespace",
            "prod",
            "--target-namespace",
            "standby",
            "--target-cluster",
            "standby1",
        ])
        .unwrap();

        let Commands::Controller(args) = cli.command else {
            panic!("expected controller subcommand");
        };
        assert_eq!(args.cycle_interval, DEFAULT_CYCLE_INTERVAL);
        assert_eq!(args.restore_timeout, DEFAULT_RESTORE_TIMEOUT);
        assert_eq!(args.poll_interval, DEFAULT_POLL_INTERVAL);

        let config = args.standby_config();
        assert_eq!(config.source_namespace, "prod");
        assert_eq!(config.target_cluster, "standby1");
        assert_eq!(config.source_cluster, None);
    }

    #[test]
    fn test_durations_and_kube_overrides() {
        let cli = Cli::try_parse_from([
            "rewind-operator",
            "--context",
            "prod-admin",
            "controller",
            "--source-namespace",
            "prod",
            "--source-cluster",
            "cluster1",
            "--target-namespace",
            "standby",
            "--target-cluster",
            "standby1",
            "--cycle-interval",
            "30s",
            "--restore-timeout",
            "1h",
        ])
        .unwrap();

        assert_eq!(cli.kube.context.as_deref(), Some("prod-admin"));
        let Commands::Controller(args) = cli.command else {
            panic!("expected controller subcommand");
        };
        let config = args.standby_config();
        assert_eq!(config.cycle_interval, Duration::from_secs(30));
        assert_eq!(config.restore_timeout, Duration::from_secs(3600));
        assert_eq!(config.source_cluster.as_deref(), Some("cluster1"));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let result = Cli::try_parse_from([
            "rewind-operator",
            "serve",
            "--poll-interval",
            "soon",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["rewind-operator", "serve"]).unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve subcommand");
        };
        assert_eq!(args.listen_addr.port(), 8080);
    }
}

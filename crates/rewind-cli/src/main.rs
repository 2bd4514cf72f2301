//! Rewind CLI
//!
//! Attended point-in-time restores of PXC clusters into new environments.

use clap::Parser;

use rewind_cli::{Cli, Result};
use rewind_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(TelemetryConfig {
        service_name: "rewind-cli".to_string(),
        format: LogFormat::Pretty,
    })?;

    let cli = Cli::parse();
    cli.run().await
}

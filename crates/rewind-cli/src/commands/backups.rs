//! `rewind backups` - list backups of an environment with their recovery windows

use clap::Args;

use rewind_restore::workflow::BackupListing;
use rewind_restore::RestoreWorkflow;

use super::format::{format_age, print_table, timestamp_cell};
use super::{print_structured, KubeArgs, OutputFormat};
use crate::Result;

/// List backups
#[derive(Args, Debug)]
pub struct BackupsArgs {
    /// Environment (namespace) holding the backups
    #[arg(long)]
    pub env: String,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

/// Run the backups command.
pub async fn run(kube: &KubeArgs, args: BackupsArgs) -> Result<()> {
    let workflow = RestoreWorkflow::new(kube.client().await?);
    let listings = workflow.list_backups(&args.env).await;

    if print_structured(&listings, &args.output)? {
        return Ok(());
    }
    if listings.is_empty() {
        println!("No backups found in {}.", args.env);
        return Ok(());
    }
    print_table(
        &[
            "NAME",
            "CLUSTER",
            "STATE",
            "COMPLETED",
            "AGE",
            "STORAGE",
            "RESTORABLE WINDOW",
            "DESTINATION",
        ],
        &backup_rows(&listings),
    );
    Ok(())
}

fn backup_rows(listings: &[BackupListing]) -> Vec<Vec<String>> {
    listings
        .iter()
        .map(|l| {
            let r = &l.record;
            let window = match (l.window_start, l.window_end) {
                (Some(start), Some(end)) if l.point_in_time_available => format!(
                    "{} - {}",
                    timestamp_cell(Some(&start)),
                    timestamp_cell(Some(&end))
                ),
                (Some(start), _) => format!(
                    "{} only (point-in-time unavailable)",
                    timestamp_cell(Some(&start))
                ),
                _ => "-".to_string(),
            };
            vec![
                r.name.clone(),
                r.cluster.clone(),
                r.state.to_string(),
                timestamp_cell(r.completed_at.as_ref()),
                r.completed_at
                    .as_ref()
                    .map(format_age)
                    .unwrap_or_else(|| "-".to_string()),
                r.storage_name.clone().unwrap_or_else(|| "-".to_string()),
                window,
                r.destination.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect()
}

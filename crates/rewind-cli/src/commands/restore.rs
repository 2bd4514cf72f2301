//! `rewind restore` - restore an environment's database to a point in time
//!
//! Clones the source cluster into a new cluster in the target environment,
//! restores the chosen backup to the requested instant, waits for the cluster
//! to become ready, and prints a database summary. `--dry-run` performs every
//! check and prints the planned changes without making them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Args;

use rewind_common::time::{format_timestamp, parse_duration, parse_timestamp};
use rewind_restore::{
    DatabaseSummary, RestoreOptions, RestorePlan, RestoreReport, RestoreWorkflow,
};

use super::format::print_table;
use super::{interrupt_token, print_structured, KubeArgs, OutputFormat};
use crate::{Error, Result};

/// Restore to a point in time
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Environment (namespace) holding the source cluster and its backups
    #[arg(long)]
    pub source_env: String,

    /// Source cluster (default: the only cluster in the source environment)
    #[arg(long)]
    pub source_cluster: Option<String>,

    /// Environment to restore into (default: the source environment)
    #[arg(long)]
    pub target_env: Option<String>,

    /// Name of the new cluster (default: <source>-<YYYYMMDDHHMM>)
    #[arg(long)]
    pub target_cluster: Option<String>,

    /// Backup to restore (default: newest backup covering the instant)
    #[arg(long)]
    pub backup: Option<String>,

    /// UTC instant to restore to, "YYYY-MM-DD HH:MM:SS" (default: latest restorable)
    #[arg(long, value_parser = parse_timestamp)]
    pub recovery_instant: Option<DateTime<Utc>>,

    /// Create the target environment if it does not exist
    #[arg(long)]
    pub create_namespace: bool,

    /// Validate and print the planned changes without making them
    #[arg(long)]
    pub dry_run: bool,

    /// Upper bound on waiting for the restore job
    #[arg(long, value_parser = parse_duration, default_value = "2h")]
    pub timeout: Duration,

    /// Upper bound on waiting for the restored cluster to become ready
    #[arg(long, value_parser = parse_duration, default_value = "30m")]
    pub ready_timeout: Duration,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

impl RestoreArgs {
    /// Workflow options from the parsed flags
    pub fn options(&self) -> RestoreOptions {
        RestoreOptions {
            source_namespace: self.source_env.clone(),
            source_cluster: self.source_cluster.clone(),
            target_namespace: self.target_env.clone(),
            target_cluster: self.target_cluster.clone(),
            backup_name: self.backup.clone(),
            recovery_instant: self.recovery_instant,
            create_namespace: self.create_namespace,
        }
    }
}

/// Run the restore command.
pub async fn run(kube: &KubeArgs, args: RestoreArgs) -> Result<()> {
    let workflow = RestoreWorkflow::new(kube.client().await?)
        .with_restore_timeout(args.timeout)
        .with_ready_timeout(args.ready_timeout);
    let opts = args.options();

    if args.dry_run {
        let plan = workflow.plan(&opts).await?;
        if !print_structured(&plan, &args.output)? {
            print_plan(&plan);
        }
        return match plan.blockers.first() {
            Some(first) => Err(Error::Blocked {
                count: plan.blockers.len(),
                first: first.to_string(),
            }),
            None => Ok(()),
        };
    }

    let report = workflow.run(&opts, &interrupt_token()).await?;
    if !print_structured(&report, &args.output)? {
        print_report(&report);
    }
    Ok(())
}

fn print_plan(plan: &RestorePlan) {
    println!(
        "Restore {}/{} -> {}/{}",
        plan.source_namespace, plan.source_cluster, plan.target_namespace, plan.target_cluster
    );
    println!(
        "Backup {} at {} (window {})",
        plan.backup.name,
        format_timestamp(&plan.recovery_instant),
        plan.window
    );
    println!();

    let checks: Vec<Vec<String>> = plan
        .checks
        .iter()
        .map(|c| {
            vec![
                if c.passed { "ok" } else { "FAIL" }.to_string(),
                c.name.clone(),
                c.detail.clone(),
            ]
        })
        .collect();
    print_table(&["RESULT", "CHECK", "DETAIL"], &checks);
    println!();

    if plan.is_blocked() {
        println!("Nothing would be changed: {} check(s) failed.", plan.blockers.len());
        return;
    }

    println!("Would create:");
    let actions: Vec<Vec<String>> = plan
        .actions
        .iter()
        .map(|a| {
            vec![
                a.kind.clone(),
                if a.namespace.is_empty() { "-".to_string() } else { a.namespace.clone() },
                a.name.clone(),
                a.detail.clone(),
            ]
        })
        .collect();
    print_table(&["KIND", "NAMESPACE", "NAME", "DETAIL"], &actions);
}

fn print_report(report: &RestoreReport) {
    let s = &report.submission;
    println!(
        "Restored {} to {} in {}/{} (job {})",
        s.backup_name,
        format_timestamp(&s.recovery_instant),
        s.target_namespace,
        s.target_cluster_name,
        s.restore_job_id
    );
    for warning in &s.clone.warnings {
        println!("warning: {}", warning);
    }
    println!();
    print_table(&["DATABASE", "TABLES"], &summary_rows(&report.summary));
    println!(
        "{} database(s), {} table(s)",
        report.summary.total_databases, report.summary.total_tables
    );
}

fn summary_rows(summary: &DatabaseSummary) -> Vec<Vec<String>> {
    summary
        .databases
        .iter()
        .map(|d| vec![d.name.clone(), d.tables.to_string()])
        .collect()
}

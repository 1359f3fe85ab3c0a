use crate::commands::migrate::common::{open_targets, registry_for};
use crate::config::Config;
use crate::db::close_all;
use crate::executor::{ApplyPolicy, ExecutionReport, ForwardExecutor};
use crate::progress::ExecutionReporter;
use anyhow::Result;
use tracing::debug;

/// Apply pending migrations on every target connection.
/// `limit` caps how many versions each connection moves forward (the `up` command uses 1).
pub async fn cmd_migrate_apply(
    config: &Config,
    connections: &[String],
    policy: ApplyPolicy,
    limit: Option<usize>,
    verbose: bool,
) -> Result<ExecutionReport> {
    if !config.directories.migrations.exists() {
        println!("No migrations directory found - nothing to apply");
        return Ok(ExecutionReport::default());
    }

    let targets = open_targets(config, connections).await?;
    let registry = registry_for(config);

    let mut executor =
        ForwardExecutor::new(&registry, &config.migration.tracking_table, policy);
    if let Some(limit) = limit {
        executor = executor.with_limit(limit);
    }

    println!(
        "Applying migrations to {} connection(s){}",
        targets.len(),
        match policy {
            ApplyPolicy::Fake => " (fake: tracking table only)",
            ApplyPolicy::Force => " (force: continuing past failures)",
            ApplyPolicy::Abort => "",
        }
    );
    debug!("Migrations directory: {}", registry.directory().display());

    let reporter = ExecutionReporter::start(verbose);
    let result = executor.apply_pending(&targets).await;
    close_all(&targets).await;
    let report = result?;

    reporter.print_steps(&report);
    if report.completed.is_empty() && report.succeeded() {
        println!("All connections are up to date");
    } else {
        reporter.print_summary(&report, "Applied");
    }

    Ok(report.into_result()?)
}

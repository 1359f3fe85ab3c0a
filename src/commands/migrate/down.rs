use crate::commands::migrate::common::{open_targets, registry_for};
use crate::config::Config;
use crate::db::close_all;
use crate::error::MigrationError;
use crate::executor::{ApplyPolicy, RollbackExecutor, RollbackPlan, plan_rollback};
use crate::progress::ExecutionReporter;
use anyhow::Result;

/// How a `down` invocation ended, when it did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownOutcome {
    /// The latest version was reversed; `remaining` more can still be reversed
    Reverted { version: u64, remaining: usize },
    /// No connection has any applied version
    NothingToReverse,
}

pub async fn cmd_migrate_down(
    config: &Config,
    connections: &[String],
    policy: ApplyPolicy,
    verbose: bool,
) -> Result<DownOutcome> {
    let targets = open_targets(config, connections).await?;
    let tracking_table = &config.migration.tracking_table;

    let plan = match plan_rollback(&targets, tracking_table, policy).await {
        Ok(plan) => plan,
        Err(MigrationError::NothingToReverse) => {
            close_all(&targets).await;
            println!("{}", MigrationError::NothingToReverse);
            return Ok(DownOutcome::NothingToReverse);
        }
        Err(e) => {
            close_all(&targets).await;
            return Err(e.into());
        }
    };

    let registry = registry_for(config);
    let executor = RollbackExecutor::new(&registry, tracking_table, policy);

    let reporter = ExecutionReporter::start(verbose);
    let result = executor
        .execute_rollback_to_previous_version(&targets, plan.current, plan.previous)
        .await;
    close_all(&targets).await;
    let report = result?;

    reporter.print_steps(&report);
    if !report.succeeded() {
        reporter.print_summary(&report, "Reverted");
    }
    report.into_result()?;

    println!("{}", completion_message(&plan));

    Ok(DownOutcome::Reverted {
        version: plan.current,
        remaining: plan.remaining,
    })
}

/// `remaining` does not count `previous`, so a newly current version is named separately
fn completion_message(plan: &RollbackPlan) -> String {
    let mut message = if plan.remaining > 0 {
        format!(
            "Reverse migration complete. {} more migrations available for reverse.",
            plan.remaining
        )
    } else {
        "Reverse migration complete. No more migrations available for reverse.".to_string()
    };
    if let Some(previous) = plan.previous {
        message.push_str(&format!(
            "\nVersion {} is now current; `migrate down` reverses it next.",
            previous
        ));
    }
    message
}

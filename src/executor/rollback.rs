use crate::config::types::TrackingTable;
use crate::db::TargetConnection;
use crate::error::{MigrationError, MigrationResult};
use crate::executor::{
    ApplyPolicy, Direction, ExecutionReport, StepFailure, StepStatus, run_step,
};
use crate::migration::{MigrationRegistry, ensure_unique_versions};
use crate::migration_tracking::get_applied_versions;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{error, info, warn};

/// Which version a rollback reverses, derived from the applied history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RollbackPlan {
    /// Most recently applied version; the one that gets reversed
    pub current: u64,
    /// Version that becomes current afterwards, if any
    pub previous: Option<u64>,
    /// Versions still reversible after `previous`
    pub remaining: usize,
}

impl RollbackPlan {
    /// Build a plan from the applied versions, in any order.
    /// Returns None when nothing was ever applied.
    pub fn from_history(history: &BTreeSet<u64>) -> Option<Self> {
        let mut versions = history.iter().rev();
        let current = *versions.next()?;
        let previous = versions.next().copied();
        Some(Self {
            current,
            previous,
            remaining: history.len().saturating_sub(2),
        })
    }
}

/// Applied versions read from every connection
#[derive(Debug, Clone, Default)]
pub struct AppliedHistory {
    /// Union of the readable connections, sorted
    pub versions: BTreeSet<u64>,
    pub per_connection: HashMap<String, BTreeSet<u64>>,
    /// Connections whose tracking table could not be read, with the error.
    /// Only filled under `--force`; otherwise the first error is returned.
    pub unreadable: BTreeMap<String, String>,
}

impl AppliedHistory {
    pub fn failures(&self) -> Vec<StepFailure> {
        self.unreadable
            .iter()
            .map(|(connection, message)| StepFailure {
                connection: connection.clone(),
                version: None,
                message: message.clone(),
            })
            .collect()
    }
}

pub async fn applied_history(
    connections: &[TargetConnection],
    tracking_table: &TrackingTable,
    policy: ApplyPolicy,
) -> MigrationResult<AppliedHistory> {
    let mut history = AppliedHistory::default();
    for connection in connections {
        match get_applied_versions(connection, tracking_table).await {
            Ok(applied) => {
                let applied: BTreeSet<u64> = applied.into_iter().collect();
                history.versions.extend(applied.iter().copied());
                history
                    .per_connection
                    .insert(connection.name().to_string(), applied);
            }
            Err(e) if policy.continues_after_failure() => {
                warn!("Skipping '{}': {}", connection.name(), e);
                history
                    .unreadable
                    .insert(connection.name().to_string(), e.to_string());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(history)
}

/// Work out what `down` would reverse without touching anything
pub async fn plan_rollback(
    connections: &[TargetConnection],
    tracking_table: &TrackingTable,
    policy: ApplyPolicy,
) -> MigrationResult<RollbackPlan> {
    let history = applied_history(connections, tracking_table, policy).await?;
    match RollbackPlan::from_history(&history.versions) {
        Some(plan) => Ok(plan),
        None if history.unreadable.is_empty() => Err(MigrationError::NothingToReverse),
        None => Err(MigrationError::PartialFailure {
            failures: history.failures(),
        }),
    }
}

/// Reverses the most recently applied version on every connection that has it
pub struct RollbackExecutor<'a> {
    registry: &'a MigrationRegistry,
    tracking_table: &'a TrackingTable,
    policy: ApplyPolicy,
}

impl<'a> RollbackExecutor<'a> {
    pub fn new(
        registry: &'a MigrationRegistry,
        tracking_table: &'a TrackingTable,
        policy: ApplyPolicy,
    ) -> Self {
        Self {
            registry,
            tracking_table,
            policy,
        }
    }

    /// Run the down script of `current` on each connection where it is applied.
    /// `previous` only appears in logs.
    pub async fn execute_rollback_to_previous_version(
        &self,
        connections: &[TargetConnection],
        current: u64,
        previous: Option<u64>,
    ) -> MigrationResult<ExecutionReport> {
        let history = applied_history(connections, self.tracking_table, self.policy).await?;

        // Only load the file when a script will actually run
        let unit = if self.policy.runs_scripts() {
            let migrations = self.registry.list()?;
            ensure_unique_versions(&migrations)?;
            Some(self.registry.load(current)?)
        } else {
            None
        };

        match previous {
            Some(previous) => info!("Reverting version {} (back to {})", current, previous),
            None => info!("Reverting version {} (no earlier version applied)", current),
        }

        let mut report = ExecutionReport::default();
        for connection in connections {
            if let Some(message) = history.unreadable.get(connection.name()) {
                report.record_failure(connection, None, message.clone());
                continue;
            }

            let has_current = history
                .per_connection
                .get(connection.name())
                .is_some_and(|applied| applied.contains(&current));
            if !has_current {
                warn!(
                    "Version {} is not applied on '{}'; skipping",
                    current,
                    connection.name()
                );
                report.record(connection, current, StepStatus::Skipped);
                continue;
            }

            let (status, script) = match &unit {
                Some(unit) => (StepStatus::Reverted, unit.down_script(connection.name())),
                None => (StepStatus::Faked, None),
            };

            match run_step(connection, self.tracking_table, current, Direction::Down, script).await {
                Ok(()) => {
                    info!("Reverted version {} on '{}'", current, connection.name());
                    report.record(connection, current, status);
                }
                Err(message) => {
                    report.record_failure(connection, Some(current), message);
                    if self.policy.continues_after_failure() {
                        warn!(
                            "Version {} is still applied on '{}'; continuing (--force)",
                            current,
                            connection.name()
                        );
                        continue;
                    }
                    error!(
                        "Stopping: reverting version {} failed on '{}'",
                        current,
                        connection.name()
                    );
                    report.aborted = true;
                    return Ok(report);
                }
            }
        }

        Ok(report)
    }
}

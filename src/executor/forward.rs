use crate::config::types::TrackingTable;
use crate::db::TargetConnection;
use crate::error::MigrationResult;
use crate::executor::{ApplyPolicy, Direction, ExecutionReport, StepStatus, run_step};
use crate::migration::{
    MigrationRegistry, MigrationSummary, MigrationUnit, ensure_unique_versions, load_unit,
};
use crate::migration_tracking::{ensure_tracking_table_exists, get_applied_versions};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Applies pending migrations, oldest first, on every connection
pub struct ForwardExecutor<'a> {
    registry: &'a MigrationRegistry,
    tracking_table: &'a TrackingTable,
    policy: ApplyPolicy,
    limit: Option<usize>,
}

/// Versions above the connection's current maximum, ascending
pub fn pending_migrations<'m>(
    migrations: &'m [MigrationSummary],
    applied: &[u64],
) -> Vec<&'m MigrationSummary> {
    let current = applied.iter().max().copied();
    migrations
        .iter()
        .filter(|m| current.is_none_or(|c| m.version > c))
        .collect()
}

impl<'a> ForwardExecutor<'a> {
    pub fn new(
        registry: &'a MigrationRegistry,
        tracking_table: &'a TrackingTable,
        policy: ApplyPolicy,
    ) -> Self {
        Self {
            registry,
            tracking_table,
            policy,
            limit: None,
        }
    }

    /// Apply at most `limit` pending versions per connection
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub async fn apply_pending(
        &self,
        connections: &[TargetConnection],
    ) -> MigrationResult<ExecutionReport> {
        let migrations = self.registry.list()?;
        ensure_unique_versions(&migrations)?;

        let mut units: HashMap<u64, MigrationUnit> = HashMap::new();
        let mut report = ExecutionReport::default();

        for connection in connections {
            let applied = match self.applied_versions(connection).await {
                Ok(applied) => applied,
                Err(e) => {
                    if self.policy.continues_after_failure() {
                        warn!("Skipping '{}': {}", connection.name(), e);
                        report.record_failure(connection, None, e.to_string());
                        continue;
                    }
                    return Err(e);
                }
            };

            let mut pending = pending_migrations(&migrations, &applied);
            if let Some(limit) = self.limit {
                pending.truncate(limit);
            }
            if pending.is_empty() {
                info!("'{}' is up to date", connection.name());
                continue;
            }
            info!(
                "Applying {} migration(s) on '{}'",
                pending.len(),
                connection.name()
            );

            for summary in pending {
                let version = summary.version;

                let (status, script) = if self.policy.runs_scripts() {
                    if !units.contains_key(&version) {
                        units.insert(version, load_unit(summary)?);
                    }
                    let script = units
                        .get(&version)
                        .and_then(|unit| unit.up_script(connection.name()));
                    (StepStatus::Applied, script)
                } else {
                    (StepStatus::Faked, None)
                };

                match run_step(connection, self.tracking_table, version, Direction::Up, script).await {
                    Ok(()) => {
                        info!("Applied version {} on '{}'", version, connection.name());
                        report.record(connection, version, status);
                    }
                    Err(message) => {
                        report.record_failure(connection, Some(version), message);
                        if self.policy.continues_after_failure() {
                            warn!(
                                "Version {} left unapplied on '{}'; continuing (--force)",
                                version,
                                connection.name()
                            );
                            continue;
                        }
                        error!(
                            "Stopping: version {} failed on '{}'",
                            version,
                            connection.name()
                        );
                        report.aborted = true;
                        return Ok(report);
                    }
                }
            }
        }

        Ok(report)
    }

    async fn applied_versions(&self, connection: &TargetConnection) -> MigrationResult<Vec<u64>> {
        ensure_tracking_table_exists(connection, self.tracking_table).await?;
        get_applied_versions(connection, self.tracking_table).await
    }
}

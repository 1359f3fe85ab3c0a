//! Running migration scripts against the resolved connections.
//!
//! Both executors work through connections and versions strictly in order. Every step
//! runs its script and the matching tracking-table change in one transaction, and each
//! step's result lands in an [`ExecutionReport`] so the command layer decides the exit code.

pub mod forward;
pub mod rollback;

pub use forward::ForwardExecutor;
pub use rollback::{
    AppliedHistory, RollbackExecutor, RollbackPlan, applied_history, plan_rollback,
};

use crate::config::types::TrackingTable;
use crate::db::TargetConnection;
use crate::db::error_context::ScriptErrorContext;
use crate::error::{MigrationError, MigrationResult};
use crate::migration_tracking::{mark_applied, mark_reverted};
use serde::Serialize;
use tracing::{debug, error};

/// How failures and script execution are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyPolicy {
    /// Stop at the first failing step
    #[default]
    Abort,
    /// Log failures and keep going
    Force,
    /// Only update the tracking table; never run scripts
    Fake,
}

impl ApplyPolicy {
    /// `--fake` wins over `--force`: nothing runs, so nothing can fail halfway.
    pub fn from_flags(fake: bool, force: bool) -> Self {
        match (fake, force) {
            (true, _) => Self::Fake,
            (false, true) => Self::Force,
            (false, false) => Self::Abort,
        }
    }

    pub fn runs_scripts(&self) -> bool {
        !matches!(self, Self::Fake)
    }

    pub fn continues_after_failure(&self) -> bool {
        matches!(self, Self::Force)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// A step that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub connection: String,
    /// None when the connection failed before any version was attempted
    pub version: Option<u64>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Applied,
    Reverted,
    /// Tracking table updated without running the script
    Faked,
    /// Connection did not have the version applied
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub connection: String,
    pub version: u64,
    pub status: StepStatus,
}

/// Everything that happened during one executor run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub completed: Vec<StepOutcome>,
    pub failures: Vec<StepFailure>,
    /// Set when a failure stopped the run early
    pub aborted: bool,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Steps that changed the tracking table
    pub fn changed(&self) -> usize {
        self.completed
            .iter()
            .filter(|s| s.status != StepStatus::Skipped)
            .count()
    }

    fn record(&mut self, connection: &TargetConnection, version: u64, status: StepStatus) {
        self.completed.push(StepOutcome {
            connection: connection.name().to_string(),
            version,
            status,
        });
    }

    fn record_failure(
        &mut self,
        connection: &TargetConnection,
        version: Option<u64>,
        message: String,
    ) {
        self.failures.push(StepFailure {
            connection: connection.name().to_string(),
            version,
            message,
        });
    }

    /// Turn failed steps into a `PartialFailure` error
    pub fn into_result(self) -> MigrationResult<Self> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(MigrationError::PartialFailure {
                failures: self.failures,
            })
        }
    }
}

/// Run one script and its tracking change in a single transaction.
///
/// A missing or blank script only touches the tracking table. On failure the
/// transaction is rolled back and a one-line description is returned; the full
/// error context is logged here.
pub(crate) async fn run_step(
    connection: &TargetConnection,
    tracking_table: &TrackingTable,
    version: u64,
    direction: Direction,
    script: Option<&str>,
) -> Result<(), String> {
    let script = script.filter(|s| !s.trim().is_empty());

    if script.is_some() && !connection.adapter().supports_transactional_ddl() {
        debug!(
            "'{}' ({}) commits DDL implicitly; a failing script cannot be fully rolled back",
            connection.name(),
            connection.adapter()
        );
    }

    let mut tx = connection.pool().begin().await.map_err(|e| {
        let err = MigrationError::Script {
            connection: connection.name().to_string(),
            version,
            source: e,
        };
        error!("{}", err);
        err.to_string()
    })?;

    if let Some(script) = script {
        debug!(
            "Running {:?} script of version {} on '{}'",
            direction,
            version,
            connection.name()
        );
        if let Err(e) = sqlx::raw_sql(script).execute(&mut *tx).await {
            let context = ScriptErrorContext::from_sqlx_error(&e, script);
            error!(
                "{}",
                context.format(
                    &format!("Migration {} failed on '{}'", version, connection.name()),
                    script
                )
            );
            if let Err(rollback_err) = tx.rollback().await {
                error!(
                    "Rollback after failed migration {} on '{}' also failed: {}",
                    version,
                    connection.name(),
                    rollback_err
                );
            }
            return Err(context.summary());
        }
    }

    let tracked = match direction {
        Direction::Up => mark_applied(&mut *tx, connection, tracking_table, version).await,
        Direction::Down => mark_reverted(&mut *tx, connection, tracking_table, version).await,
    };
    if let Err(e) = tracked {
        error!("{}", e);
        if let Err(rollback_err) = tx.rollback().await {
            error!("Rollback on '{}' failed: {}", connection.name(), rollback_err);
        }
        return Err(e.to_string());
    }

    tx.commit().await.map_err(|e| {
        let err = MigrationError::Script {
            connection: connection.name().to_string(),
            version,
            source: e,
        };
        error!("{}", err);
        err.to_string()
    })
}

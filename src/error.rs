//! Error types shared by the registry, tracker, connection registry and executors.

use std::path::PathBuf;
use thiserror::Error;

use crate::executor::StepFailure;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// A required path or setting is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An explicit connection string could not be parsed.
    #[error("Malformed connection '{input}': {reason}")]
    MalformedConnection { input: String, reason: String },

    /// The migration directory or one of its files could not be read or written.
    #[error("Migration directory error at {}: {source}", path.display())]
    Registry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid migration file {}: {reason}", path.display())]
    InvalidMigrationFile { path: PathBuf, reason: String },

    #[error("No migration file found for version {0}")]
    NotFound(u64),

    #[error("Migration version {version} is used by more than one file: {}", files.join(", "))]
    DuplicateVersion { version: u64, files: Vec<String> },

    #[error("Failed to connect to '{connection}' at {url}: {source}")]
    Connection {
        connection: String,
        url: String,
        #[source]
        source: sqlx::Error,
    },

    /// Reading or writing the tracking table failed.
    #[error("Tracking table {table} on '{connection}': {source}")]
    Tracking {
        connection: String,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// An up or down script failed to execute.
    #[error("Migration {version} failed on '{connection}': {source}")]
    Script {
        connection: String,
        version: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error("No migrations were ever executed on this database - nothing to reverse.")]
    NothingToReverse,

    /// One or more steps failed during apply or rollback.
    #[error("{} migration step(s) failed: {}", failures.len(), describe_failures(failures))]
    PartialFailure { failures: Vec<StepFailure> },
}

impl MigrationError {
    pub fn malformed(input: &str, reason: impl Into<String>) -> Self {
        Self::MalformedConnection {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidMigrationFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

fn describe_failures(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(|f| match f.version {
            Some(version) => format!("version {} on '{}' ({})", version, f.connection, f.message),
            None => format!("'{}' ({})", f.connection, f.message),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub type MigrationResult<T> = Result<T, MigrationError>;

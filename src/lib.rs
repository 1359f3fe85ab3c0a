pub mod commands;
pub mod config;
pub mod connections;
pub mod constants;
pub mod db;
pub mod error;
pub mod executor;
pub mod migration;
pub mod migration_tracking;
pub mod progress;

pub use error::{MigrationError, MigrationResult};

pub mod builder;
pub mod parsing;
pub mod registry;

pub use builder::{
    NewMigration, build_body, build_file_name, create_migration_file, current_version,
    same_version_files, validate_suffix,
};
pub use parsing::{MigrationSummary, discover_migrations, parse_migration_filename};
pub use registry::{MigrationRegistry, ensure_unique_versions, load_unit};

use std::collections::BTreeMap;
use std::path::PathBuf;

/// A migration file loaded with its scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    pub path: PathBuf,
    pub version: u64,
    pub suffix: Option<String>,
    pub comment: String,
    pub up: BTreeMap<String, String>,
    pub down: BTreeMap<String, String>,
}

impl MigrationUnit {
    pub fn up_script(&self, database: &str) -> Option<&str> {
        self.up.get(database).map(String::as_str)
    }

    pub fn down_script(&self, database: &str) -> Option<&str> {
        self.down.get(database).map(String::as_str)
    }
}

use crate::connections::ConnectionDescriptor;
use crate::error::{MigrationError, MigrationResult};
use crate::executor::ApplyPolicy;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Raw configuration input - all fields Optional for merging
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigInput {
    pub databases: Option<DatabasesInput>,
    pub directories: Option<DirectoriesInput>,
    pub migration: Option<MigrationInput>,
}

/// Resolved configuration with all defaults applied
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub databases: Databases,
    pub directories: Directories,
    pub migration: Migration,
}

// Database configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabasesInput {
    pub connections: Option<BTreeMap<String, ConnectionInput>>,
    /// Restricts which configured connections migration commands use
    pub build_connections: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConnectionInput {
    pub dsn: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Configured connections, kept unparsed until a command needs them so that
/// explicit `--connection` values work even when an entry here is broken
#[derive(Debug, Clone, Default)]
pub struct Databases {
    pub connections: BTreeMap<String, ConnectionInput>,
    pub build_connections: Option<Vec<String>>,
}

impl Databases {
    /// Parse the build connections, sorted by name
    pub fn build_descriptors(&self) -> MigrationResult<Vec<ConnectionDescriptor>> {
        let selected: Vec<&String> = match &self.build_connections {
            Some(names) => {
                if let Some(unknown) = names.iter().find(|n| !self.connections.contains_key(*n)) {
                    return Err(MigrationError::Configuration(format!(
                        "build connection '{}' is not defined under databases.connections",
                        unknown
                    )));
                }
                names.iter().collect()
            }
            None => self.connections.keys().collect(),
        };

        let mut descriptors = Vec::with_capacity(selected.len());
        for name in selected {
            let input = &self.connections[name];
            let dsn = input.dsn.as_deref().ok_or_else(|| {
                MigrationError::Configuration(format!("connection '{}' has no dsn", name))
            })?;
            descriptors.push(ConnectionDescriptor::from_config(
                name,
                dsn,
                input.user.clone(),
                input.password.clone(),
            )?);
        }
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors.dedup_by(|a, b| a.name == b.name);

        Ok(descriptors)
    }
}

// Directory configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DirectoriesInput {
    pub schema_dir: Option<String>,
    pub migrations_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Directories {
    pub schema: PathBuf,
    pub migrations: PathBuf,
}

// Migration configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MigrationInput {
    pub table_name: Option<String>,
    pub filename_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub tracking_table: TrackingTable,
    pub filename_prefix: String,
}

/// Name of the table recording applied versions, optionally schema-qualified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingTable {
    pub schema: Option<String>,
    pub name: String,
}

impl TrackingTable {
    /// Accepts `migration` or `schema.migration`
    pub fn parse(value: &str) -> Self {
        match value.trim().split_once('.') {
            Some((schema, name)) => Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            None => Self {
                schema: None,
                name: value.trim().to_string(),
            },
        }
    }
}

impl std::fmt::Display for TrackingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

// CLI argument groups for command-specific options
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    #[arg(
        long = "connection",
        short = 'c',
        value_name = "NAME=DSN",
        help = "Connection to use, e.g. 'bookstore=mysql:host=127.0.0.1;dbname=test;user=root;password=foobar'. \
                Repeatable; replaces the configured connections"
    )]
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct DirectoryArgs {
    #[arg(long, help = "Directory where migration files are located")]
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct SchemaDirArgs {
    #[arg(long, help = "Directory where the schema files are placed")]
    pub schema_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct MigrationTableArgs {
    #[arg(long, help = "Migration tracking table name")]
    pub migration_table: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct PolicyArgs {
    #[arg(
        long,
        help = "Only update the migration table; do not run any SQL from the migration files"
    )]
    pub fake: bool,

    #[arg(long, help = "Continue with the remaining steps when one of them fails")]
    pub force: bool,
}

impl PolicyArgs {
    pub fn policy(&self) -> ApplyPolicy {
        ApplyPolicy::from_flags(self.fake, self.force)
    }
}

// Conversion functions from CLI args to config input
impl From<DirectoryArgs> for DirectoriesInput {
    fn from(args: DirectoryArgs) -> Self {
        Self {
            schema_dir: None,
            migrations_dir: args.output_dir,
        }
    }
}

impl From<MigrationTableArgs> for MigrationInput {
    fn from(args: MigrationTableArgs) -> Self {
        Self {
            table_name: args.migration_table,
            filename_prefix: None,
        }
    }
}

use crate::config::{merge::Merge, types::*};
use crate::error::MigrationResult;
use std::path::{Path, PathBuf};

pub struct ConfigBuilder {
    config_input: ConfigInput,
    /// Directories from the file resolve against `root_dir`, ones from the CLI against the cwd
    file_directories: Option<DirectoriesInput>,
    cli_directories: Option<DirectoriesInput>,
    root_dir: PathBuf,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config_input: ConfigInput::default(),
            file_directories: None,
            cli_directories: None,
            root_dir: PathBuf::from("."),
        }
    }

    pub fn with_file(mut self, file_input: ConfigInput) -> Self {
        self.file_directories = merge_directories(self.file_directories, &file_input);
        self.config_input = self.config_input.merge(file_input);
        self
    }

    pub fn with_cli_args(mut self, cli_input: ConfigInput) -> Self {
        self.cli_directories = merge_directories(self.cli_directories, &cli_input);
        self.config_input = self.config_input.merge(cli_input);
        self
    }

    /// Directory that relative paths in the configuration file are resolved against
    pub fn with_root_dir(mut self, root_dir: &Path) -> Self {
        self.root_dir = root_dir.to_path_buf();
        self
    }

    pub fn resolve(self) -> MigrationResult<Config> {
        let defaults = Config::default();

        Ok(Config {
            databases: self.resolve_databases(),
            directories: self.resolve_directories(&defaults.directories),
            migration: self.resolve_migration(&defaults.migration),
        })
    }

    fn resolve_databases(&self) -> Databases {
        let db_input = self.config_input.databases.as_ref();

        Databases {
            connections: db_input
                .and_then(|d| d.connections.clone())
                .unwrap_or_default(),
            build_connections: db_input.and_then(|d| d.build_connections.clone()),
        }
    }

    fn resolve_directories(&self, defaults: &Directories) -> Directories {
        Directories {
            schema: self.resolve_directory(|d| d.schema_dir.as_ref(), None, &defaults.schema),
            migrations: self.resolve_directory(
                |d| d.migrations_dir.as_ref(),
                Some("DBMT_MIGRATIONS_DIR"),
                &defaults.migrations,
            ),
        }
    }

    /// CLI value as given, then the file's value under `root_dir`, then the
    /// environment, then the default under `root_dir`
    fn resolve_directory(
        &self,
        pick: impl Fn(&DirectoriesInput) -> Option<&String>,
        env_var: Option<&str>,
        default: &Path,
    ) -> PathBuf {
        if let Some(dir) = self.cli_directories.as_ref().and_then(&pick) {
            return PathBuf::from(dir);
        }
        if let Some(dir) = self.file_directories.as_ref().and_then(&pick) {
            return self.root_dir.join(dir);
        }
        if let Some(dir) = env_var.and_then(|name| std::env::var(name).ok()) {
            return PathBuf::from(dir);
        }
        self.root_dir.join(default)
    }

    fn resolve_migration(&self, defaults: &Migration) -> Migration {
        let mig_input = self.config_input.migration.as_ref();

        let tracking_table = mig_input
            .and_then(|m| m.table_name.as_ref())
            .cloned()
            .or_else(|| std::env::var("DBMT_MIGRATION_TABLE").ok())
            .map(|name| TrackingTable::parse(&name))
            .unwrap_or_else(|| defaults.tracking_table.clone());

        Migration {
            tracking_table,
            filename_prefix: mig_input
                .and_then(|m| m.filename_prefix.as_ref())
                .cloned()
                .unwrap_or_else(|| defaults.filename_prefix.clone()),
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_directories(
    current: Option<DirectoriesInput>,
    input: &ConfigInput,
) -> Option<DirectoriesInput> {
    match (current, input.directories.clone()) {
        (Some(a), Some(b)) => Some(a.merge_with(b)),
        (a, b) => b.or(a),
    }
}

use crate::config::types::*;

/// Trait for merging optional configuration values
pub trait Merge<T> {
    fn merge(self, other: T) -> T;
}

impl<T> Merge<Option<T>> for Option<T> {
    fn merge(self, other: Option<T>) -> Option<T> {
        other.or(self)
    }
}

impl Merge<ConfigInput> for ConfigInput {
    fn merge(self, other: ConfigInput) -> ConfigInput {
        ConfigInput {
            databases: match (self.databases, other.databases) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(a), Some(b)) => Some(a.merge_with(b)),
            },
            directories: match (self.directories, other.directories) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(a), Some(b)) => Some(a.merge_with(b)),
            },
            migration: match (self.migration, other.migration) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(a), Some(b)) => Some(a.merge_with(b)),
            },
        }
    }
}

impl DatabasesInput {
    /// Connection maps are replaced, not combined entry by entry
    pub fn merge_with(self, other: DatabasesInput) -> DatabasesInput {
        DatabasesInput {
            connections: self.connections.merge(other.connections),
            build_connections: self.build_connections.merge(other.build_connections),
        }
    }
}

impl DirectoriesInput {
    pub fn merge_with(self, other: DirectoriesInput) -> DirectoriesInput {
        DirectoriesInput {
            schema_dir: self.schema_dir.merge(other.schema_dir),
            migrations_dir: self.migrations_dir.merge(other.migrations_dir),
        }
    }
}

impl MigrationInput {
    pub fn merge_with(self, other: MigrationInput) -> MigrationInput {
        MigrationInput {
            table_name: self.table_name.merge(other.table_name),
            filename_prefix: self.filename_prefix.merge(other.filename_prefix),
        }
    }
}

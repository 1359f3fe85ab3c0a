use crate::config::types::*;
use crate::constants::{DEFAULT_TRACKING_TABLE, MIGRATION_FILENAME_PREFIX};
use std::path::PathBuf;

impl Default for Directories {
    fn default() -> Self {
        Self {
            schema: PathBuf::from("schema"),
            migrations: PathBuf::from("migrations"),
        }
    }
}

impl Default for Migration {
    fn default() -> Self {
        Self {
            tracking_table: TrackingTable::default(),
            filename_prefix: MIGRATION_FILENAME_PREFIX.to_string(),
        }
    }
}

impl Default for TrackingTable {
    fn default() -> Self {
        Self {
            schema: None,
            name: DEFAULT_TRACKING_TABLE.to_string(),
        }
    }
}

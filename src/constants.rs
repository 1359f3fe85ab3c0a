use std::time::Duration;

// Migration file naming conventions
pub const MIGRATION_FILENAME_PREFIX: &str = "Migration";
pub const MIGRATION_FILE_EXTENSION: &str = "sql";

// Annotation comments inside migration files
pub const ANNOTATION_PREFIX: &str = "-- dbmt:";

// Tracking table defaults
pub const DEFAULT_TRACKING_TABLE: &str = "migration";

// Configuration file name
pub const CONFIG_FILENAME: &str = "dbmt.yaml";

// Connection retry defaults
pub const CONNECT_MAX_RETRIES: u32 = 5;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);
pub const CONNECT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

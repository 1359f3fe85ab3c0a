pub mod migrate;

// Re-export all command functions
pub use migrate::{
    CreateOptions, DownOutcome, StatusFormat, cmd_migrate_apply, cmd_migrate_create,
    cmd_migrate_down, cmd_migrate_status,
};

pub mod apply;
pub mod common;
pub mod create;
pub mod down;
pub mod status;

// Re-export all command functions
pub use apply::cmd_migrate_apply;
pub use create::{CreateOptions, cmd_migrate_create};
pub use down::{DownOutcome, cmd_migrate_down};
pub use status::{ConnectionStatus, StatusFormat, cmd_migrate_status};

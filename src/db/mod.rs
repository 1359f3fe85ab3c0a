pub mod connection;
pub mod error_context;

pub use connection::{TargetConnection, close_all, connect_all};

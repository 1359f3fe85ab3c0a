pub mod reporter;

pub use reporter::{ExecutionReporter, format_duration};

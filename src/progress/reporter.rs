use crate::executor::{ExecutionReport, StepStatus};
use console::style;
use std::time::{Duration, Instant};

/// Prints the outcome of an executor run for humans
pub struct ExecutionReporter {
    started: Instant,
    verbose: bool,
}

impl ExecutionReporter {
    pub fn start(verbose: bool) -> Self {
        Self {
            started: Instant::now(),
            verbose,
        }
    }

    pub fn print_steps(&self, report: &ExecutionReport) {
        for step in &report.completed {
            match step.status {
                StepStatus::Applied => println!(
                    "  {} {}: applied version {}",
                    style("✓").green(),
                    step.connection,
                    step.version
                ),
                StepStatus::Reverted => println!(
                    "  {} {}: reverted version {}",
                    style("✓").green(),
                    step.connection,
                    step.version
                ),
                StepStatus::Faked => println!(
                    "  {} {}: marked version {} without running it",
                    style("✓").yellow(),
                    step.connection,
                    step.version
                ),
                StepStatus::Skipped if self.verbose => println!(
                    "  {} {}: version {} not applied here, skipped",
                    style("-").dim(),
                    step.connection,
                    step.version
                ),
                StepStatus::Skipped => {}
            }
        }

        for failure in &report.failures {
            let target = match failure.version {
                Some(version) => format!("{}: version {}", failure.connection, version),
                None => failure.connection.clone(),
            };
            println!(
                "  {} {} failed: {}",
                style("✗").red(),
                target,
                style(&failure.message).red()
            );
        }
    }

    /// Final line: success with the elapsed time, or a failure count
    pub fn print_summary(&self, report: &ExecutionReport, action: &str) {
        let elapsed = format_duration(self.started.elapsed());
        if report.succeeded() {
            println!(
                "{} {} {} migration step(s) in {}",
                style("✓").green(),
                action,
                report.changed(),
                style(&elapsed).green()
            );
        } else {
            let stopped = if report.aborted {
                " (stopped at the first failure)"
            } else {
                ""
            };
            println!(
                "{} {} step(s) failed, {} succeeded{}",
                style("✗").red(),
                report.failures.len(),
                report.changed(),
                stopped
            );
        }
    }
}

pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let millis = d.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{}.{}s", total_secs, millis / 100)
        } else {
            format!("{}s", total_secs)
        }
    } else {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m{}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    }
}

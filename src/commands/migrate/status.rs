use crate::commands::migrate::common::{open_targets, registry_for};
use crate::config::Config;
use crate::connections::AdapterKind;
use crate::db::close_all;
use crate::migration::MigrationSummary;
use crate::migration_tracking::{AppliedRecord, get_applied_records};
use anyhow::Result;
use console::style;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq)]
pub enum StatusFormat {
    /// Human-readable text
    #[default]
    Human,
    /// JSON output for piping to jq
    Json,
}

/// Migration state of one connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connection: String,
    pub adapter: AdapterKind,
    pub current: Option<u64>,
    pub applied: Vec<AppliedRecord>,
    /// Versions above `current` that `apply` would run
    pub pending: Vec<u64>,
    /// Versions below `current` that were never applied; `apply` will not run them
    pub skipped: Vec<u64>,
    /// Applied versions with no file on disk
    pub missing_files: Vec<u64>,
}

impl ConnectionStatus {
    pub fn from_records(
        connection: &str,
        adapter: AdapterKind,
        migrations: &[MigrationSummary],
        applied: Vec<AppliedRecord>,
    ) -> Self {
        let applied_versions: BTreeSet<u64> = applied.iter().map(|r| r.version).collect();
        let on_disk: BTreeSet<u64> = migrations.iter().map(|m| m.version).collect();
        let current = applied_versions.last().copied();

        let (pending, skipped): (Vec<u64>, Vec<u64>) = on_disk
            .iter()
            .copied()
            .filter(|v| !applied_versions.contains(v))
            .partition(|v| current.is_none_or(|c| *v > c));

        Self {
            connection: connection.to_string(),
            adapter,
            current,
            missing_files: applied_versions.difference(&on_disk).copied().collect(),
            applied,
            pending,
            skipped,
        }
    }
}

pub async fn cmd_migrate_status(
    config: &Config,
    connections: &[String],
    format: StatusFormat,
) -> Result<Vec<ConnectionStatus>> {
    let registry = registry_for(config);
    let migrations = if registry.directory().exists() {
        registry.list()?
    } else {
        Vec::new()
    };

    let targets = open_targets(config, connections).await?;
    let mut statuses = Vec::with_capacity(targets.len());
    let mut error = None;
    for target in &targets {
        match get_applied_records(target, &config.migration.tracking_table).await {
            Ok(records) => statuses.push(ConnectionStatus::from_records(
                target.name(),
                target.adapter(),
                &migrations,
                records,
            )),
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }
    close_all(&targets).await;
    if let Some(e) = error {
        return Err(e.into());
    }

    match format {
        StatusFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        StatusFormat::Human => print_human(&statuses, migrations.len()),
    }

    Ok(statuses)
}

fn print_human(statuses: &[ConnectionStatus], files: usize) {
    println!("{} migration file(s) on disk", files);

    for status in statuses {
        println!();
        println!(
            "{} ({})",
            style(&status.connection).bold(),
            status.adapter
        );
        match status.current {
            Some(current) => println!("  Current version: {}", current),
            None => println!("  No migrations have been applied"),
        }

        for record in &status.applied {
            println!(
                "  {} {} (applied: {})",
                style("✓").green(),
                record.version,
                record.applied_at.as_deref().unwrap_or("unknown")
            );
        }
        for version in &status.pending {
            println!("  {} {} pending", style("•").cyan(), version);
        }
        for version in &status.skipped {
            println!(
                "  {} {} skipped (older than the current version, never applied)",
                style("!").yellow(),
                version
            );
        }
        for version in &status.missing_files {
            println!(
                "  {} {} applied but its file is missing",
                style("!").yellow(),
                version
            );
        }
    }
}

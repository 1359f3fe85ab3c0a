use crate::config::Config;
use crate::connections::{ConnectionDescriptor, require_connections, resolve_connections};
use crate::db::{TargetConnection, connect_all};
use crate::migration::MigrationRegistry;
use anyhow::{Context, Result};
use tracing::{debug, info};

/// Connections for this invocation: explicit ones replace the configured set
pub fn resolve_targets(
    config: &Config,
    explicit: &[String],
) -> Result<Vec<ConnectionDescriptor>> {
    // Configured entries are only parsed when nothing replaces them
    let configured = if explicit.is_empty() {
        config.databases.build_descriptors()?
    } else {
        Vec::new()
    };
    let descriptors = resolve_connections(explicit, &configured)?;
    if explicit.is_empty() {
        debug!("Using {} configured connection(s)", descriptors.len());
    } else {
        debug!(
            "Using {} connection(s) from the command line",
            descriptors.len()
        );
    }
    Ok(descriptors)
}

/// Resolve and open every target connection, failing before any migration work
pub async fn open_targets(config: &Config, explicit: &[String]) -> Result<Vec<TargetConnection>> {
    let descriptors = resolve_targets(config, explicit)?;
    require_connections(&descriptors)?;

    for descriptor in &descriptors {
        info!("Target '{}': {}", descriptor.name, descriptor.display_url());
    }

    connect_all(&descriptors)
        .await
        .context("Could not open every target connection")
}

pub fn registry_for(config: &Config) -> MigrationRegistry {
    MigrationRegistry::new(
        &config.directories.migrations,
        &config.migration.filename_prefix,
    )
}

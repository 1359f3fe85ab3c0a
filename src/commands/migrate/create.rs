use crate::commands::migrate::common::resolve_targets;
use crate::config::Config;
use crate::migration::{NewMigration, create_migration_file, current_version, validate_suffix};
use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub comment: Option<String>,
    pub suffix: Option<String>,
    /// Command used to open the new file, e.g. "vim" or "code -w"
    pub editor: Option<String>,
}

pub async fn cmd_migrate_create(
    config: &Config,
    connections: &[String],
    options: &CreateOptions,
) -> Result<PathBuf> {
    let suffix = options.suffix.as_deref().filter(|s| !s.is_empty());
    if let Some(suffix) = suffix {
        validate_suffix(suffix).map_err(|e| anyhow!(e))?;
    }

    debug!(
        "Schema directory: {}",
        config.directories.schema.display()
    );

    let databases: Vec<String> = resolve_targets(config, connections)?
        .into_iter()
        .map(|descriptor| descriptor.name)
        .collect();
    if databases.is_empty() {
        warn!("No connections configured; the migration will have no sections");
    }

    let migration = NewMigration {
        version: current_version()?,
        suffix: suffix.map(str::to_string),
        comment: options.comment.clone().unwrap_or_default(),
        databases,
    };

    let path = create_migration_file(
        &config.directories.migrations,
        &config.migration.filename_prefix,
        &migration,
    )?;
    println!("\"{}\" file successfully created.", path.display());

    match options.editor.as_deref().filter(|e| !e.trim().is_empty()) {
        Some(editor) => {
            println!("Using \"{}\" as text editor", editor);
            launch_editor(editor, &path)?;
        }
        None => {
            println!("Now add SQL statements and data migration code as necessary.");
            println!("Once the migration file is valid, call the \"migrate apply\" command to execute it.");
        }
    }

    Ok(path)
}

fn launch_editor(editor: &str, path: &Path) -> Result<()> {
    let mut parts = editor.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("Editor command is empty"))?;

    let status = std::process::Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .with_context(|| format!("Failed to launch editor '{}'", editor))?;

    if !status.success() {
        warn!("Editor '{}' exited with {}", editor, status);
    }
    Ok(())
}

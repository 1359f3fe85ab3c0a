use crate::constants::{ANNOTATION_PREFIX, MIGRATION_FILE_EXTENSION};
use crate::error::{MigrationError, MigrationResult};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use crate::migration::parsing::{MigrationSummary, discover_migrations};
use tracing::{debug, warn};

/// Everything needed to author a new migration file
#[derive(Debug, Clone)]
pub struct NewMigration {
    pub version: u64,
    pub suffix: Option<String>,
    pub comment: String,
    /// Databases that get an empty up and down section
    pub databases: Vec<String>,
}

/// File name for a migration: `<prefix>_<version>[_<suffix>].sql`
pub fn build_file_name(prefix: &str, version: u64, suffix: Option<&str>) -> String {
    match suffix.filter(|s| !s.is_empty()) {
        Some(suffix) => format!(
            "{}_{}_{}.{}",
            prefix, version, suffix, MIGRATION_FILE_EXTENSION
        ),
        None => format!("{}_{}.{}", prefix, version, MIGRATION_FILE_EXTENSION),
    }
}

/// Render the annotated body of a migration file.
///
/// Sections are emitted in database-name order (all up sections, then all down
/// sections) so regenerated files diff cleanly. Comments and scripts are written
/// verbatim, so parsing the result gives back exactly what went in; a script line
/// starting with the annotation prefix would be read as a new section.
pub fn build_body(
    up: &BTreeMap<String, String>,
    down: &BTreeMap<String, String>,
    version: u64,
    comment: &str,
    suffix: Option<&str>,
) -> String {
    let mut body = String::new();

    body.push_str(&format!("{}version {}\n", ANNOTATION_PREFIX, version));
    if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
        body.push_str(&format!("{}suffix {}\n", ANNOTATION_PREFIX, suffix));
    }
    if !comment.is_empty() {
        for line in comment.split('\n') {
            if line.is_empty() {
                body.push_str(&format!("{}comment\n", ANNOTATION_PREFIX));
            } else {
                body.push_str(&format!("{}comment {}\n", ANNOTATION_PREFIX, line));
            }
        }
    }

    body.push_str("--\n");
    body.push_str(&format!("-- Created {}\n", format_created_at(version)));
    body.push_str("-- Add SQL statements under each section; down sections undo their up section.\n");

    for (database, script) in up {
        push_section(&mut body, "up", database, script);
    }
    for (database, script) in down {
        push_section(&mut body, "down", database, script);
    }

    body
}

fn push_section(body: &mut String, direction: &str, database: &str, script: &str) {
    body.push_str(&format!("\n{}{} {}\n", ANNOTATION_PREFIX, direction, database));
    if !script.is_empty() {
        body.push_str(script);
        body.push('\n');
    }
}

fn format_created_at(version: u64) -> String {
    i64::try_from(version)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("at version {}", version))
}

/// Suffixes end up in file names, so keep them to a portable character set
pub fn validate_suffix(suffix: &str) -> Result<(), String> {
    if suffix.is_empty() {
        return Err("Suffix cannot be empty".to_string());
    }
    if let Some(c) = suffix
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(format!(
            "Suffix '{}' contains '{}'; only letters, digits, '_' and '-' are allowed",
            suffix, c
        ));
    }
    Ok(())
}

/// Seconds since the Unix epoch, used as the version of a new migration
pub fn current_version() -> MigrationResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| {
            MigrationError::Configuration(format!("System time is before Unix epoch: {}", e))
        })
}

/// Existing files that already carry `version`, whatever their suffix
pub fn same_version_files(
    migrations_dir: &Path,
    prefix: &str,
    version: u64,
) -> MigrationResult<Vec<MigrationSummary>> {
    if !migrations_dir.is_dir() {
        return Ok(Vec::new());
    }
    Ok(discover_migrations(migrations_dir, prefix)?
        .into_iter()
        .filter(|m| m.version == version)
        .collect())
}

/// Write a new migration file with empty sections for every database.
/// Never overwrites an existing file.
pub fn create_migration_file(
    migrations_dir: &Path,
    prefix: &str,
    migration: &NewMigration,
) -> MigrationResult<PathBuf> {
    if let Some(suffix) = migration.suffix.as_deref() {
        validate_suffix(suffix).map_err(MigrationError::Configuration)?;
    }

    let registry_error = |path: &Path, source| MigrationError::Registry {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(migrations_dir).map_err(|e| registry_error(migrations_dir, e))?;

    let file_name = build_file_name(prefix, migration.version, migration.suffix.as_deref());
    for existing in same_version_files(migrations_dir, prefix, migration.version)? {
        if existing.file_name() != file_name {
            warn!(
                "{} already uses version {}; apply and down refuse duplicate versions until one is renamed",
                existing.file_name(),
                migration.version
            );
        }
    }

    let placeholders: BTreeMap<String, String> = migration
        .databases
        .iter()
        .map(|db| (db.clone(), String::new()))
        .collect();
    let body = build_body(
        &placeholders,
        &placeholders,
        migration.version,
        &migration.comment,
        migration.suffix.as_deref(),
    );

    let path = migrations_dir.join(file_name);
    debug!("Writing migration file {}", path.display());

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| registry_error(&path, e))?;
    file.write_all(body.as_bytes())
        .map_err(|e| registry_error(&path, e))?;

    Ok(path)
}

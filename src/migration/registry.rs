use crate::error::{MigrationError, MigrationResult};
use crate::migration::MigrationUnit;
use crate::migration::parsing::{MigrationSummary, discover_migrations, parse_migration_body};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The migration files of one directory
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    directory: PathBuf,
    prefix: String,
}

impl MigrationRegistry {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// All migration files, ascending by version
    pub fn list(&self) -> MigrationResult<Vec<MigrationSummary>> {
        let migrations = discover_migrations(&self.directory, &self.prefix)?;
        debug!(
            "Found {} migration file(s) in {}",
            migrations.len(),
            self.directory.display()
        );
        Ok(migrations)
    }

    pub fn latest(&self) -> MigrationResult<Option<MigrationSummary>> {
        Ok(self.list()?.pop())
    }

    /// Read and parse the migration with the given version
    pub fn load(&self, version: u64) -> MigrationResult<MigrationUnit> {
        let matches: Vec<MigrationSummary> = self
            .list()?
            .into_iter()
            .filter(|m| m.version == version)
            .collect();

        let summary = match matches.as_slice() {
            [] => return Err(MigrationError::NotFound(version)),
            [single] => single,
            _ => {
                return Err(MigrationError::DuplicateVersion {
                    version,
                    files: matches.iter().map(MigrationSummary::file_name).collect(),
                });
            }
        };

        load_unit(summary)
    }
}

/// Parse a discovered file into a full unit. The file name is the authority
/// for version and suffix; the header has to agree on the version.
pub fn load_unit(summary: &MigrationSummary) -> MigrationResult<MigrationUnit> {
    let content =
        std::fs::read_to_string(&summary.path).map_err(|source| MigrationError::Registry {
            path: summary.path.clone(),
            source,
        })?;
    let body = parse_migration_body(&summary.path, &content)?;

    if let Some(declared) = body.version
        && declared != summary.version
    {
        return Err(MigrationError::invalid_file(
            &summary.path,
            format!(
                "header declares version {} but the file name says {}",
                declared, summary.version
            ),
        ));
    }

    if body.suffix.is_some() && body.suffix != summary.suffix {
        warn!(
            "{}: header suffix {:?} differs from file name; using {:?}",
            summary.file_name(),
            body.suffix,
            summary.suffix
        );
    }

    Ok(MigrationUnit {
        path: summary.path.clone(),
        version: summary.version,
        suffix: summary.suffix.clone(),
        comment: body.comment,
        up: body.up,
        down: body.down,
    })
}

/// Two files with the same version cannot both be tracked
pub fn ensure_unique_versions(migrations: &[MigrationSummary]) -> MigrationResult<()> {
    let duplicate = migrations
        .iter()
        .chunk_by(|m| m.version)
        .into_iter()
        .map(|(version, group)| (version, group.collect::<Vec<_>>()))
        .find(|(_, group)| group.len() > 1);

    match duplicate {
        Some((version, group)) => Err(MigrationError::DuplicateVersion {
            version,
            files: group.iter().map(|m| m.file_name()).collect(),
        }),
        None => Ok(()),
    }
}

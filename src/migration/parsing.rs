use crate::constants::{ANNOTATION_PREFIX, MIGRATION_FILE_EXTENSION};
use crate::error::{MigrationError, MigrationResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A migration file found on disk, identified from its name alone
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MigrationSummary {
    pub path: PathBuf,
    pub version: u64,
    pub suffix: Option<String>,
}

impl MigrationSummary {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Metadata and scripts read from the body of a migration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBody {
    pub version: Option<u64>,
    pub suffix: Option<String>,
    pub comment: String,
    pub up: BTreeMap<String, String>,
    pub down: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Parse a migration filename like "Migration_1700000000_add_books.sql".
/// Returns the version and the optional suffix; None for unrelated files.
pub fn parse_migration_filename(
    prefix: &str,
    filename: &str,
) -> Option<(u64, Option<String>)> {
    let stem = filename
        .strip_suffix(MIGRATION_FILE_EXTENSION)?
        .strip_suffix('.')?;
    let rest = stem.strip_prefix(prefix)?.strip_prefix('_')?;

    let (version_str, suffix) = match rest.split_once('_') {
        Some((version, suffix)) => (version, Some(suffix)),
        None => (rest, None),
    };

    if version_str.is_empty() || !version_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version = version_str.parse::<u64>().ok()?;

    match suffix {
        Some("") => None,
        Some(suffix) => Some((version, Some(suffix.to_string()))),
        None => Some((version, None)),
    }
}

/// Find all migration files in a directory and return them sorted by version
pub fn discover_migrations(
    migrations_dir: &Path,
    prefix: &str,
) -> MigrationResult<Vec<MigrationSummary>> {
    let registry_error = |source| MigrationError::Registry {
        path: migrations_dir.to_path_buf(),
        source,
    };

    let mut migrations = Vec::new();
    for entry in std::fs::read_dir(migrations_dir).map_err(registry_error)? {
        let path = entry.map_err(registry_error)?.path();
        if !path.is_file() {
            continue;
        }

        if let Some(filename) = path.file_name().and_then(|n| n.to_str())
            && let Some((version, suffix)) = parse_migration_filename(prefix, filename)
        {
            migrations.push(MigrationSummary {
                path,
                version,
                suffix,
            });
        }
    }

    // Numeric order; suffix only breaks ties
    migrations.sort_by(|a, b| (a.version, &a.suffix).cmp(&(b.version, &b.suffix)));

    Ok(migrations)
}

/// Parse the annotated SQL body of a migration file
pub fn parse_migration_body(path: &Path, content: &str) -> MigrationResult<ParsedBody> {
    let mut body = ParsedBody::default();
    let mut comment_lines: Vec<&str> = Vec::new();
    let mut current: Option<(Direction, String, Vec<&str>)> = None;

    // Split on '\n' rather than `lines()` so trailing blank lines survive
    for (index, line) in content.split('\n').enumerate() {
        let line_num = index + 1;
        let Some(annotation) = line
            .strip_suffix('\r')
            .unwrap_or(line)
            .trim_start()
            .strip_prefix(ANNOTATION_PREFIX)
        else {
            if let Some((_, _, lines)) = current.as_mut() {
                lines.push(line);
            }
            continue;
        };

        let (directive, value) = annotation
            .split_once(' ')
            .unwrap_or((annotation.trim_end(), ""));

        match directive {
            "up" | "down" => {
                if let Some(section) = current.take() {
                    finish_section(path, &mut body, section)?;
                }
                let database = value.trim();
                if database.is_empty() || database.contains(char::is_whitespace) {
                    return Err(MigrationError::invalid_file(
                        path,
                        format!("line {}: expected a single database name after '{}'", line_num, directive),
                    ));
                }
                let direction = if directive == "up" {
                    Direction::Up
                } else {
                    Direction::Down
                };
                current = Some((direction, database.to_string(), Vec::new()));
            }
            "version" | "suffix" | "comment" if current.is_some() => {
                return Err(MigrationError::invalid_file(
                    path,
                    format!(
                        "line {}: '{}{}' must appear before the first up/down section",
                        line_num, ANNOTATION_PREFIX, directive
                    ),
                ));
            }
            "version" => {
                if body.version.is_some() {
                    return Err(MigrationError::invalid_file(
                        path,
                        format!("line {}: version is declared twice", line_num),
                    ));
                }
                let version = value.trim().parse::<u64>().map_err(|_| {
                    MigrationError::invalid_file(
                        path,
                        format!("line {}: invalid version '{}'", line_num, value.trim()),
                    )
                })?;
                body.version = Some(version);
            }
            "suffix" => {
                body.suffix = Some(value.trim().to_string()).filter(|s| !s.is_empty());
            }
            "comment" => comment_lines.push(value),
            other => {
                return Err(MigrationError::invalid_file(
                    path,
                    format!("line {}: unknown annotation '{}{}'", line_num, ANNOTATION_PREFIX, other),
                ));
            }
        }
    }

    if let Some(section) = current.take() {
        finish_section(path, &mut body, section)?;
    }
    body.comment = comment_lines.join("\n");

    Ok(body)
}

fn finish_section(
    path: &Path,
    body: &mut ParsedBody,
    (direction, database, lines): (Direction, String, Vec<&str>),
) -> MigrationResult<()> {
    let scripts = match direction {
        Direction::Up => &mut body.up,
        Direction::Down => &mut body.down,
    };
    if scripts.contains_key(&database) {
        return Err(MigrationError::invalid_file(
            path,
            format!(
                "duplicate {} section for database '{}'",
                if direction == Direction::Up { "up" } else { "down" },
                database
            ),
        ));
    }
    scripts.insert(database, section_script(&lines));
    Ok(())
}

/// Section text verbatim, minus the newline that ends its last line
fn section_script(lines: &[&str]) -> String {
    let text = lines.join("\n");
    match text.strip_suffix('\n') {
        Some(script) => script.to_string(),
        None => text,
    }
}

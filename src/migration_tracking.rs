use crate::config::types::TrackingTable;
use crate::connections::AdapterKind;
use crate::db::TargetConnection;
use crate::error::{MigrationError, MigrationResult};
use serde::Serialize;
use sqlx::{Any, Executor, Row};
use tracing::debug;

/// Safely convert migration version from u64 to i64 for database storage
/// Migration versions are Unix timestamps, which will exceed i64::MAX around year 2262
pub fn version_to_db(version: u64) -> MigrationResult<i64> {
    i64::try_from(version).map_err(|_| {
        MigrationError::Configuration(format!(
            "Migration version {} is too large for database storage (exceeds i64::MAX)",
            version
        ))
    })
}

/// Safely convert migration version from i64 database storage to u64
/// Handles negative values (which shouldn't exist) gracefully
pub fn version_from_db(version: i64) -> u64 {
    if version < 0 {
        tracing::warn!(
            "Found negative migration version in database: {}. This indicates corrupted data.",
            version
        );
        0
    } else {
        version as u64
    }
}

fn is_valid_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quote_identifier(adapter: AdapterKind, name: &str) -> String {
    match adapter {
        AdapterKind::MySql => format!("`{}`", name),
        AdapterKind::Postgres | AdapterKind::Sqlite => format!("\"{}\"", name),
    }
}

fn validate_tracking_table(tracking_table: &TrackingTable) -> MigrationResult<()> {
    let invalid = |kind: &str, name: &str| {
        MigrationError::Configuration(format!(
            "Invalid {} name '{}': must contain only letters, numbers, underscores, and dollar signs, starting with letter or underscore",
            kind, name
        ))
    };

    if let Some(schema) = &tracking_table.schema
        && !is_valid_sql_identifier(schema)
    {
        return Err(invalid("schema", schema));
    }
    if !is_valid_sql_identifier(&tracking_table.name) {
        return Err(invalid("table", &tracking_table.name));
    }
    Ok(())
}

/// Quote a (possibly schema-qualified) tracking table name for the given engine.
/// Names are validated first, so the result is safe to interpolate.
pub fn format_tracking_table_name(
    tracking_table: &TrackingTable,
    adapter: AdapterKind,
) -> MigrationResult<String> {
    validate_tracking_table(tracking_table)?;

    let table = quote_identifier(adapter, &tracking_table.name);
    Ok(match &tracking_table.schema {
        Some(schema) => format!("{}.{}", quote_identifier(adapter, schema), table),
        None => table,
    })
}

/// One row of the tracking table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedRecord {
    pub version: u64,
    pub applied_at: Option<String>,
}

fn tracking_error(
    connection: &TargetConnection,
    tracking_table: &TrackingTable,
) -> impl FnOnce(sqlx::Error) -> MigrationError {
    let connection = connection.name().to_string();
    let table = tracking_table.to_string();
    move |source| MigrationError::Tracking {
        connection,
        table,
        source,
    }
}

/// Create the tracking table if it is not there yet
pub async fn ensure_tracking_table_exists(
    connection: &TargetConnection,
    tracking_table: &TrackingTable,
) -> MigrationResult<()> {
    let tracking_table_name = format_tracking_table_name(tracking_table, connection.adapter())?;

    debug!(
        "Ensuring tracking table {} exists on '{}'",
        tracking_table,
        connection.name()
    );
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            version BIGINT NOT NULL PRIMARY KEY,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        tracking_table_name
    ))
    .execute(connection.pool())
    .await
    .map_err(tracking_error(connection, tracking_table))?;

    Ok(())
}

/// Check the catalog for the tracking table without creating it
pub async fn tracking_table_exists(
    connection: &TargetConnection,
    tracking_table: &TrackingTable,
) -> MigrationResult<bool> {
    validate_tracking_table(tracking_table)?;
    let name = &tracking_table.name;

    let sql = match connection.adapter() {
        AdapterKind::Sqlite => {
            let master = match &tracking_table.schema {
                Some(schema) => format!("\"{}\".sqlite_master", schema),
                None => "sqlite_master".to_string(),
            };
            format!(
                "SELECT COUNT(*) AS count FROM {} WHERE type = 'table' AND name = '{}'",
                master, name
            )
        }
        AdapterKind::Postgres => format!(
            "SELECT COUNT(*) AS count FROM information_schema.tables \
             WHERE table_schema = {} AND table_name = '{}'",
            tracking_table
                .schema
                .as_ref()
                .map(|s| format!("'{}'", s))
                .unwrap_or_else(|| "current_schema()".to_string()),
            name
        ),
        AdapterKind::MySql => format!(
            "SELECT COUNT(*) AS count FROM information_schema.tables \
             WHERE table_schema = {} AND table_name = '{}'",
            tracking_table
                .schema
                .as_ref()
                .map(|s| format!("'{}'", s))
                .unwrap_or_else(|| "DATABASE()".to_string()),
            name
        ),
    };

    let row = sqlx::query(&sql)
        .fetch_one(connection.pool())
        .await
        .map_err(tracking_error(connection, tracking_table))?;
    let count: i64 = row
        .try_get("count")
        .map_err(tracking_error(connection, tracking_table))?;

    Ok(count > 0)
}

/// Applied versions in ascending order; empty when the table does not exist
pub async fn get_applied_versions(
    connection: &TargetConnection,
    tracking_table: &TrackingTable,
) -> MigrationResult<Vec<u64>> {
    Ok(get_applied_records(connection, tracking_table)
        .await?
        .into_iter()
        .map(|record| record.version)
        .collect())
}

/// All tracking rows ordered by version; empty when the table does not exist
pub async fn get_applied_records(
    connection: &TargetConnection,
    tracking_table: &TrackingTable,
) -> MigrationResult<Vec<AppliedRecord>> {
    if !tracking_table_exists(connection, tracking_table).await? {
        debug!(
            "Tracking table {} not found on '{}'; nothing applied",
            tracking_table,
            connection.name()
        );
        return Ok(Vec::new());
    }

    let adapter = connection.adapter();
    let tracking_table_name = format_tracking_table_name(tracking_table, adapter)?;
    let rows = sqlx::query(&format!(
        "SELECT version, CAST(applied_at AS {}) AS applied_at FROM {} ORDER BY version",
        adapter.text_cast_type(),
        tracking_table_name
    ))
    .fetch_all(connection.pool())
    .await
    .map_err(tracking_error(connection, tracking_table))?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let version: i64 = row
            .try_get("version")
            .map_err(tracking_error(connection, tracking_table))?;
        let applied_at: Option<String> = row
            .try_get("applied_at")
            .map_err(tracking_error(connection, tracking_table))?;
        records.push(AppliedRecord {
            version: version_from_db(version),
            applied_at,
        });
    }

    Ok(records)
}

/// Record a version as applied. Runs on the caller's executor so it can share
/// the transaction of the script it records.
pub async fn mark_applied<'e, E>(
    executor: E,
    connection: &TargetConnection,
    tracking_table: &TrackingTable,
    version: u64,
) -> MigrationResult<()>
where
    E: Executor<'e, Database = Any>,
{
    let tracking_table_name = format_tracking_table_name(tracking_table, connection.adapter())?;
    let sql = format!(
        "INSERT INTO {} (version) VALUES ({})",
        tracking_table_name,
        version_to_db(version)?
    );

    executor
        .execute(sql.as_str())
        .await
        .map_err(tracking_error(connection, tracking_table))?;
    Ok(())
}

/// Remove the record of an applied version
pub async fn mark_reverted<'e, E>(
    executor: E,
    connection: &TargetConnection,
    tracking_table: &TrackingTable,
    version: u64,
) -> MigrationResult<()>
where
    E: Executor<'e, Database = Any>,
{
    let tracking_table_name = format_tracking_table_name(tracking_table, connection.adapter())?;
    let sql = format!(
        "DELETE FROM {} WHERE version = {}",
        tracking_table_name,
        version_to_db(version)?
    );

    executor
        .execute(sql.as_str())
        .await
        .map_err(tracking_error(connection, tracking_table))?;
    Ok(())
}

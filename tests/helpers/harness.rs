use dbmt::config::TrackingTable;
use dbmt::connections::ConnectionDescriptor;
use dbmt::db::TargetConnection;
use dbmt::migration::{MigrationRegistry, build_body, build_file_name};
use dbmt::migration_tracking::get_applied_versions;
use sqlx::{AnyPool, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A SQLite database file standing in for one target connection
pub struct TestDatabase {
    descriptor: ConnectionDescriptor,
    connection: TargetConnection,
    path: PathBuf,
}

impl TestDatabase {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn connection(&self) -> &TargetConnection {
        &self.connection
    }

    pub fn pool(&self) -> &AnyPool {
        self.connection.pool()
    }

    /// `name=dsn` form accepted by `--connection`
    pub fn connection_arg(&self) -> String {
        format!("{}=sqlite:{}", self.descriptor.name, self.path.display())
    }

    /// Execute arbitrary SQL - perfect for test setup
    pub async fn execute(&self, sql: &str) {
        sqlx::raw_sql(sql)
            .execute(self.pool())
            .await
            .unwrap_or_else(|e| panic!("Failed to execute SQL: {}\nError: {}", sql, e));
    }

    pub async fn table_exists(&self, table: &str) -> bool {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = '{}'",
            table
        ))
        .fetch_one(self.pool())
        .await
        .expect("Failed to query sqlite_master");
        row.get::<i64, _>("count") > 0
    }

    pub async fn applied(&self, tracking_table: &TrackingTable) -> Vec<u64> {
        get_applied_versions(&self.connection, tracking_table)
            .await
            .expect("Failed to read applied versions")
    }
}

/// A temporary project: a migrations directory plus one database per name
pub struct TestProject {
    temp_dir: TempDir,
    databases: Vec<TestDatabase>,
    connections: Vec<TargetConnection>,
    tracking_table: TrackingTable,
}

impl TestProject {
    pub async fn new(names: &[&str]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::create_dir_all(temp_dir.path().join("migrations"))
            .expect("Failed to create migrations directory");

        let mut databases = Vec::new();
        for name in names {
            let path = temp_dir.path().join(format!("{}.db", name));
            let descriptor =
                ConnectionDescriptor::parse(&format!("{}=sqlite:{}", name, path.display()))
                    .expect("Failed to parse test connection");
            let connection = TargetConnection::connect(&descriptor)
                .await
                .expect("Failed to open test database");
            databases.push(TestDatabase {
                descriptor,
                connection,
                path,
            });
        }
        let connections = databases.iter().map(|db| db.connection.clone()).collect();

        Self {
            temp_dir,
            databases,
            connections,
            tracking_table: TrackingTable::default(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.root().join("migrations")
    }

    pub fn db(&self, name: &str) -> &TestDatabase {
        self.databases
            .iter()
            .find(|db| db.name() == name)
            .unwrap_or_else(|| panic!("No test database named {}", name))
    }

    pub fn databases(&self) -> &[TestDatabase] {
        &self.databases
    }

    pub fn descriptors(&self) -> Vec<ConnectionDescriptor> {
        self.databases.iter().map(|db| db.descriptor.clone()).collect()
    }

    /// Every database, in creation order
    pub fn connections(&self) -> &[TargetConnection] {
        &self.connections
    }

    pub fn tracking_table(&self) -> &TrackingTable {
        &self.tracking_table
    }

    pub fn registry(&self) -> MigrationRegistry {
        MigrationRegistry::new(self.migrations_dir(), "Migration")
    }

    /// Write a migration file with the given per-database scripts
    pub fn write_migration(
        &self,
        version: u64,
        up: &[(&str, &str)],
        down: &[(&str, &str)],
    ) -> PathBuf {
        let to_map = |scripts: &[(&str, &str)]| -> BTreeMap<String, String> {
            scripts
                .iter()
                .map(|(db, sql)| (db.to_string(), sql.to_string()))
                .collect()
        };
        let body = build_body(&to_map(up), &to_map(down), version, "", None);
        let path = self
            .migrations_dir()
            .join(build_file_name("Migration", version, None));
        std::fs::write(&path, body).expect("Failed to write migration file");
        path
    }

    pub async fn close(self) {
        for db in &self.databases {
            db.connection.close().await;
        }
    }
}

/// Run a test against temporary SQLite databases, one per name
///
/// # Example
/// ```
/// #[tokio::test]
/// async fn test_something() -> Result<()> {
///     with_test_dbs(&["bookstore", "cms"], async |project| {
///         project.db("bookstore").execute("CREATE TABLE book (id INT)").await;
///         Ok(())
///     }).await
/// }
/// ```
pub async fn with_test_dbs<F, R>(names: &[&str], test_fn: F) -> R
where
    F: std::ops::AsyncFnOnce(&TestProject) -> R,
{
    let project = TestProject::new(names).await;

    let result = test_fn(&project).await;

    project.close().await;
    result
}

use crate::helpers::harness::with_test_dbs;
use anyhow::Result;
use dbmt::connections::resolve_connections;
use dbmt::db::connect_all;
use dbmt::executor::{ApplyPolicy, ForwardExecutor, StepStatus};
use dbmt::MigrationError;

#[tokio::test]
async fn test_apply_runs_pending_in_order_on_every_connection() -> Result<()> {
    with_test_dbs(&["bookstore", "cms"], async |project| {
        project.write_migration(
            200,
            &[("bookstore", "ALTER TABLE book ADD COLUMN title TEXT;")],
            &[],
        );
        project.write_migration(
            100,
            &[
                ("bookstore", "CREATE TABLE book (id INTEGER PRIMARY KEY);"),
                ("cms", "CREATE TABLE page (id INTEGER PRIMARY KEY);"),
            ],
            &[],
        );

        let registry = project.registry();
        let report = ForwardExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Abort)
            .apply_pending(project.connections())
            .await?;

        assert!(report.succeeded());
        assert_eq!(report.changed(), 4);

        let bookstore = project.db("bookstore");
        let cms = project.db("cms");
        assert_eq!(bookstore.applied(project.tracking_table()).await, vec![100, 200]);
        assert_eq!(cms.applied(project.tracking_table()).await, vec![100, 200]);
        bookstore.execute("INSERT INTO book (id, title) VALUES (1, 'Dune')").await;
        assert!(cms.table_exists("page").await);

        // Nothing left to do on a second run
        let report = ForwardExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Abort)
            .apply_pending(project.connections())
            .await?;
        assert!(report.completed.is_empty());

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_explicit_connections_replace_configured_ones() -> Result<()> {
    with_test_dbs(&["bookstore", "cms", "audit"], async |project| {
        project.write_migration(100, &[("audit", "CREATE TABLE log (id INTEGER);")], &[]);

        let explicit = vec![
            project.db("bookstore").connection_arg(),
            project.db("cms").connection_arg(),
        ];
        let descriptors = resolve_connections(&explicit, &project.descriptors())?;
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["bookstore", "cms"]);

        let targets = connect_all(&descriptors).await?;
        let registry = project.registry();
        let report = ForwardExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Abort)
            .apply_pending(&targets)
            .await?;
        for target in &targets {
            target.close().await;
        }

        assert_eq!(report.changed(), 2);
        assert_eq!(project.db("bookstore").applied(project.tracking_table()).await, vec![100]);
        assert_eq!(project.db("cms").applied(project.tracking_table()).await, vec![100]);

        let audit = project.db("audit");
        assert!(!audit.table_exists("migration").await);
        assert!(!audit.table_exists("log").await);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_abort_policy_stops_at_first_failure() -> Result<()> {
    with_test_dbs(&["bookstore", "cms"], async |project| {
        project.write_migration(100, &[("bookstore", "CREATE TABLE book (id INTEGER);")], &[]);
        project.write_migration(200, &[("bookstore", "INSERT INTO missing_table VALUES (1);")], &[]);
        project.write_migration(300, &[("bookstore", "CREATE TABLE author (id INTEGER);")], &[]);

        let registry = project.registry();
        let report = ForwardExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Abort)
            .apply_pending(project.connections())
            .await?;

        assert!(report.aborted);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].connection, "bookstore");
        assert_eq!(report.failures[0].version, Some(200));

        let bookstore = project.db("bookstore");
        assert_eq!(bookstore.applied(project.tracking_table()).await, vec![100]);
        assert!(!bookstore.table_exists("author").await);
        // The second connection was never reached
        assert!(project.db("cms").applied(project.tracking_table()).await.is_empty());

        assert!(matches!(
            report.into_result(),
            Err(MigrationError::PartialFailure { .. })
        ));

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_force_policy_leaves_failed_version_unmarked() -> Result<()> {
    with_test_dbs(&["bookstore", "cms"], async |project| {
        project.write_migration(100, &[("bookstore", "CREATE TABLE book (id INTEGER);")], &[]);
        project.write_migration(200, &[("bookstore", "INSERT INTO missing_table VALUES (1);")], &[]);
        project.write_migration(300, &[("bookstore", "CREATE TABLE author (id INTEGER);")], &[]);

        let registry = project.registry();
        let report = ForwardExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Force)
            .apply_pending(project.connections())
            .await?;

        assert!(!report.aborted);
        assert!(!report.succeeded());
        assert_eq!(report.failures.len(), 1);

        let bookstore = project.db("bookstore");
        assert_eq!(bookstore.applied(project.tracking_table()).await, vec![100, 300]);
        assert!(bookstore.table_exists("author").await);
        assert_eq!(
            project.db("cms").applied(project.tracking_table()).await,
            vec![100, 200, 300]
        );

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_fake_policy_only_marks_versions() -> Result<()> {
    with_test_dbs(&["bookstore"], async |project| {
        project.write_migration(100, &[("bookstore", "CREATE TABLE book (id INTEGER);")], &[]);
        project.write_migration(200, &[("bookstore", "this is not sql")], &[]);

        let registry = project.registry();
        let report = ForwardExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Fake)
            .apply_pending(project.connections())
            .await?;

        assert!(report.succeeded());
        assert!(report.completed.iter().all(|s| s.status == StepStatus::Faked));

        let bookstore = project.db("bookstore");
        assert_eq!(bookstore.applied(project.tracking_table()).await, vec![100, 200]);
        assert!(!bookstore.table_exists("book").await);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_limit_applies_one_version_at_a_time() -> Result<()> {
    with_test_dbs(&["bookstore"], async |project| {
        project.write_migration(100, &[("bookstore", "CREATE TABLE book (id INTEGER);")], &[]);
        project.write_migration(200, &[("bookstore", "CREATE TABLE author (id INTEGER);")], &[]);

        let registry = project.registry();
        let executor = ForwardExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Abort)
            .with_limit(1);

        executor.apply_pending(project.connections()).await?;
        assert_eq!(project.db("bookstore").applied(project.tracking_table()).await, vec![100]);

        executor.apply_pending(project.connections()).await?;
        assert_eq!(
            project.db("bookstore").applied(project.tracking_table()).await,
            vec![100, 200]
        );

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_duplicate_versions_refuse_to_run() -> Result<()> {
    with_test_dbs(&["bookstore"], async |project| {
        std::fs::write(project.migrations_dir().join("Migration_100_a.sql"), "")?;
        std::fs::write(project.migrations_dir().join("Migration_100_b.sql"), "")?;

        let registry = project.registry();
        let err = ForwardExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Abort)
            .apply_pending(project.connections())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrationError::DuplicateVersion { version: 100, .. }));
        assert!(!project.db("bookstore").table_exists("migration").await);

        Ok(())
    })
    .await
}

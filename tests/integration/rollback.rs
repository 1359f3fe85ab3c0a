use crate::helpers::harness::{TestProject, with_test_dbs};
use anyhow::Result;
use dbmt::MigrationError;
use dbmt::executor::{
    ApplyPolicy, ForwardExecutor, RollbackExecutor, RollbackPlan, StepStatus, plan_rollback,
};
use dbmt::migration_tracking::{ensure_tracking_table_exists, mark_applied};

async fn apply_all(project: &TestProject) -> Result<()> {
    let registry = project.registry();
    ForwardExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Abort)
        .apply_pending(project.connections())
        .await?
        .into_result()?;
    Ok(())
}

#[tokio::test]
async fn test_rollback_reverts_latest_version() -> Result<()> {
    with_test_dbs(&["bookstore"], async |project| {
        project.write_migration(
            100,
            &[("bookstore", "CREATE TABLE book (id INTEGER);")],
            &[("bookstore", "DROP TABLE book;")],
        );
        project.write_migration(
            200,
            &[("bookstore", "CREATE TABLE author (id INTEGER);")],
            &[("bookstore", "DROP TABLE author;")],
        );
        project.write_migration(
            300,
            &[("bookstore", "CREATE TABLE publisher (id INTEGER);")],
            &[("bookstore", "DROP TABLE publisher;")],
        );
        apply_all(project).await?;

        let plan = plan_rollback(project.connections(), project.tracking_table(), ApplyPolicy::Abort)
            .await?;
        assert_eq!(
            plan,
            RollbackPlan {
                current: 300,
                previous: Some(200),
                remaining: 1,
            }
        );

        let registry = project.registry();
        let report = RollbackExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Abort)
            .execute_rollback_to_previous_version(project.connections(), plan.current, plan.previous)
            .await?;
        assert!(report.succeeded());

        let bookstore = project.db("bookstore");
        assert_eq!(bookstore.applied(project.tracking_table()).await, vec![100, 200]);
        assert!(!bookstore.table_exists("publisher").await);
        assert!(bookstore.table_exists("author").await);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_rollback_without_history_changes_nothing() -> Result<()> {
    with_test_dbs(&["bookstore", "cms"], async |project| {
        project.write_migration(100, &[], &[("bookstore", "DROP TABLE book;")]);

        let err = plan_rollback(project.connections(), project.tracking_table(), ApplyPolicy::Abort)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::NothingToReverse));

        for db in project.databases() {
            assert!(!db.table_exists("migration").await);
        }

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_force_rollback_continues_past_failing_connection() -> Result<()> {
    with_test_dbs(&["first", "second", "third"], async |project| {
        project.write_migration(
            100,
            &[
                ("first", "CREATE TABLE t1 (id INTEGER);"),
                ("second", "CREATE TABLE t2 (id INTEGER);"),
                ("third", "CREATE TABLE t3 (id INTEGER);"),
            ],
            &[
                ("first", "DROP TABLE t1;"),
                ("second", "DROP TABLE does_not_exist;"),
                ("third", "DROP TABLE t3;"),
            ],
        );
        apply_all(project).await?;

        let plan = plan_rollback(project.connections(), project.tracking_table(), ApplyPolicy::Force)
            .await?;
        let registry = project.registry();
        let report = RollbackExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Force)
            .execute_rollback_to_previous_version(project.connections(), plan.current, plan.previous)
            .await?;

        assert_eq!(report.changed(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].connection, "second");

        let table = project.tracking_table();
        assert!(project.db("first").applied(table).await.is_empty());
        assert_eq!(project.db("second").applied(table).await, vec![100]);
        assert!(project.db("third").applied(table).await.is_empty());
        assert!(!project.db("first").table_exists("t1").await);
        assert!(project.db("second").table_exists("t2").await);
        assert!(!project.db("third").table_exists("t3").await);

        assert!(matches!(
            report.into_result(),
            Err(MigrationError::PartialFailure { failures }) if failures.len() == 1
        ));

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_abort_rollback_stops_at_failing_connection() -> Result<()> {
    with_test_dbs(&["first", "second", "third"], async |project| {
        project.write_migration(
            100,
            &[],
            &[("second", "DROP TABLE does_not_exist;")],
        );
        apply_all(project).await?;

        let registry = project.registry();
        let report = RollbackExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Abort)
            .execute_rollback_to_previous_version(project.connections(), 100, None)
            .await?;

        assert!(report.aborted);
        let table = project.tracking_table();
        assert!(project.db("first").applied(table).await.is_empty());
        assert_eq!(project.db("second").applied(table).await, vec![100]);
        assert_eq!(project.db("third").applied(table).await, vec![100]);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_rollback_skips_connections_without_current_version() -> Result<()> {
    with_test_dbs(&["bookstore", "cms"], async |project| {
        project.write_migration(100, &[], &[]);
        project.write_migration(200, &[], &[]);

        let table = project.tracking_table();
        for db in project.databases() {
            ensure_tracking_table_exists(db.connection(), table).await?;
            mark_applied(db.pool(), db.connection(), table, 100).await?;
        }
        let bookstore = project.db("bookstore");
        mark_applied(bookstore.pool(), bookstore.connection(), table, 200).await?;

        let plan = plan_rollback(project.connections(), table, ApplyPolicy::Abort).await?;
        assert_eq!(plan.current, 200);
        assert_eq!(plan.previous, Some(100));
        assert_eq!(plan.remaining, 0);

        let registry = project.registry();
        let report = RollbackExecutor::new(&registry, table, ApplyPolicy::Abort)
            .execute_rollback_to_previous_version(project.connections(), plan.current, plan.previous)
            .await?;

        assert!(report.succeeded());
        let statuses: Vec<_> = report
            .completed
            .iter()
            .map(|s| (s.connection.as_str(), s.status))
            .collect();
        assert_eq!(
            statuses,
            vec![("bookstore", StepStatus::Reverted), ("cms", StepStatus::Skipped)]
        );
        assert_eq!(project.db("bookstore").applied(table).await, vec![100]);
        assert_eq!(project.db("cms").applied(table).await, vec![100]);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_fake_rollback_keeps_schema() -> Result<()> {
    with_test_dbs(&["bookstore"], async |project| {
        project.write_migration(
            100,
            &[("bookstore", "CREATE TABLE book (id INTEGER);")],
            &[("bookstore", "DROP TABLE book;")],
        );
        apply_all(project).await?;
        // The file may even be gone: fake never reads it
        std::fs::remove_dir_all(project.migrations_dir())?;

        let registry = project.registry();
        let report = RollbackExecutor::new(&registry, project.tracking_table(), ApplyPolicy::Fake)
            .execute_rollback_to_previous_version(project.connections(), 100, None)
            .await?;

        assert!(report.succeeded());
        let bookstore = project.db("bookstore");
        assert!(bookstore.applied(project.tracking_table()).await.is_empty());
        assert!(bookstore.table_exists("book").await);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_force_rollback_reverts_around_unreadable_tracking_table() -> Result<()> {
    with_test_dbs(&["first", "second", "third"], async |project| {
        project.write_migration(
            100,
            &[
                ("first", "CREATE TABLE t1 (id INTEGER);"),
                ("third", "CREATE TABLE t3 (id INTEGER);"),
            ],
            &[("first", "DROP TABLE t1;"), ("third", "DROP TABLE t3;")],
        );
        let registry = project.registry();
        let table = project.tracking_table();
        let readable = vec![
            project.db("first").connection().clone(),
            project.db("third").connection().clone(),
        ];
        ForwardExecutor::new(&registry, table, ApplyPolicy::Abort)
            .apply_pending(&readable)
            .await?
            .into_result()?;
        project
            .db("second")
            .execute("CREATE TABLE migration (id INTEGER)")
            .await;

        let err = plan_rollback(project.connections(), table, ApplyPolicy::Abort)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Tracking { ref connection, .. } if connection == "second"));

        let plan = plan_rollback(project.connections(), table, ApplyPolicy::Force).await?;
        assert_eq!(plan.current, 100);
        assert_eq!(plan.previous, None);

        let report = RollbackExecutor::new(&registry, table, ApplyPolicy::Force)
            .execute_rollback_to_previous_version(project.connections(), plan.current, plan.previous)
            .await?;

        assert_eq!(report.changed(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].connection, "second");
        assert_eq!(report.failures[0].version, None);
        assert!(project.db("first").applied(table).await.is_empty());
        assert!(project.db("third").applied(table).await.is_empty());
        assert!(!project.db("first").table_exists("t1").await);
        assert!(!project.db("third").table_exists("t3").await);
        assert!(report.into_result().is_err());

        // Nothing readable at all: the plan itself fails instead of claiming no history
        let only_broken = vec![project.db("second").connection().clone()];
        let err = plan_rollback(&only_broken, table, ApplyPolicy::Force)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::PartialFailure { ref failures } if failures.len() == 1));

        Ok(())
    })
    .await
}

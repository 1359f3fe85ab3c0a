use crate::helpers::harness::with_test_dbs;
use anyhow::Result;
use dbmt::config::TrackingTable;
use dbmt::migration_tracking::{
    ensure_tracking_table_exists, get_applied_records, get_applied_versions, mark_applied,
    mark_reverted, tracking_table_exists,
};

#[tokio::test]
async fn test_ensure_tracking_table_is_idempotent() -> Result<()> {
    with_test_dbs(&["bookstore"], async |project| {
        let db = project.db("bookstore");
        let table = project.tracking_table();

        assert!(!tracking_table_exists(db.connection(), table).await?);

        ensure_tracking_table_exists(db.connection(), table).await?;
        ensure_tracking_table_exists(db.connection(), table).await?;

        assert!(tracking_table_exists(db.connection(), table).await?);
        assert!(db.table_exists("migration").await);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_missing_table_means_nothing_applied() -> Result<()> {
    with_test_dbs(&["bookstore"], async |project| {
        let db = project.db("bookstore");

        let applied = get_applied_versions(db.connection(), project.tracking_table()).await?;
        assert!(applied.is_empty());
        // Reading must not create the table
        assert!(!db.table_exists("migration").await);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_mark_applied_and_reverted() -> Result<()> {
    with_test_dbs(&["bookstore"], async |project| {
        let db = project.db("bookstore");
        let table = TrackingTable::parse("schema_versions");

        ensure_tracking_table_exists(db.connection(), &table).await?;
        for version in [300, 100, 200] {
            mark_applied(db.pool(), db.connection(), &table, version).await?;
        }
        assert_eq!(
            get_applied_versions(db.connection(), &table).await?,
            vec![100, 200, 300]
        );

        mark_reverted(db.pool(), db.connection(), &table, 200).await?;
        assert_eq!(
            get_applied_versions(db.connection(), &table).await?,
            vec![100, 300]
        );

        let records = get_applied_records(db.connection(), &table).await?;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.applied_at.is_some()));

        // The default table was never touched
        assert!(!db.table_exists("migration").await);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_marking_twice_is_a_tracking_error() -> Result<()> {
    with_test_dbs(&["bookstore"], async |project| {
        let db = project.db("bookstore");
        let table = project.tracking_table();

        ensure_tracking_table_exists(db.connection(), table).await?;
        mark_applied(db.pool(), db.connection(), table, 100).await?;

        let err = mark_applied(db.pool(), db.connection(), table, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, dbmt::MigrationError::Tracking { .. }));

        Ok(())
    })
    .await
}

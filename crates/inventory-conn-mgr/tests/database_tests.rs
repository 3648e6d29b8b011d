//! Integration tests for the connection manager: shared handles per file,
//! writer exclusivity, read pool behavior, migrations, and close semantics.

use std::sync::Arc;
use std::time::Duration;

use inventory_conn_mgr::{Error, SqliteDatabase};
use sqlx::migrate::Migrator;
use tokio::time::timeout;

async fn create_table(db: &SqliteDatabase) {
   let mut writer = db.acquire_writer().await.unwrap();
   sqlx::query("CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
      .execute(&mut *writer)
      .await
      .unwrap();
}

// ============================================================================
// One handle per file
// ============================================================================

#[tokio::test]
async fn test_connect_same_path_returns_same_instance() {
   let dir = tempfile::tempdir().unwrap();
   let path = dir.path().join("shared.db");

   let first = SqliteDatabase::connect(&path, None).await.unwrap();
   let second = SqliteDatabase::connect(&path, None).await.unwrap();

   assert!(Arc::ptr_eq(&first, &second));
   assert!(path.exists(), "database file is created on connect");
}

#[tokio::test]
async fn test_equivalent_paths_share_instance() {
   let dir = tempfile::tempdir().unwrap();
   std::fs::create_dir(dir.path().join("sub")).unwrap();

   let direct = SqliteDatabase::connect(dir.path().join("alias.db"), None)
      .await
      .unwrap();
   let indirect = SqliteDatabase::connect(dir.path().join("sub").join("..").join("alias.db"), None)
      .await
      .unwrap();

   assert!(Arc::ptr_eq(&direct, &indirect));
}

#[tokio::test]
async fn test_different_paths_get_different_instances() {
   let dir = tempfile::tempdir().unwrap();

   let a = SqliteDatabase::connect(dir.path().join("a.db"), None).await.unwrap();
   let b = SqliteDatabase::connect(dir.path().join("b.db"), None).await.unwrap();

   assert!(!Arc::ptr_eq(&a, &b));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connect_yields_single_instance() {
   let dir = tempfile::tempdir().unwrap();
   let path = dir.path().join("race.db");

   let handles: Vec<_> = (0..16)
      .map(|_| {
         let path = path.clone();
         tokio::spawn(async move { SqliteDatabase::connect(path, None).await.unwrap() })
      })
      .collect();

   let mut dbs = Vec::new();
   for handle in handles {
      dbs.push(handle.await.unwrap());
   }

   assert!(dbs.iter().all(|db| Arc::ptr_eq(db, &dbs[0])));
}

#[tokio::test]
async fn test_connect_fails_for_missing_directory() {
   let dir = tempfile::tempdir().unwrap();
   let path = dir.path().join("does-not-exist").join("app.db");

   let err = SqliteDatabase::connect(&path, None).await.unwrap_err();
   assert!(matches!(err, Error::Io(_)));
}

// ============================================================================
// Reads and writes
// ============================================================================

#[tokio::test]
async fn test_writer_is_exclusive() {
   let dir = tempfile::tempdir().unwrap();
   let db = SqliteDatabase::connect(dir.path().join("writer.db"), None)
      .await
      .unwrap();

   let writer = db.acquire_writer().await.unwrap();

   let blocked = timeout(Duration::from_millis(50), db.acquire_writer()).await;
   assert!(blocked.is_err(), "second writer waits while the first is held");

   drop(writer);

   let second = timeout(Duration::from_secs(1), db.acquire_writer()).await;
   assert!(second.is_ok(), "writer is available once released");
}

#[tokio::test]
async fn test_read_pool_sees_committed_writes() {
   let dir = tempfile::tempdir().unwrap();
   let db = SqliteDatabase::connect(dir.path().join("reads.db"), None)
      .await
      .unwrap();
   create_table(&db).await;

   let mut writer = db.acquire_writer().await.unwrap();
   sqlx::query("INSERT INTO widgets (name) VALUES ('bolt')")
      .execute(&mut *writer)
      .await
      .unwrap();
   drop(writer);

   let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM widgets")
      .fetch_all(db.read_pool().unwrap())
      .await
      .unwrap();

   assert_eq!(rows, vec![(1, "bolt".to_string())]);
}

#[tokio::test]
async fn test_read_pool_rejects_writes() {
   let dir = tempfile::tempdir().unwrap();
   let db = SqliteDatabase::connect(dir.path().join("readonly.db"), None)
      .await
      .unwrap();
   create_table(&db).await;

   let result = sqlx::query("INSERT INTO widgets (name) VALUES ('nut')")
      .execute(db.read_pool().unwrap())
      .await;

   assert!(result.is_err(), "read pool connections are read-only");
}

// ============================================================================
// Migrations
// ============================================================================

#[tokio::test]
async fn test_run_migrations_is_idempotent() {
   let dir = tempfile::tempdir().unwrap();
   let migrations = tempfile::tempdir().unwrap();
   std::fs::write(
      migrations.path().join("1_create_widgets.sql"),
      "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
   )
   .unwrap();

   let migrator = Migrator::new(migrations.path().to_path_buf()).await.unwrap();
   let db = SqliteDatabase::connect(dir.path().join("migrate.db"), None)
      .await
      .unwrap();

   db.run_migrations(&migrator).await.unwrap();
   db.run_migrations(&migrator).await.unwrap();

   let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM widgets")
      .fetch_one(db.read_pool().unwrap())
      .await
      .unwrap();
   assert_eq!(count, 0);
}

// ============================================================================
// Close
// ============================================================================

#[tokio::test]
async fn test_closed_database_rejects_operations() {
   let dir = tempfile::tempdir().unwrap();
   let db = SqliteDatabase::connect(dir.path().join("closed.db"), None)
      .await
      .unwrap();

   db.close().await.unwrap();

   assert!(db.is_closed());
   assert!(matches!(db.read_pool(), Err(Error::DatabaseClosed)));
   assert!(matches!(
      db.acquire_writer().await,
      Err(Error::DatabaseClosed)
   ));

   // Closing twice is a no-op
   db.close().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_after_close_opens_fresh_instance() {
   let dir = tempfile::tempdir().unwrap();
   let path = dir.path().join("reopen.db");

   let first = SqliteDatabase::connect(&path, None).await.unwrap();
   create_table(&first).await;
   first.close().await.unwrap();

   let second = SqliteDatabase::connect(&path, None).await.unwrap();
   assert!(!Arc::ptr_eq(&first, &second));

   let (count,): (i64,) = sqlx::query_as(
      "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'widgets'",
   )
   .fetch_one(second.read_pool().unwrap())
   .await
   .unwrap();
   assert_eq!(count, 1, "schema persists across reopen");
}

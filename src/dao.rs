//! The `items` table access object.

use std::future::Future;

use inventory_observer::{ObservableSqliteDatabase, ObservableWriteGuard, TableChangeStream};
use tokio::runtime::Handle;
use tracing::debug;

use crate::error::Result;
use crate::item::Item;
use crate::live::LiveQuery;

/// Name of the table holding [`Item`] rows.
pub const ITEMS_TABLE: &str = "items";

const SELECT_ITEM: &str = "SELECT id, name, price, quantity FROM items WHERE id = ?1";
const SELECT_ALL_ITEMS: &str = "SELECT id, name, price, quantity FROM items ORDER BY name ASC";

/// Reads and writes [`Item`] rows.
///
/// Mutations are async: they wait for the single write connection and run
/// the statement on that connection's worker thread, so the calling task is
/// suspended rather than blocked. Each mutation is one autocommit statement;
/// concurrent writes to the same row are applied in writer order and the
/// last one wins. A mutation whose future is dropped before it resolves
/// still runs to completion, and its change still reaches live queries.
///
/// Obtain one from [`InventoryDatabase::item_dao`](crate::InventoryDatabase::item_dao).
#[derive(Debug, Clone)]
pub struct ItemDao {
   observable: ObservableSqliteDatabase,
   runtime: Handle,
   live_query_buffer: usize,
}

impl ItemDao {
   pub(crate) fn new(
      observable: ObservableSqliteDatabase,
      runtime: Handle,
      live_query_buffer: usize,
   ) -> Self {
      Self {
         observable,
         runtime,
         live_query_buffer,
      }
   }

   /// Inserts `item`, ignoring it if its id is already taken.
   ///
   /// An `id` of `0` lets SQLite assign the next one. Returns the id of the
   /// new row, or `None` when the insert was ignored because of a conflict.
   pub async fn insert(&self, item: &Item) -> Result<Option<i64>> {
      let item = item.clone();
      let id = item.id;
      let result = self
         .write(move |mut writer| async move {
            let result = sqlx::query(
               "INSERT OR IGNORE INTO items (id, name, price, quantity) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(item.assigned_id())
            .bind(&item.name)
            .bind(item.price)
            .bind(item.quantity)
            .execute(&mut *writer)
            .await?;
            Ok(result)
         })
         .await?;

      if result.rows_affected() == 0 {
         debug!(id, "Insert ignored, id already present");
         return Ok(None);
      }
      Ok(Some(result.last_insert_rowid()))
   }

   /// Replaces every column of the row whose id matches `item.id`.
   ///
   /// Returns the number of rows changed: `0` when no row has that id.
   pub async fn update(&self, item: &Item) -> Result<u64> {
      let item = item.clone();
      let id = item.id;
      let result = self
         .write(move |mut writer| async move {
            let result =
               sqlx::query("UPDATE items SET name = ?1, price = ?2, quantity = ?3 WHERE id = ?4")
                  .bind(&item.name)
                  .bind(item.price)
                  .bind(item.quantity)
                  .bind(item.id)
                  .execute(&mut *writer)
                  .await?;
            Ok(result)
         })
         .await?;

      if result.rows_affected() == 0 {
         debug!(id, "Update matched no row");
      }
      Ok(result.rows_affected())
   }

   /// Deletes the row whose id matches `item.id`.
   ///
   /// Returns the number of rows removed: `0` when no row has that id.
   pub async fn delete(&self, item: &Item) -> Result<u64> {
      let id = item.id;
      let result = self
         .write(move |mut writer| async move {
            let result = sqlx::query("DELETE FROM items WHERE id = ?1")
               .bind(id)
               .execute(&mut *writer)
               .await?;
            Ok(result)
         })
         .await?;

      if result.rows_affected() == 0 {
         debug!(id, "Delete matched no row");
      }
      Ok(result.rows_affected())
   }

   /// Runs `op` with the writer on a task of its own.
   ///
   /// Dropping the returned future detaches the task instead of cancelling
   /// it: the statement always finishes and the guard is released after it,
   /// so a committed change is always published.
   async fn write<T, F, Fut>(&self, op: F) -> Result<T>
   where
      F: FnOnce(ObservableWriteGuard) -> Fut + Send + 'static,
      Fut: Future<Output = Result<T>> + Send + 'static,
      T: Send + 'static,
   {
      let observable = self.observable.clone();
      let task = self.runtime.spawn(async move {
         let writer = observable.acquire_writer().await?;
         op(writer).await
      });
      task.await?
   }

   /// Live view of the item with `id`.
   ///
   /// Emits the current row, then the row again after each committed change
   /// to it. Emits nothing while no such row exists.
   pub fn get_item(&self, id: i64) -> LiveQuery<Item> {
      let changes = self.items_changes().filter_rowids(vec![id]);
      let observable = self.observable.clone();

      LiveQuery::spawn(
         &self.runtime,
         "get_item",
         changes,
         self.live_query_buffer,
         move || {
            let observable = observable.clone();
            async move { fetch_item(&observable, id).await }
         },
      )
   }

   /// Live view of all items ordered by name (SQLite's default `BINARY`
   /// collation; equal names in unspecified order).
   ///
   /// Emits the current list, then a new list after every committed insert,
   /// update, or delete on the table.
   pub fn get_all_items(&self) -> LiveQuery<Vec<Item>> {
      let changes = self.items_changes();
      let observable = self.observable.clone();

      LiveQuery::spawn(
         &self.runtime,
         "get_all_items",
         changes,
         self.live_query_buffer,
         move || {
            let observable = observable.clone();
            async move { fetch_all_items(&observable).await.map(Some) }
         },
      )
   }

   fn items_changes(&self) -> TableChangeStream {
      self.observable.subscribe_stream([ITEMS_TABLE])
   }
}

async fn fetch_item(observable: &ObservableSqliteDatabase, id: i64) -> Result<Option<Item>> {
   let item = sqlx::query_as::<_, Item>(SELECT_ITEM)
      .bind(id)
      .fetch_optional(observable.read_pool()?)
      .await?;
   Ok(item)
}

async fn fetch_all_items(observable: &ObservableSqliteDatabase) -> Result<Vec<Item>> {
   let items = sqlx::query_as::<_, Item>(SELECT_ALL_ITEMS)
      .fetch_all(observable.read_pool()?)
      .await?;
   Ok(items)
}

#[cfg(test)]
mod tests {
   use std::time::Duration;

   use futures::StreamExt;
   use tempfile::TempDir;
   use tokio::time::timeout;

   use super::*;
   use crate::config::InventoryDatabaseConfig;
   use crate::context::AppContext;
   use crate::database::InventoryDatabase;

   const WAIT: Duration = Duration::from_secs(5);
   const QUIET: Duration = Duration::from_millis(150);

   async fn create_test_db() -> (InventoryDatabase, TempDir) {
      let temp = TempDir::new().expect("Failed to create temp directory");
      let ctx = AppContext::new(temp.path());
      let db = InventoryDatabase::open(&ctx, InventoryDatabaseConfig::default())
         .await
         .expect("Failed to open test database");

      (db, temp)
   }

   fn sugar() -> Item {
      Item::new("Sugar", 2.50, 10).with_id(1)
   }

   fn apple() -> Item {
      Item::new("Apple", 0.99, 50).with_id(2)
   }

   async fn next<T>(query: &mut LiveQuery<T>) -> T {
      timeout(WAIT, query.next())
         .await
         .expect("live query should emit")
         .expect("live query ended early")
         .expect("live query failed")
   }

   async fn assert_quiet<T: std::fmt::Debug>(query: &mut LiveQuery<T>) {
      let result = timeout(QUIET, query.next()).await;
      assert!(result.is_err(), "unexpected emission: {result:?}");
   }

   async fn all_items(dao: &ItemDao) -> Vec<Item> {
      let mut query = dao.get_all_items();
      next(&mut query).await
   }

   fn names(items: &[Item]) -> Vec<&str> {
      items.iter().map(|item| item.name.as_str()).collect()
   }

   // ============================================================================
   // Mutations
   // ============================================================================

   #[tokio::test]
   async fn test_insert_assigns_id_when_unset() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();

      let first = dao.insert(&Item::new("Flour", 1.25, 3)).await.unwrap();
      let second = dao.insert(&Item::new("Salt", 0.5, 7)).await.unwrap();

      assert_eq!((first, second), (Some(1), Some(2)));
      let items = all_items(&dao).await;
      assert_eq!(items[0], Item::new("Flour", 1.25, 3).with_id(1));
   }

   #[tokio::test]
   async fn test_insert_conflict_keeps_original() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();

      assert_eq!(dao.insert(&sugar()).await.unwrap(), Some(1));

      let duplicate = Item::new("Duplicate", 9.99, 1).with_id(1);
      assert_eq!(dao.insert(&duplicate).await.unwrap(), None);

      let mut query = dao.get_item(1);
      assert_eq!(next(&mut query).await, sugar());
   }

   #[tokio::test]
   async fn test_update_replaces_all_fields() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      dao.insert(&sugar()).await.unwrap();

      let restocked = Item::new("Brown Sugar", 3.10, 25).with_id(1);
      assert_eq!(dao.update(&restocked).await.unwrap(), 1);

      assert_eq!(all_items(&dao).await, vec![restocked]);
   }

   #[tokio::test]
   async fn test_update_missing_id_changes_nothing() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      dao.insert(&sugar()).await.unwrap();

      let ghost = Item::new("Ghost", 1.0, 1).with_id(99);
      assert_eq!(dao.update(&ghost).await.unwrap(), 0);

      assert_eq!(all_items(&dao).await, vec![sugar()]);
   }

   #[tokio::test]
   async fn test_delete_removes_row() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      dao.insert(&sugar()).await.unwrap();
      dao.insert(&apple()).await.unwrap();

      assert_eq!(dao.delete(&sugar()).await.unwrap(), 1);

      assert_eq!(all_items(&dao).await, vec![apple()]);
   }

   #[tokio::test]
   async fn test_delete_missing_row_changes_nothing() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      dao.insert(&sugar()).await.unwrap();

      let missing = Item::new("Nothing", 0.0, 0).with_id(99);
      assert_eq!(dao.delete(&missing).await.unwrap(), 0);

      assert_eq!(all_items(&dao).await, vec![sugar()]);
   }

   #[tokio::test]
   async fn test_failed_mutation_surfaces_error() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      db.observable().inner().close().await.unwrap();

      let err = dao.insert(&sugar()).await.unwrap_err();
      assert_eq!(err.error_code(), "DATABASE_CLOSED");
   }

   #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
   async fn test_concurrent_inserts_are_serialized() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();

      let handles: Vec<_> = (0..20)
         .map(|i| {
            let dao = dao.clone();
            tokio::spawn(async move { dao.insert(&Item::new(format!("item-{i:02}"), 1.0, i)).await })
         })
         .collect();

      for handle in handles {
         assert!(handle.await.unwrap().unwrap().is_some());
      }

      let items = all_items(&dao).await;
      assert_eq!(items.len(), 20);
      let mut ids: Vec<i64> = items.iter().map(|item| item.id).collect();
      ids.sort_unstable();
      assert_eq!(ids, (1..=20).collect::<Vec<_>>());
   }

   #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
   async fn test_dropped_mutation_still_reaches_live_query() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();

      let mut query = dao.get_all_items();
      assert!(next(&mut query).await.is_empty());

      for i in 0..50 {
         let item = Item::new(format!("item-{i:02}"), 1.0, i);
         // Usually gives up while the insert is still running
         let _ = timeout(Duration::from_micros(200), dao.insert(&item)).await;

         let expected = i as usize + 1;
         timeout(WAIT, async {
            while next(&mut query).await.len() != expected {}
         })
         .await
         .unwrap_or_else(|_| panic!("insert {i} committed but was never observed"));
      }

      assert_eq!(all_items(&dao).await.len(), 50);
   }

   // ============================================================================
   // Live queries
   // ============================================================================

   #[tokio::test]
   async fn test_all_items_ordered_by_name() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      dao.insert(&sugar()).await.unwrap();
      dao.insert(&apple()).await.unwrap();

      let mut query = dao.get_all_items();
      assert_eq!(next(&mut query).await, vec![apple(), sugar()]);

      dao.insert(&Item::new("Milk", 1.2, 4)).await.unwrap();
      dao.insert(&Item::new("Bread", 2.0, 2)).await.unwrap();

      // The two inserts may arrive as one or two snapshots
      let mut items = next(&mut query).await;
      if items.len() == 3 {
         items = next(&mut query).await;
      }
      assert_eq!(names(&items), vec!["Apple", "Bread", "Milk", "Sugar"]);
   }

   #[tokio::test]
   async fn test_all_items_tracks_every_mutation() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();

      let mut query = dao.get_all_items();
      assert!(next(&mut query).await.is_empty(), "initial snapshot of empty table");

      dao.insert(&sugar()).await.unwrap();
      assert_eq!(next(&mut query).await, vec![sugar()]);

      let updated = Item::new("Sugar", 2.75, 8).with_id(1);
      dao.update(&updated).await.unwrap();
      assert_eq!(next(&mut query).await, vec![updated.clone()]);

      dao.delete(&updated).await.unwrap();
      assert!(next(&mut query).await.is_empty());
   }

   #[tokio::test]
   async fn test_ignored_writes_do_not_emit() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      dao.insert(&sugar()).await.unwrap();

      let mut query = dao.get_all_items();
      next(&mut query).await;

      dao.insert(&sugar()).await.unwrap();
      dao.update(&apple()).await.unwrap();
      dao.delete(&apple()).await.unwrap();

      assert_quiet(&mut query).await;
   }

   #[tokio::test]
   async fn test_get_item_waits_for_row() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();

      let mut query = dao.get_item(1);
      assert_quiet(&mut query).await;

      dao.insert(&sugar()).await.unwrap();
      assert_eq!(next(&mut query).await, sugar());
   }

   #[tokio::test]
   async fn test_get_item_ignores_other_rows() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      dao.insert(&sugar()).await.unwrap();

      let mut query = dao.get_item(1);
      assert_eq!(next(&mut query).await, sugar());

      dao.insert(&apple()).await.unwrap();
      dao.update(&Item::new("Green Apple", 1.05, 40).with_id(2))
         .await
         .unwrap();
      assert_quiet(&mut query).await;

      let updated = Item::new("Sugar", 2.60, 9).with_id(1);
      dao.update(&updated).await.unwrap();
      assert_eq!(next(&mut query).await, updated);
   }

   #[tokio::test]
   async fn test_cancel_stops_only_that_query() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      let broker = db.observable().broker().clone();
      let baseline = broker.subscriber_count();

      let mut kept = dao.get_all_items();
      let mut cancelled = dao.get_all_items();
      next(&mut kept).await;
      next(&mut cancelled).await;
      assert_eq!(broker.subscriber_count(), baseline + 2);

      cancelled.cancel();

      // The aborted task drops its subscription on its next poll
      timeout(WAIT, async {
         while broker.subscriber_count() != baseline + 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
         }
      })
      .await
      .expect("cancelled query should release its subscription");

      dao.insert(&sugar()).await.unwrap();
      assert_eq!(next(&mut kept).await, vec![sugar()]);
   }

   #[tokio::test]
   async fn test_query_failure_ends_stream() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      db.observable().inner().close().await.unwrap();

      let mut query = dao.get_all_items();

      let first = timeout(WAIT, query.next()).await.unwrap();
      let err = first.expect("an error item").unwrap_err();
      assert_eq!(err.error_code(), "DATABASE_CLOSED");

      assert!(timeout(WAIT, query.next()).await.unwrap().is_none());
   }

   #[tokio::test]
   async fn test_live_query_can_be_created_off_runtime() {
      let (db, _temp) = create_test_db().await;
      let dao = db.item_dao();
      dao.insert(&sugar()).await.unwrap();

      // e.g. a UI thread that is not part of the runtime
      let mut query = std::thread::spawn(move || dao.get_all_items())
         .join()
         .unwrap();

      assert_eq!(next(&mut query).await, vec![sugar()]);
   }
}

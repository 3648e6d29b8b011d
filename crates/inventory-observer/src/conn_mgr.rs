//! Observation for databases managed by `inventory-conn-mgr`.
//!
//! # Example
//!
//! ```no_run
//! use inventory_conn_mgr::SqliteDatabase;
//! use inventory_observer::{ObservableSqliteDatabase, ObserverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!    let db = SqliteDatabase::connect("inventory.db", None).await?;
//!    let config = ObserverConfig::new().with_tables(["items"]);
//!    let observable = ObservableSqliteDatabase::new(db, config);
//!
//!    let mut rx = observable.subscribe(["items"]);
//!
//!    let mut writer = observable.acquire_writer().await?;
//!    sqlx::query("INSERT INTO items (name, price, quantity) VALUES (?1, ?2, ?3)")
//!       .bind("Sugar")
//!       .bind(2.5)
//!       .bind(10)
//!       .execute(&mut *writer)
//!       .await?;
//!    drop(writer);
//!    // The committed insert is published once the writer is released
//!
//!    let change = rx.recv().await?;
//!    assert_eq!(change.table, "items");
//!    Ok(())
//! }
//! ```

use std::ffi::c_void;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use inventory_conn_mgr::{SqliteDatabase, WriteGuard};
use libsqlite3_sys::sqlite3;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Pool, Sqlite};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::Result;
use crate::broker::ObservationBroker;
use crate::change::TableChange;
use crate::config::ObserverConfig;
use crate::hooks;
use crate::schema::query_table_info;
use crate::stream::{TableChangeStream, TableChangeStreamExt};

/// Wrapper around `SqliteDatabase` that provides change observation.
///
/// Changes made through [`acquire_writer`](Self::acquire_writer) are
/// tracked; reads through the read pool are unaffected. Clones share the
/// same broker, so a subscriber on one clone sees writes made through any.
#[derive(Debug)]
pub struct ObservableSqliteDatabase {
   db: Arc<SqliteDatabase>,
   broker: Arc<ObservationBroker>,
}

impl ObservableSqliteDatabase {
   /// Create a new observable database wrapper.
   ///
   /// # Arguments
   ///
   /// * `db` - The `SqliteDatabase` instance to observe
   /// * `config` - Observer configuration specifying which tables to track
   pub fn new(db: Arc<SqliteDatabase>, config: ObserverConfig) -> Self {
      let broker = ObservationBroker::new(config.channel_capacity);

      if !config.tables.is_empty() {
         broker.observe_tables(config.tables.iter().map(String::as_str));
      }

      Self { db, broker }
   }

   /// Subscribe to change notifications.
   ///
   /// The given tables are added to the observed set. The receiver gets
   /// every published change, including those for other observed tables.
   pub fn subscribe<I, S>(&self, tables: I) -> broadcast::Receiver<TableChange>
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      let tables: Vec<String> = tables.into_iter().map(Into::into).collect();
      if !tables.is_empty() {
         self
            .broker
            .observe_tables(tables.iter().map(String::as_str));
      }
      self.broker.subscribe()
   }

   /// Subscribe and get a `Stream` limited to the given tables.
   ///
   /// An empty table list yields changes for every observed table.
   pub fn subscribe_stream<I, S>(&self, tables: I) -> TableChangeStream
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      let tables: Vec<String> = tables.into_iter().map(Into::into).collect();
      if !tables.is_empty() {
         self
            .broker
            .observe_tables(tables.iter().map(String::as_str));
      }
      let stream = self.broker.subscribe().into_stream();
      if tables.is_empty() {
         stream
      } else {
         stream.filter_tables(tables)
      }
   }

   /// Get a reference to the read-only connection pool.
   pub fn read_pool(&self) -> inventory_conn_mgr::Result<&Pool<Sqlite>> {
      self.db.read_pool()
   }

   /// Acquire an observable write guard.
   ///
   /// The returned guard has observation hooks registered. Changes are
   /// published to subscribers when the guard is dropped, for every
   /// transaction that committed while it was held.
   ///
   /// On first acquisition for each table, queries the schema to determine
   /// whether its primary key aliases the rowid.
   pub async fn acquire_writer(&self) -> Result<ObservableWriteGuard> {
      let writer = self.db.acquire_writer().await?;

      let mut observable = ObservableWriteGuard {
         writer,
         broker: Arc::clone(&self.broker),
         hooks: None,
      };

      self.ensure_table_info().await?;

      observable.register_hooks().await?;
      Ok(observable)
   }

   /// Ensures TableInfo is set for all observed tables that exist.
   async fn ensure_table_info(&self) -> Result<()> {
      let tables_to_query: Vec<String> = self
         .broker
         .get_observed_tables()
         .into_iter()
         .filter(|table| self.broker.get_table_info(table).is_none())
         .collect();

      if tables_to_query.is_empty() {
         return Ok(());
      }

      let pool = self.db.read_pool()?;
      let mut conn = pool.acquire().await?;

      for table in tables_to_query {
         match query_table_info(&mut conn, &table).await {
            Ok(Some(info)) => {
               if info.without_rowid {
                  warn!(table = %table, "WITHOUT ROWID table changes cannot be observed");
               }
               debug!(table = %table, rowid_alias = info.rowid_alias, without_rowid = info.without_rowid, "Queried table info");
               self.broker.set_table_info(&table, info);
            }
            Ok(None) => {
               debug!(table = %table, "Observed table not found in schema yet");
            }
            Err(e) => {
               warn!(table = %table, error = %e, "Failed to query table info");
            }
         }
      }

      Ok(())
   }

   /// Get the underlying `SqliteDatabase`.
   pub fn inner(&self) -> &Arc<SqliteDatabase> {
      &self.db
   }

   /// Get the list of currently observed tables.
   pub fn observed_tables(&self) -> Vec<String> {
      self.broker.get_observed_tables()
   }

   /// Returns a reference to the underlying observation broker.
   pub fn broker(&self) -> &Arc<ObservationBroker> {
      &self.broker
   }
}

impl Clone for ObservableSqliteDatabase {
   fn clone(&self) -> Self {
      Self {
         db: Arc::clone(&self.db),
         broker: Arc::clone(&self.broker),
      }
   }
}

/// Raw handles cached while hooks are installed.
struct RegisteredHooks {
   db: *mut sqlite3,
   ctx: *mut c_void,
}

/// RAII guard for observable write access to the database.
///
/// Wraps a `WriteGuard` and adds change tracking via SQLite hooks. On drop
/// the hooks are removed, uncommitted changes are discarded, and committed
/// changes are published.
///
/// Do not drop the guard while a statement future on it is still pending.
/// SQLx keeps running such a statement on its worker thread, so it would
/// commit after the hooks are gone and never be published. Callers that may
/// be cancelled should hold the guard inside a spawned task.
#[must_use = "if unused, the write lock is immediately released"]
pub struct ObservableWriteGuard {
   writer: WriteGuard,
   broker: Arc<ObservationBroker>,
   hooks: Option<RegisteredHooks>,
}

// SAFETY: The raw pointers are only used to register and unregister hooks
// and are always accessed from the guard's single owner. The underlying
// sqlite3 connection is already Send via sqlx's PoolConnection.
unsafe impl Send for ObservableWriteGuard {}

impl ObservableWriteGuard {
   /// Registers SQLite observation hooks on this writer.
   async fn register_hooks(&mut self) -> Result<()> {
      if self.hooks.is_some() {
         return Ok(());
      }

      let mut handle = self
         .writer
         .lock_handle()
         .await
         .map_err(|e| crate::Error::Database(format!("Failed to lock connection handle: {}", e)))?;

      let db: *mut sqlite3 = handle.as_raw_handle().as_ptr();

      // SAFETY: the handle is locked, so no statement is running, and the
      // connection stays open for as long as this guard owns the writer.
      let ctx = unsafe { hooks::register_hooks(db, Arc::clone(&self.broker))? };

      self.hooks = Some(RegisteredHooks { db, ctx });
      trace!("Observation hooks registered on writer");
      Ok(())
   }

   /// Publishes changes committed so far without releasing the writer.
   ///
   /// Useful when a guard is held across several transactions.
   pub fn publish_committed(&self) -> usize {
      self.broker.publish_committed()
   }
}

impl Drop for ObservableWriteGuard {
   fn drop(&mut self) {
      if let Some(RegisteredHooks { db, ctx }) = self.hooks.take() {
         // SAFETY: db and ctx come from register_hooks on the connection we
         // still own, and take() guarantees a single unregistration.
         unsafe {
            hooks::unregister_hooks(db, ctx);
         }
      }

      // Anything still pending belongs to a transaction left open on the
      // connection; it has not committed.
      self.broker.discard_pending();
      self.broker.publish_committed();
   }
}

impl Deref for ObservableWriteGuard {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      &self.writer
   }
}

impl DerefMut for ObservableWriteGuard {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.writer
   }
}

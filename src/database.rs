//! The process-wide inventory database handle.

use std::sync::Arc;

use inventory_conn_mgr::SqliteDatabase;
use inventory_observer::{ObservableSqliteDatabase, ObserverConfig};
use sqlx::migrate::Migrator;
use tokio::runtime::Handle;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::InventoryDatabaseConfig;
use crate::context::StorageContext;
use crate::dao::{ITEMS_TABLE, ItemDao};
use crate::error::Result;

/// Schema version 1: the `items` table.
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// The one database handle of this process.
///
/// Unset until the first successful [`InventoryDatabase::get_database`].
/// A failed initialization leaves it unset so a later call can retry.
static INSTANCE: OnceCell<Arc<InventoryDatabase>> = OnceCell::const_new();

/// Handle to the inventory database.
///
/// There is at most one per process, created lazily by
/// [`get_database`](Self::get_database) and kept for the rest of the
/// process. Hand out [`ItemDao`]s with [`item_dao`](Self::item_dao).
#[derive(Debug)]
pub struct InventoryDatabase {
   observable: ObservableSqliteDatabase,
   runtime: Handle,
   live_query_buffer: usize,
}

impl InventoryDatabase {
   /// Returns the process-wide database, opening it on first use.
   ///
   /// Concurrent first callers race safely: exactly one opens the file and
   /// all of them receive the same instance. Once open, `ctx` is ignored.
   ///
   /// # Errors
   ///
   /// Fails if the file cannot be located, created, or migrated. Nothing is
   /// kept from a failed attempt, so the next call tries again.
   pub async fn get_database(ctx: &impl StorageContext) -> Result<Arc<Self>> {
      Self::get_database_with_config(ctx, InventoryDatabaseConfig::default()).await
   }

   /// Like [`get_database`](Self::get_database), with explicit configuration
   /// for the call that ends up opening the database.
   pub async fn get_database_with_config(
      ctx: &impl StorageContext,
      config: InventoryDatabaseConfig,
   ) -> Result<Arc<Self>> {
      // Lock-free fast path once the instance is published
      if let Some(db) = INSTANCE.get() {
         return Ok(Arc::clone(db));
      }

      // Slow path: the cell serializes initializers and re-checks before
      // running ours, so only one caller ever opens the file.
      let db = INSTANCE
         .get_or_try_init(|| async move {
            match Self::open(ctx, config).await {
               Ok(db) => {
                  info!("Inventory database initialized");
                  Ok(Arc::new(db))
               }
               Err(e) => {
                  warn!(error = %e, "Inventory database initialization failed");
                  Err(e)
               }
            }
         })
         .await?;

      Ok(Arc::clone(db))
   }

   /// Opens the database described by `ctx` and `config` and applies migrations.
   ///
   /// Not part of the public surface: outside of tests every caller goes
   /// through the process-wide instance.
   pub(crate) async fn open(
      ctx: &impl StorageContext,
      config: InventoryDatabaseConfig,
   ) -> Result<Self> {
      let runtime = Handle::try_current()?;
      let path = ctx.database_path(&config.database_name)?;
      debug!(path = %path.display(), "Opening inventory database");

      let db = SqliteDatabase::connect(&path, Some(config.pool)).await?;
      db.run_migrations(&MIGRATOR).await?;

      let observer_config = ObserverConfig::new()
         .with_tables([ITEMS_TABLE])
         .with_channel_capacity(config.channel_capacity);

      Ok(Self {
         observable: ObservableSqliteDatabase::new(db, observer_config),
         runtime,
         live_query_buffer: config.live_query_buffer,
      })
   }

   /// Access object for the `items` table.
   pub fn item_dao(&self) -> ItemDao {
      ItemDao::new(
         self.observable.clone(),
         self.runtime.clone(),
         self.live_query_buffer,
      )
   }

   #[cfg(test)]
   pub(crate) fn observable(&self) -> &ObservableSqliteDatabase {
      &self.observable
   }
}

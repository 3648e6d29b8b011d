//! Settings for opening the inventory database.

use inventory_conn_mgr::SqliteDatabaseConfig;
use serde::Deserialize;

/// File name of the inventory database inside the storage location.
pub const DATABASE_NAME: &str = "item_database";

/// Configuration for [`InventoryDatabase`](crate::InventoryDatabase).
///
/// Only the configuration passed by the call that opens the process-wide
/// instance takes effect.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InventoryDatabaseConfig {
   /// Database file name. Default: `item_database`
   pub database_name: String,

   /// Connection pool settings.
   pub pool: SqliteDatabaseConfig,

   /// Change notifications buffered per live query before it falls behind
   /// and re-reads. Default: 256
   pub channel_capacity: usize,

   /// Snapshots a live query may buffer ahead of its consumer. Default: 16
   pub live_query_buffer: usize,
}

impl Default for InventoryDatabaseConfig {
   fn default() -> Self {
      Self {
         database_name: DATABASE_NAME.to_string(),
         pool: SqliteDatabaseConfig::default(),
         channel_capacity: 256,
         live_query_buffer: 16,
      }
   }
}

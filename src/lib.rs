//! Persistence for inventory [`Item`]s.
//!
//! A single SQLite database per process, opened on first use:
//!
//! ```no_run
//! use futures::StreamExt;
//! use inventory_store::{AppContext, InventoryDatabase, Item};
//!
//! # async fn run() -> inventory_store::Result<()> {
//! let ctx = AppContext::new("/data/app/databases");
//! let db = InventoryDatabase::get_database(&ctx).await?;
//! let dao = db.item_dao();
//!
//! dao.insert(&Item::new("Sugar", 2.50, 10)).await?;
//!
//! let mut items = dao.get_all_items();
//! while let Some(snapshot) = items.next().await {
//!    println!("{} items", snapshot?.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Writes go through one serialized connection; reads use a separate pool
//! of read-only connections. Live queries re-run whenever a write to the
//! `items` table commits.

mod config;
mod context;
mod dao;
mod database;
mod error;
mod item;
mod live;

pub use config::{DATABASE_NAME, InventoryDatabaseConfig};
pub use context::{AppContext, StorageContext};
pub use dao::{ITEMS_TABLE, ItemDao};
pub use database::InventoryDatabase;
pub use error::{Error, Result};
pub use inventory_conn_mgr::SqliteDatabaseConfig;
pub use item::Item;
pub use live::LiveQuery;

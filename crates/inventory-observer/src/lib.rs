//! # inventory-observer
//!
//! Change notifications for SQLite databases managed by `inventory-conn-mgr`.
//!
//! SQLite's update, commit, and rollback hooks are registered on the write
//! connection while an [`ObservableWriteGuard`] is held. Row changes are
//! buffered per transaction, dropped on rollback, and broadcast to
//! subscribers once the transaction has committed and the writer has been
//! released.
//!
//! Only tables registered for observation produce notifications. Tables
//! created `WITHOUT ROWID` are never reported by SQLite's update hook.

mod broker;
mod change;
mod config;
mod conn_mgr;
mod error;
mod hooks;
mod schema;
mod stream;

pub use broker::ObservationBroker;
pub use change::{ChangeOperation, TableChange, TableChangeEvent, TableInfo};
pub use config::ObserverConfig;
pub use conn_mgr::{ObservableSqliteDatabase, ObservableWriteGuard};
pub use error::Error;
pub use stream::{TableChangeStream, TableChangeStreamExt};

/// A type alias for Results with this crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

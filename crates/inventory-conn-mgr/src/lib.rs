//! # inventory-conn-mgr
//!
//! A thin wrapper around SQLx for SQLite that enforces the connection policy
//! the inventory store relies on.
//!
//! ## Core Types
//!
//! - **[`SqliteDatabase`]**: Main database type with separate read and write connection pools
//! - **[`SqliteDatabaseConfig`]**: Configuration for connection pool settings
//! - **[`WriteGuard`]**: RAII guard ensuring exclusive write access
//! - **[`Error`]**: Error type for database operations
//!
//! ## Architecture
//!
//! - **One handle per file**: connecting twice to the same path returns the same `Arc`
//! - **Dual pools**: Separate read-only pool and a write pool capped at one connection
//! - **Exclusive writes**: The single write connection serializes writes in acquisition order
//! - **Concurrent reads**: Readers query WAL snapshots without blocking the writer

mod config;
mod database;
mod error;
mod write_guard;

pub use config::SqliteDatabaseConfig;
pub use database::SqliteDatabase;
pub use error::{Error, Result};
pub use write_guard::WriteGuard;

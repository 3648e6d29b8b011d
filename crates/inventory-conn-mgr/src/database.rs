//! SQLite database with connection pooling and a single serialized writer

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SqliteDatabaseConfig;
use crate::error::{Error, Result};
use crate::write_guard::WriteGuard;

/// Open databases keyed by canonical file path.
///
/// Entries are weak so that a database nobody references any more is torn
/// down normally; the next `connect` for that path opens a fresh instance.
/// The async mutex is held across pool creation, which makes "look up or
/// open" atomic per process.
static REGISTRY: LazyLock<Mutex<HashMap<PathBuf, Weak<SqliteDatabase>>>> =
   LazyLock::new(|| Mutex::new(HashMap::new()));

/// SQLite database with connection pooling for concurrent reads and exclusive writes.
///
/// ## Architecture
///
/// The database maintains two connection pools:
/// - **`read_pool`**: Pool of read-only connections for concurrent reads
/// - **`write_conn`**: Single-connection pool for exclusive write access (enforced by max_connections=1)
///
/// ## State Management
///
/// - **`closed`**: Prevents use after the database has been closed
/// - **`path`**: Canonical database file path (registry key)
///
/// ## Usage Pattern
///
/// ```text
/// 1. Connect to database (creates or reuses the shared instance for the path)
/// 2. Read operations: Access read_pool for concurrent reads
/// 3. Write operations: Acquire writer; other writers wait until it is dropped
/// ```
#[derive(Debug)]
pub struct SqliteDatabase {
   /// Pool of read-only connections (defaults to max_connections=6) for concurrent reads
   read_pool: Pool<Sqlite>,

   /// Single read-write connection pool (max_connections=1) for serialized writes
   write_conn: Pool<Sqlite>,

   /// Marks database as closed to prevent further operations
   closed: AtomicBool,

   /// Canonical path to the database file
   path: PathBuf,
}

impl SqliteDatabase {
   /// Connect to the SQLite database at `path`, creating the file if needed.
   ///
   /// Every call for the same file returns the same `Arc` for as long as the
   /// previous instance is alive and open. `config` only applies when a new
   /// instance is created.
   ///
   /// # Errors
   ///
   /// - [`Error::Io`] if the parent directory does not exist or cannot be resolved
   /// - [`Error::Sqlx`] if the file cannot be opened or created
   pub async fn connect(
      path: impl AsRef<Path>,
      config: Option<SqliteDatabaseConfig>,
   ) -> Result<Arc<Self>> {
      let path = canonical_path(path.as_ref())?;
      let mut registry = REGISTRY.lock().await;

      if let Some(existing) = registry.get(&path).and_then(Weak::upgrade)
         && !existing.is_closed()
      {
         debug!(path = %path.display(), "Reusing open database");
         return Ok(existing);
      }

      registry.retain(|_, db| db.strong_count() > 0);

      let config = config.unwrap_or_default();
      let db = Arc::new(Self::open(path.clone(), &config).await?);
      registry.insert(path, Arc::downgrade(&db));

      Ok(db)
   }

   async fn open(path: PathBuf, config: &SqliteDatabaseConfig) -> Result<Self> {
      // The writer goes first: it creates the file and switches it to WAL,
      // which read-only connections cannot do themselves.
      let write_options = SqliteConnectOptions::new()
         .filename(&path)
         .create_if_missing(true)
         .journal_mode(SqliteJournalMode::Wal)
         .busy_timeout(config.busy_timeout);

      let write_conn = SqlitePoolOptions::new()
         .max_connections(1)
         .min_connections(1)
         .idle_timeout(None)
         .connect_with(write_options)
         .await?;

      let read_options = SqliteConnectOptions::new()
         .filename(&path)
         .read_only(true)
         .busy_timeout(config.busy_timeout);

      let read_pool = SqlitePoolOptions::new()
         .max_connections(config.max_read_connections)
         .idle_timeout(config.idle_timeout)
         .connect_with(read_options)
         .await?;

      info!(
         path = %path.display(),
         max_read_connections = config.max_read_connections,
         "Opened SQLite database"
      );

      Ok(Self {
         read_pool,
         write_conn,
         closed: AtomicBool::new(false),
         path,
      })
   }

   /// Get a reference to the read-only connection pool.
   pub fn read_pool(&self) -> Result<&Pool<Sqlite>> {
      self.ensure_open()?;
      Ok(&self.read_pool)
   }

   /// Acquire exclusive write access.
   ///
   /// Waits until any other holder of the write connection releases it.
   pub async fn acquire_writer(&self) -> Result<WriteGuard> {
      self.ensure_open()?;
      let conn = self.write_conn.acquire().await?;
      Ok(WriteGuard::new(conn))
   }

   /// Apply any migrations from `migrator` that have not run yet.
   ///
   /// Runs on the write connection, so it is serialized with every other write.
   pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
      let mut writer = self.acquire_writer().await?;
      // `run_direct` sidesteps sqlx's "`Acquire` is not general enough"
      // error when this future is required to be `Send`; `run` would only
      // acquire the same connection and forward to it.
      migrator.run_direct(&mut *writer).await?;
      debug!(path = %self.path.display(), "Migrations applied");
      Ok(())
   }

   /// Canonical path of the database file.
   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Returns true once [`close`](Self::close) has been called.
   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::Acquire)
   }

   /// Close both pools and release the registry entry for this path.
   ///
   /// Waits for checked-out connections to be returned. Subsequent calls to
   /// `read_pool` or `acquire_writer` fail with [`Error::DatabaseClosed`].
   pub async fn close(&self) -> Result<()> {
      if self.closed.swap(true, Ordering::AcqRel) {
         return Ok(());
      }

      {
         let mut registry = REGISTRY.lock().await;
         if registry
            .get(&self.path)
            .is_some_and(|entry| std::ptr::eq(entry.as_ptr(), self))
         {
            registry.remove(&self.path);
         }
      }

      self.read_pool.close().await;
      self.write_conn.close().await;
      info!(path = %self.path.display(), "Closed SQLite database");
      Ok(())
   }

   fn ensure_open(&self) -> Result<()> {
      if self.is_closed() {
         return Err(Error::DatabaseClosed);
      }
      Ok(())
   }
}

/// Resolves `path` to the key used for the registry.
///
/// The file itself may not exist yet, so only the parent directory is
/// canonicalized.
fn canonical_path(path: &Path) -> Result<PathBuf> {
   if path.exists() {
      return Ok(path.canonicalize()?);
   }

   let file_name = path.file_name().ok_or_else(|| {
      std::io::Error::new(
         std::io::ErrorKind::InvalidInput,
         format!("not a database file path: {}", path.display()),
      )
   })?;

   let parent = match path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize()?,
      _ => std::env::current_dir()?,
   };

   Ok(parent.join(file_name))
}

/// Result type alias for inventory store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the inventory store.
///
/// Conflicting inserts and no-match updates or deletes are not errors; they
/// are reported through the operation's return value instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// Error from the connection manager.
   #[error(transparent)]
   ConnectionManager(#[from] inventory_conn_mgr::Error),

   /// Error from the change observer.
   #[error(transparent)]
   Observer(#[from] inventory_observer::Error),

   /// Live queries need a tokio runtime to run on.
   #[error("no tokio runtime available: {0}")]
   Runtime(#[from] tokio::runtime::TryCurrentError),

   /// A write task panicked or was cancelled by runtime shutdown.
   #[error("write task failed: {0}")]
   WriteTask(#[from] tokio::task::JoinError),

   /// I/O error when resolving or creating the database location.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for callers that surface
   /// failures to users.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => sqlx_error_code(e),
         Error::ConnectionManager(e) => conn_mgr_error_code(e),
         Error::Observer(inventory_observer::Error::ConnMgr(e)) => conn_mgr_error_code(e),
         Error::Observer(inventory_observer::Error::Sqlx(e)) => sqlx_error_code(e),
         Error::Observer(_) => "OBSERVER_ERROR".to_string(),
         Error::Io(_) => "IO_ERROR".to_string(),
         Error::Runtime(_) => "RUNTIME_ERROR".to_string(),
         Error::WriteTask(_) => "WRITE_TASK_ERROR".to_string(),
      }
   }
}

fn conn_mgr_error_code(e: &inventory_conn_mgr::Error) -> String {
   match e {
      inventory_conn_mgr::Error::Sqlx(e) => sqlx_error_code(e),
      inventory_conn_mgr::Error::Io(_) => "IO_ERROR".to_string(),
      inventory_conn_mgr::Error::Migration(_) => "MIGRATION_ERROR".to_string(),
      inventory_conn_mgr::Error::DatabaseClosed => "DATABASE_CLOSED".to_string(),
   }
}

fn sqlx_error_code(e: &sqlx::Error) -> String {
   if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
      return format!("SQLITE_{}", code);
   }
   "SQLX_ERROR".to_string()
}

//! Where the database file lives.

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

/// Supplies the storage location for the database file.
///
/// This is the only thing the store needs from its host application.
/// Implementations may create directories but should not open the file.
pub trait StorageContext: Send + Sync {
   /// Absolute path of the database file called `name`, with its parent
   /// directory created if needed.
   fn database_path(&self, name: &str) -> std::io::Result<PathBuf>;
}

/// Stores databases under an application data directory.
#[derive(Debug, Clone)]
pub struct AppContext {
   data_dir: PathBuf,
}

impl AppContext {
   pub fn new(data_dir: impl Into<PathBuf>) -> Self {
      Self {
         data_dir: data_dir.into(),
      }
   }

   pub fn data_dir(&self) -> &Path {
      &self.data_dir
   }
}

impl StorageContext for AppContext {
   fn database_path(&self, name: &str) -> std::io::Result<PathBuf> {
      create_dir_all(&self.data_dir)?;
      Ok(self.data_dir.join(name))
   }
}

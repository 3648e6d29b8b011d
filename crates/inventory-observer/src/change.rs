use std::time::Instant;

/// Schema information for an observed table.
///
/// Used to decide whether the rowid reported by SQLite is the table's
/// primary key and whether the table can be observed at all.
#[derive(Debug, Clone, Default)]
pub struct TableInfo {
   /// True if the table has a single `INTEGER PRIMARY KEY` column, which
   /// SQLite stores as the rowid itself.
   pub rowid_alias: bool,
   /// True if the table was created with `WITHOUT ROWID`. The update hook
   /// never fires for such tables.
   pub without_rowid: bool,
}

impl TableInfo {
   /// Creates a new TableInfo.
   pub fn new(rowid_alias: bool, without_rowid: bool) -> Self {
      Self {
         rowid_alias,
         without_rowid,
      }
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOperation {
   Insert,
   Update,
   Delete,
}

impl ChangeOperation {
   /// Maps the operation code passed to SQLite's update hook.
   pub(crate) fn from_sqlite_code(code: i32) -> Option<Self> {
      match code {
         libsqlite3_sys::SQLITE_INSERT => Some(ChangeOperation::Insert),
         libsqlite3_sys::SQLITE_UPDATE => Some(ChangeOperation::Update),
         libsqlite3_sys::SQLITE_DELETE => Some(ChangeOperation::Delete),
         _ => None,
      }
   }
}

/// Notification of a change to a database table.
///
/// Changes are only sent after the transaction commits successfully and
/// the write connection has been released.
#[derive(Debug, Clone)]
pub struct TableChange {
   pub table: String,
   pub operation: ChangeOperation,
   /// The SQLite internal rowid of the affected row.
   pub rowid: i64,
   /// The integer primary key of the affected row, when the table's key
   /// aliases the rowid. `None` when the key is something else or the
   /// schema has not been inspected.
   pub primary_key: Option<i64>,
   pub timestamp: Instant,
}

/// Item produced by a [`TableChangeStream`](crate::TableChangeStream).
#[derive(Debug, Clone)]
pub enum TableChangeEvent {
   /// A committed change to an observed table.
   Change(TableChange),
   /// The subscriber fell behind and this many notifications were dropped.
   Lagged(u64),
}

//! Fan-out of committed table changes to subscribers.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::change::{ChangeOperation, TableChange, TableInfo};

/// Collects row changes reported by the SQLite hooks and publishes them.
///
/// Changes move through three stages:
/// 1. `pending`: recorded by the update hook while a transaction is open
/// 2. `committed`: promoted by the commit hook, dropped by the rollback hook
/// 3. published: broadcast when the write guard releases the connection
///
/// Publication is deferred to the release of the writer because SQLite
/// calls the commit hook before the commit is durable. A subscriber that
/// re-reads through another connection must see the committed state.
pub struct ObservationBroker {
   sender: broadcast::Sender<TableChange>,
   observed: RwLock<HashMap<String, Option<TableInfo>>>,
   pending: Mutex<Vec<TableChange>>,
   committed: Mutex<Vec<TableChange>>,
}

impl ObservationBroker {
   pub fn new(channel_capacity: usize) -> Arc<Self> {
      let (sender, _) = broadcast::channel(channel_capacity.max(1));
      Arc::new(Self {
         sender,
         observed: RwLock::new(HashMap::new()),
         pending: Mutex::new(Vec::new()),
         committed: Mutex::new(Vec::new()),
      })
   }

   /// Adds tables to the observed set. Already observed tables keep their schema info.
   pub fn observe_tables<'a, I>(&self, tables: I)
   where
      I: IntoIterator<Item = &'a str>,
   {
      let mut observed = self.observed.write();
      for table in tables {
         if !observed.contains_key(table) {
            debug!(table = %table, "Observing table");
            observed.insert(table.to_string(), None);
         }
      }
   }

   /// Names of all observed tables, sorted.
   pub fn get_observed_tables(&self) -> Vec<String> {
      let mut tables: Vec<String> = self.observed.read().keys().cloned().collect();
      tables.sort();
      tables
   }

   pub fn is_observed(&self, table: &str) -> bool {
      self.observed.read().contains_key(table)
   }

   pub fn get_table_info(&self, table: &str) -> Option<TableInfo> {
      self.observed.read().get(table).cloned().flatten()
   }

   pub fn set_table_info(&self, table: &str, info: TableInfo) {
      if let Some(slot) = self.observed.write().get_mut(table) {
         *slot = Some(info);
      }
   }

   pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
      self.sender.subscribe()
   }

   /// Number of live receivers, including those wrapped in streams.
   pub fn subscriber_count(&self) -> usize {
      self.sender.receiver_count()
   }

   /// Broadcasts every committed change not yet published.
   ///
   /// Returns the number of changes published.
   pub fn publish_committed(&self) -> usize {
      let changes = mem::take(&mut *self.committed.lock());
      let count = changes.len();

      for change in changes {
         // send() only fails when there are no receivers, which is fine
         let _ = self.sender.send(change);
      }

      if count > 0 {
         debug!(
            changes = count,
            subscribers = self.sender.receiver_count(),
            "Published committed changes"
         );
      }
      count
   }

   /// Drops changes recorded for a transaction that will not commit.
   pub fn discard_pending(&self) {
      let discarded = mem::take(&mut *self.pending.lock());
      if !discarded.is_empty() {
         trace!(changes = discarded.len(), "Discarded uncommitted changes");
      }
   }

   pub(crate) fn on_change(&self, operation: ChangeOperation, table: &str, rowid: i64) {
      let primary_key = {
         let observed = self.observed.read();
         match observed.get(table) {
            None => return,
            Some(info) => info.as_ref().filter(|info| info.rowid_alias).map(|_| rowid),
         }
      };

      trace!(table = %table, ?operation, rowid, "Recorded change");
      self.pending.lock().push(TableChange {
         table: table.to_string(),
         operation,
         rowid,
         primary_key,
         timestamp: Instant::now(),
      });
   }

   pub(crate) fn on_commit(&self) {
      let mut pending = mem::take(&mut *self.pending.lock());
      if !pending.is_empty() {
         self.committed.lock().append(&mut pending);
      }
   }

   pub(crate) fn on_rollback(&self) {
      self.discard_pending();
   }
}

impl std::fmt::Debug for ObservationBroker {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("ObservationBroker")
         .field("observed", &self.get_observed_tables())
         .field("subscribers", &self.sender.receiver_count())
         .finish()
   }
}

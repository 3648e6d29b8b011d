use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::change::{TableChange, TableChangeEvent};

/// A filtered stream of table change notifications.
///
/// Wraps a `BroadcastStream` with optional table and rowid filters. Lag
/// notices always pass through, since the dropped changes may have matched.
pub struct TableChangeStream {
   inner: BroadcastStream<TableChange>,
   filter_tables: Option<Vec<String>>,
   filter_rowids: Option<Vec<i64>>,
}

impl TableChangeStream {
   pub fn new(rx: broadcast::Receiver<TableChange>) -> Self {
      Self {
         inner: BroadcastStream::new(rx),
         filter_tables: None,
         filter_rowids: None,
      }
   }

   /// Only yield changes to these tables.
   pub fn filter_tables(mut self, tables: Vec<String>) -> Self {
      self.filter_tables = Some(tables);
      self
   }

   /// Only yield changes to rows with these rowids.
   pub fn filter_rowids(mut self, rowids: Vec<i64>) -> Self {
      self.filter_rowids = Some(rowids);
      self
   }

   fn matches(&self, change: &TableChange) -> bool {
      let table_ok = self
         .filter_tables
         .as_ref()
         .is_none_or(|tables| tables.contains(&change.table));
      let rowid_ok = self
         .filter_rowids
         .as_ref()
         .is_none_or(|rowids| rowids.contains(&change.rowid));
      table_ok && rowid_ok
   }
}

impl Stream for TableChangeStream {
   type Item = TableChangeEvent;

   fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
      loop {
         // BroadcastStream is Unpin, so we can safely create a pinned reference
         let inner = Pin::new(&mut self.inner);

         match inner.poll_next(cx) {
            Poll::Ready(Some(Ok(change))) => {
               if !self.matches(&change) {
                  continue;
               }
               return Poll::Ready(Some(TableChangeEvent::Change(change)));
            }
            Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
               warn!(
                  missed = count,
                  "Stream lagged, missed change notifications. \
                   Consider increasing channel_capacity."
               );
               return Poll::Ready(Some(TableChangeEvent::Lagged(count)));
            }
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => return Poll::Pending,
         }
      }
   }
}

/// Extension trait for converting broadcast receivers into table change streams.
pub trait TableChangeStreamExt {
   /// Converts this receiver into a `TableChangeStream`.
   ///
   /// The returned stream can be further filtered using [`TableChangeStream::filter_tables`]
   /// and [`TableChangeStream::filter_rowids`].
   fn into_stream(self) -> TableChangeStream;
}

impl TableChangeStreamExt for broadcast::Receiver<TableChange> {
   fn into_stream(self) -> TableChangeStream {
      TableChangeStream::new(self)
   }
}

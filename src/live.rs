//! Live queries: streams of snapshots that re-run when their table changes.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{FutureExt, Stream, StreamExt};
use inventory_observer::{TableChangeEvent, TableChangeStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::Result;

/// A continuously updated query result.
///
/// Yields an initial snapshot, then a fresh snapshot after every committed
/// change that may affect it. Queries run on a background task, never on
/// the task polling the stream. A query failure is yielded once as `Err`,
/// after which the stream ends.
///
/// Dropping the `LiveQuery` cancels it: the background task is aborted and
/// its change subscription and any pooled connection are released.
#[must_use = "a live query does nothing unless polled"]
pub struct LiveQuery<T> {
   rx: mpsc::Receiver<Result<T>>,
   task: JoinHandle<()>,
}

impl<T: Send + 'static> LiveQuery<T> {
   /// Starts a live query on `runtime`.
   ///
   /// `changes` must already be subscribed so that no change committed after
   /// this call can be missed. `fetch` returning `Ok(None)` means there is
   /// nothing to emit for the current state.
   pub(crate) fn spawn<F, Fut>(
      runtime: &Handle,
      name: &'static str,
      changes: TableChangeStream,
      buffer: usize,
      fetch: F,
   ) -> Self
   where
      F: FnMut() -> Fut + Send + 'static,
      Fut: Future<Output = Result<Option<T>>> + Send + 'static,
   {
      let (tx, rx) = mpsc::channel(buffer.max(1));
      let task = runtime.spawn(run(name, changes, tx, fetch));
      Self { rx, task }
   }
}

impl<T> LiveQuery<T> {
   /// Stops the query. Equivalent to dropping it.
   pub fn cancel(self) {}
}

impl<T> Stream for LiveQuery<T> {
   type Item = Result<T>;

   fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
      self.rx.poll_recv(cx)
   }
}

impl<T> Drop for LiveQuery<T> {
   fn drop(&mut self) {
      self.task.abort();
   }
}

async fn run<T, F, Fut>(
   name: &'static str,
   mut changes: TableChangeStream,
   tx: mpsc::Sender<Result<T>>,
   mut fetch: F,
) where
   F: FnMut() -> Fut,
   Fut: Future<Output = Result<Option<T>>>,
{
   debug!(query = name, "Live query started");

   loop {
      match fetch().await {
         Ok(Some(snapshot)) => {
            if tx.send(Ok(snapshot)).await.is_err() {
               break;
            }
         }
         Ok(None) => trace!(query = name, "Nothing to emit"),
         Err(e) => {
            debug!(query = name, error = %e, "Live query failed");
            let _ = tx.send(Err(e)).await;
            break;
         }
      }

      if !next_invalidation(&mut changes).await {
         break;
      }
   }

   debug!(query = name, "Live query stopped");
}

/// Waits for the next relevant change, then drains any notifications that
/// are already queued so a burst of writes triggers a single re-read.
///
/// Returns false once the change feed has closed.
async fn next_invalidation(changes: &mut TableChangeStream) -> bool {
   match changes.next().await {
      None => return false,
      Some(TableChangeEvent::Lagged(missed)) => {
         debug!(missed, "Live query lagged; re-reading");
      }
      Some(TableChangeEvent::Change(_)) => {}
   }

   while let Some(Some(_)) = changes.next().now_or_never() {}
   true
}

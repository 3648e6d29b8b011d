//! Raw SQLite hook registration.
//!
//! All three hooks share one context pointer: a leaked `Arc<ObservationBroker>`
//! created in [`register_hooks`] and reclaimed in [`unregister_hooks`].

use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;

use libsqlite3_sys::{
   sqlite3, sqlite3_commit_hook, sqlite3_int64, sqlite3_rollback_hook, sqlite3_update_hook,
};
use tracing::{trace, warn};

use crate::broker::ObservationBroker;
use crate::change::ChangeOperation;

/// Registers the update, commit, and rollback hooks on `db`.
///
/// Returns the context pointer that must be handed back to
/// [`unregister_hooks`].
///
/// # Safety
///
/// `db` must be a valid, open connection that is not executing a statement
/// on another thread, and must stay open until `unregister_hooks` is called.
pub(crate) unsafe fn register_hooks(
   db: *mut sqlite3,
   broker: Arc<ObservationBroker>,
) -> crate::Result<*mut c_void> {
   if db.is_null() {
      return Err(crate::Error::HookRegistration(
         "connection handle is null".to_string(),
      ));
   }

   let ctx = Arc::into_raw(broker) as *mut c_void;

   // SAFETY: db is valid per the caller's contract; ctx outlives the hooks
   // because it is only released after they are removed.
   let previous = unsafe {
      let previous = sqlite3_update_hook(db, Some(update_callback), ctx);
      sqlite3_commit_hook(db, Some(commit_callback), ctx);
      sqlite3_rollback_hook(db, Some(rollback_callback), ctx);
      previous
   };

   if !previous.is_null() {
      warn!("Replaced an existing update hook on the write connection");
   }

   trace!("SQLite hooks registered");
   Ok(ctx)
}

/// Removes the hooks installed by [`register_hooks`] and releases `ctx`.
///
/// # Safety
///
/// `db` must be the connection passed to `register_hooks` and `ctx` the
/// pointer it returned. Must be called at most once per registration.
pub(crate) unsafe fn unregister_hooks(db: *mut sqlite3, ctx: *mut c_void) {
   // SAFETY: per the caller's contract db is still open and ctx came from
   // Arc::into_raw in register_hooks.
   unsafe {
      sqlite3_update_hook(db, None, ptr::null_mut());
      sqlite3_commit_hook(db, None, ptr::null_mut());
      sqlite3_rollback_hook(db, None, ptr::null_mut());
      drop(Arc::from_raw(ctx as *const ObservationBroker));
   }
   trace!("SQLite hooks unregistered");
}

/// Borrows the broker behind a hook context without taking ownership.
///
/// # Safety
///
/// `ctx` must be a live pointer produced by `register_hooks`.
unsafe fn broker<'a>(ctx: *mut c_void) -> &'a ObservationBroker {
   unsafe { &*(ctx as *const ObservationBroker) }
}

unsafe extern "C" fn update_callback(
   ctx: *mut c_void,
   op: c_int,
   _db_name: *const c_char,
   table: *const c_char,
   rowid: sqlite3_int64,
) {
   let Some(operation) = ChangeOperation::from_sqlite_code(op) else {
      return;
   };
   if ctx.is_null() || table.is_null() {
      return;
   }

   // SAFETY: SQLite passes a NUL-terminated table name valid for the call,
   // and ctx was registered alongside this callback.
   let (broker, table) = unsafe { (broker(ctx), CStr::from_ptr(table).to_string_lossy()) };
   broker.on_change(operation, &table, rowid);
}

unsafe extern "C" fn commit_callback(ctx: *mut c_void) -> c_int {
   if !ctx.is_null() {
      // SAFETY: ctx was registered alongside this callback.
      unsafe { broker(ctx) }.on_commit();
   }
   // Zero lets the commit proceed
   0
}

unsafe extern "C" fn rollback_callback(ctx: *mut c_void) {
   if !ctx.is_null() {
      // SAFETY: ctx was registered alongside this callback.
      unsafe { broker(ctx) }.on_rollback();
   }
}

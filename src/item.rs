//! The inventory row model.

use serde::{Deserialize, Serialize};

/// A row of the `items` table.
///
/// `id` is the primary key. An `id` of `0` means "not yet assigned": insert
/// lets SQLite pick the next key instead of storing zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
   #[serde(default)]
   pub id: i64,
   pub name: String,
   pub price: f64,
   /// Expected to be non-negative; the store does not enforce it.
   pub quantity: i64,
}

impl Item {
   /// An item without an assigned id, ready to insert.
   pub fn new(name: impl Into<String>, price: f64, quantity: i64) -> Self {
      Self {
         id: 0,
         name: name.into(),
         price,
         quantity,
      }
   }

   pub fn with_id(mut self, id: i64) -> Self {
      self.id = id;
      self
   }

   /// The id to bind on insert: `None` lets SQLite assign one.
   pub(crate) fn assigned_id(&self) -> Option<i64> {
      (self.id != 0).then_some(self.id)
   }
}

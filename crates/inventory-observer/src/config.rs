/// Default number of buffered notifications per subscriber before it lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for an [`ObservableSqliteDatabase`](crate::ObservableSqliteDatabase).
///
/// ```
/// use inventory_observer::ObserverConfig;
///
/// let config = ObserverConfig::new()
///    .with_tables(["items"])
///    .with_channel_capacity(64);
/// assert_eq!(config.tables, vec!["items".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct ObserverConfig {
   /// Tables observed from the start. More can be added when subscribing.
   pub tables: Vec<String>,
   /// Capacity of the broadcast channel. Subscribers that fall further
   /// behind than this receive a lag notice instead of the missed changes.
   pub channel_capacity: usize,
}

impl ObserverConfig {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_tables<I, S>(mut self, tables: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      self.tables.extend(tables.into_iter().map(Into::into));
      self
   }

   pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
      self.channel_capacity = capacity;
      self
   }
}

impl Default for ObserverConfig {
   fn default() -> Self {
      Self {
         tables: Vec::new(),
         channel_capacity: DEFAULT_CHANNEL_CAPACITY,
      }
   }
}

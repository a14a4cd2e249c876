use tokio::sync::broadcast;

use crate::cache::CacheKey;

/// Notifications emitted by the cache store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// Status, payload or staleness of an entry changed
  EntryChanged(CacheKey),
  /// Entry was reclaimed by garbage collection
  EntryEvicted(CacheKey),
}

impl CacheEvent {
  pub fn key(&self) -> &CacheKey {
    match self {
      CacheEvent::EntryChanged(key) | CacheEvent::EntryEvicted(key) => key,
    }
  }
}

/// Fan-out channel for cache events.
///
/// Emitting never blocks and never fails; events sent while nobody listens are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
  tx: broadcast::Sender<CacheEvent>,
}

impl EventBus {
  pub fn new(capacity: usize) -> Self {
    let (tx, _rx) = broadcast::channel(capacity);
    Self { tx }
  }

  pub fn emit(&self, event: CacheEvent) {
    // Ignore send errors - there may be no listeners
    let _ = self.tx.send(event);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.tx.subscribe()
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new(256)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[tokio::test]
  async fn test_emit_reaches_subscribers() {
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let key = CacheKey::new("getProjects", &json!(null));

    bus.emit(CacheEvent::EntryChanged(key.clone()));

    let event = rx.recv().await.unwrap();
    assert_eq!(event.key(), &key);
  }

  #[test]
  fn test_emit_without_listeners() {
    let bus = EventBus::default();
    bus.emit(CacheEvent::EntryEvicted(CacheKey::new("getUsers", &json!(null))));
  }
}

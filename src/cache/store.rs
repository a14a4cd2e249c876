//! In-memory store of query results.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ApiError;
use crate::event::{CacheEvent, EventBus};
use crate::query::QueryState;

use super::keys::{CacheKey, Tag};
use super::tags::TagIndex;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// Created or refetching; previous data, if any, is retained
  Pending,
  /// Holds data from the latest applied response
  Resolved,
  /// Holds the error from the latest applied response
  Failed,
}

/// One cached query result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: CacheKey,
  pub status: EntryStatus,
  pub data: Option<Value>,
  pub error: Option<ApiError>,
  pub tags: BTreeSet<Tag>,
  pub subscribers: usize,
  pub last_fetched_at: Option<DateTime<Utc>>,
  /// Invalidated while nobody was subscribed; refetched on next access
  pub stale: bool,
  /// Bumped for every request issued for this key; older responses are discarded
  pub generation: u64,
  unused_since: Option<Instant>,
}

impl CacheEntry {
  fn new(key: CacheKey) -> Self {
    Self {
      key,
      status: EntryStatus::Pending,
      data: None,
      error: None,
      tags: BTreeSet::new(),
      subscribers: 0,
      last_fetched_at: None,
      stale: false,
      generation: 0,
      unused_since: Some(Instant::now()),
    }
  }

  /// Whether the entry can answer a query without going to the network.
  pub fn is_fresh(&self) -> bool {
    self.status == EntryStatus::Resolved && !self.stale
  }

  /// View of the entry for consumers.
  pub fn state(&self) -> QueryState<Value> {
    match self.status {
      EntryStatus::Pending => QueryState::Loading(self.data.clone()),
      EntryStatus::Resolved => match &self.data {
        Some(data) => QueryState::Success(data.clone()),
        None => QueryState::Loading(None),
      },
      EntryStatus::Failed => match &self.error {
        Some(error) => QueryState::Error(error.clone()),
        None => QueryState::Loading(self.data.clone()),
      },
    }
  }
}

/// Handle returned by `subscribe`, redeemed by `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Cache entries keyed by `CacheKey`, with the tag index kept in step.
///
/// Every state change is announced on the event bus as `EntryChanged`.
pub struct CacheStore {
  entries: HashMap<CacheKey, CacheEntry>,
  index: TagIndex,
  subscriptions: HashMap<SubscriptionToken, CacheKey>,
  next_token: u64,
  events: EventBus,
}

impl CacheStore {
  pub fn new(events: EventBus) -> Self {
    Self {
      entries: HashMap::new(),
      index: TagIndex::new(),
      subscriptions: HashMap::new(),
      next_token: 0,
      events,
    }
  }

  pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
    self.entries.get(key)
  }

  pub fn tag_index(&self) -> &TagIndex {
    &self.index
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Existing entry, or a new `Pending` one with no tags.
  pub fn get_or_create(&mut self, key: &CacheKey) -> &mut CacheEntry {
    self
      .entries
      .entry(key.clone())
      .or_insert_with(|| CacheEntry::new(key.clone()))
  }

  /// Start a new request generation for `key`. The entry goes `Pending` and keeps its data.
  pub fn begin_fetch(&mut self, key: &CacheKey) -> u64 {
    let entry = self.get_or_create(key);
    entry.generation += 1;
    entry.status = EntryStatus::Pending;
    entry.stale = false;
    if entry.subscribers == 0 {
      entry.unused_since = Some(Instant::now());
    }
    let generation = entry.generation;
    self.events.emit(CacheEvent::EntryChanged(key.clone()));
    generation
  }

  /// Give an entry that has never resolved the tags its operation provides without a
  /// payload, so invalidation can reach it while its first request is in flight.
  pub fn tag_pending(&mut self, key: &CacheKey, tags: BTreeSet<Tag>) {
    let Some(entry) = self.entries.get_mut(key) else {
      return;
    };
    if !entry.tags.is_empty() || tags.is_empty() {
      return;
    }
    self.index.tag_entry(key, &tags);
    entry.tags = tags;
  }

  /// Apply a successful response. Returns `false` if the response was discarded because
  /// the entry is gone or a newer request superseded it.
  pub fn resolve(
    &mut self,
    key: &CacheKey,
    generation: u64,
    data: Value,
    tags: BTreeSet<Tag>,
  ) -> bool {
    let Some(entry) = self.entries.get_mut(key) else {
      debug!(%key, "discarding response for evicted entry");
      return false;
    };
    if entry.generation != generation {
      debug!(%key, generation, current = entry.generation, "discarding superseded response");
      return false;
    }

    let old_tags = std::mem::replace(&mut entry.tags, tags);
    entry.status = EntryStatus::Resolved;
    entry.data = Some(data);
    entry.error = None;
    entry.last_fetched_at = Some(Utc::now());

    let removed: Vec<Tag> = old_tags.difference(&entry.tags).copied().collect();
    let added: Vec<Tag> = entry.tags.difference(&old_tags).copied().collect();
    self.index.untag_entry(key, &removed);
    self.index.tag_entry(key, &added);

    self.events.emit(CacheEvent::EntryChanged(key.clone()));
    true
  }

  /// Apply a failed response. Tags are left alone so invalidation still reaches the entry.
  pub fn reject(&mut self, key: &CacheKey, generation: u64, error: ApiError) -> bool {
    let Some(entry) = self.entries.get_mut(key) else {
      debug!(%key, "discarding error for evicted entry");
      return false;
    };
    if entry.generation != generation {
      debug!(%key, generation, current = entry.generation, "discarding superseded error");
      return false;
    }

    entry.status = EntryStatus::Failed;
    entry.error = Some(error);
    entry.last_fetched_at = Some(Utc::now());

    self.events.emit(CacheEvent::EntryChanged(key.clone()));
    true
  }

  /// Give up on the request in flight for `key`: its response will be discarded. The entry
  /// falls back to what it held before, marked stale so the next access refetches.
  pub fn abandon_fetch(&mut self, key: &CacheKey) {
    let Some(entry) = self.entries.get_mut(key) else {
      return;
    };
    entry.generation += 1;
    entry.stale = true;
    entry.status = if entry.data.is_some() {
      EntryStatus::Resolved
    } else if entry.error.is_some() {
      EntryStatus::Failed
    } else {
      EntryStatus::Pending
    };
    debug!(%key, generation = entry.generation, "abandoned in-flight request");
    self.events.emit(CacheEvent::EntryChanged(key.clone()));
  }

  /// Register a subscriber for `key`, creating the entry if needed.
  pub fn subscribe(&mut self, key: &CacheKey) -> SubscriptionToken {
    let entry = self.get_or_create(key);
    entry.subscribers += 1;
    entry.unused_since = None;

    let token = SubscriptionToken(self.next_token);
    self.next_token += 1;
    self.subscriptions.insert(token, key.clone());
    token
  }

  /// Release a subscriber. Unknown or already released tokens are a contract violation.
  pub fn unsubscribe(&mut self, token: SubscriptionToken) -> Result<CacheKey, ApiError> {
    let key = self.subscriptions.remove(&token).ok_or_else(|| {
      ApiError::Precondition(format!("unsubscribe without matching subscribe ({token:?})"))
    })?;

    let entry = self.entries.get_mut(&key).ok_or_else(|| {
      ApiError::Precondition(format!("subscription points at missing entry {key}"))
    })?;
    if entry.subscribers == 0 {
      return Err(ApiError::Precondition(format!(
        "subscriber count of {key} would drop below zero"
      )));
    }

    entry.subscribers -= 1;
    if entry.subscribers == 0 {
      entry.unused_since = Some(Instant::now());
    }
    Ok(key)
  }

  /// Invalidate `keys`. Subscribed entries go `Pending` and are returned so the caller can
  /// refetch them; unsubscribed entries are only marked stale. Every invalidated entry
  /// moves to a new generation, so responses to requests issued before this call are
  /// discarded.
  pub fn invalidate<'a>(&mut self, keys: impl IntoIterator<Item = &'a CacheKey>) -> Vec<CacheKey> {
    let mut refetch = Vec::new();

    for key in keys {
      let Some(entry) = self.entries.get_mut(key) else {
        continue;
      };
      entry.generation += 1;
      if entry.subscribers > 0 {
        entry.status = EntryStatus::Pending;
        refetch.push(key.clone());
      } else {
        entry.stale = true;
      }
      self.events.emit(CacheEvent::EntryChanged(key.clone()));
    }

    refetch
  }

  /// Remove entries nobody has used for at least `keep_unused_for`. Entries for which
  /// `is_busy` holds (a request is in flight) are kept.
  pub fn collect_garbage(
    &mut self,
    keep_unused_for: Duration,
    is_busy: impl Fn(&CacheKey) -> bool,
  ) -> Vec<CacheKey> {
    let now = Instant::now();
    let expired: Vec<CacheKey> = self
      .entries
      .values()
      .filter(|entry| entry.subscribers == 0 && !is_busy(&entry.key))
      .filter(|entry| {
        entry
          .unused_since
          .map(|since| now.duration_since(since) >= keep_unused_for)
          .unwrap_or(false)
      })
      .map(|entry| entry.key.clone())
      .collect();

    for key in &expired {
      if let Some(entry) = self.entries.remove(key) {
        self.index.untag_entry(key, &entry.tags);
        debug!(%key, "evicted unused cache entry");
        self.events.emit(CacheEvent::EntryEvicted(key.clone()));
      }
    }

    expired
  }

  /// Keys of every entry, for diagnostics.
  pub fn keys(&self) -> HashSet<CacheKey> {
    self.entries.keys().cloned().collect()
  }
}

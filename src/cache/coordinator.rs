//! Request coordinator that sits between consumers, the cache store and the transport.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::api::endpoints::{Operation, OperationKind};
use crate::api::transport::Transport;
use crate::error::ApiError;
use crate::event::{CacheEvent, EventBus};
use crate::query::{QueryOptions, QueryState};

use super::keys::{CacheKey, Tag};
use super::store::{CacheEntry, CacheStore, EntryStatus, SubscriptionToken};

/// A request whose outcome can be awaited by any number of callers.
type SharedFetch = Shared<BoxFuture<'static, Result<Value, ApiError>>>;

struct InFlight {
  generation: u64,
  fetch: SharedFetch,
  /// Started to keep a subscription current rather than for a `query` caller
  for_subscription: bool,
  /// `query` callers currently awaiting `fetch`
  waiters: usize,
}

/// What is needed to issue the request behind a cache key again.
#[derive(Clone)]
struct Origin {
  operation: &'static Operation,
  args: Value,
}

struct CacheState {
  store: CacheStore,
  in_flight: HashMap<CacheKey, InFlight>,
  origins: HashMap<CacheKey, Origin>,
}

struct Inner {
  transport: Arc<dyn Transport>,
  state: Mutex<CacheState>,
  events: EventBus,
  keep_unused_for: Duration,
}

enum Plan {
  Hit(QueryState<Value>),
  Wait(u64, SharedFetch),
}

/// Marks a `query` caller as waiting on an in-flight request until dropped.
struct Waiter<'a> {
  coordinator: &'a RequestCoordinator,
  key: &'a CacheKey,
  generation: u64,
}

impl Drop for Waiter<'_> {
  fn drop(&mut self) {
    let mut state = self.coordinator.lock();
    if let Some(in_flight) = state.in_flight.get_mut(self.key) {
      if in_flight.generation == self.generation {
        in_flight.waiters = in_flight.waiters.saturating_sub(1);
      }
    }
  }
}

/// Single entry point for reading through and writing around the cache.
///
/// - identical concurrent queries share one HTTP call
/// - responses are applied to their own key, and only if no newer request superseded them
/// - a successful mutation invalidates its tags before it returns, refetching subscribed
///   entries and marking the rest stale
///
/// Lock sections never span an `.await`. Fetches are driven by spawned tasks. A request
/// started for a subscription is abandoned, and its response discarded, when the last
/// subscriber leaves before it returns and no `query` caller is waiting on it.
#[derive(Clone)]
pub struct RequestCoordinator {
  inner: Arc<Inner>,
}

impl RequestCoordinator {
  /// Create a coordinator. Entries without subscribers are reclaimed once unused for
  /// `keep_unused_for`.
  pub fn new(transport: Arc<dyn Transport>, keep_unused_for: Duration) -> Self {
    let events = EventBus::default();
    let state = CacheState {
      store: CacheStore::new(events.clone()),
      in_flight: HashMap::new(),
      origins: HashMap::new(),
    };

    Self {
      inner: Arc::new(Inner {
        transport,
        state: Mutex::new(state),
        events,
        keep_unused_for,
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, CacheState> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  /// Listen to every entry change.
  pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
    self.inner.events.subscribe()
  }

  /// Current state of `key`, `Idle` if nothing is cached.
  pub fn state(&self, key: &CacheKey) -> QueryState<Value> {
    self
      .lock()
      .store
      .get(key)
      .map(CacheEntry::state)
      .unwrap_or(QueryState::Idle)
  }

  /// Snapshot of the entry behind `key`.
  pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
    self.lock().store.get(key).cloned()
  }

  pub fn entry_count(&self) -> usize {
    self.lock().store.len()
  }

  /// Run a query through the cache.
  ///
  /// Fresh entries answer immediately; a request already in flight for the same key is
  /// joined; otherwise a new request is issued. With `skip` nothing touches the network.
  pub async fn query(
    &self,
    operation: &'static Operation,
    args: Value,
    options: QueryOptions,
  ) -> Result<QueryState<Value>, ApiError> {
    operation.ensure_kind(OperationKind::Query)?;
    let key = CacheKey::new(operation.name, &args);

    if options.skip {
      return Ok(self.state(&key));
    }

    let plan = {
      let mut state = self.lock();
      self.collect_garbage_locked(&mut state);
      self.plan(&mut state, &key, Origin { operation, args })?
    };

    match plan {
      Plan::Hit(state) => Ok(state),
      Plan::Wait(generation, fetch) => {
        let _waiter = Waiter {
          coordinator: self,
          key: &key,
          generation,
        };
        let result = fetch.await;
        Ok(self.settled_state(&key, result))
      }
    }
  }

  fn plan(&self, state: &mut CacheState, key: &CacheKey, origin: Origin) -> Result<Plan, ApiError> {
    if let Some(entry) = state.store.get(key) {
      if entry.is_fresh() {
        debug!(%key, "cache hit");
        return Ok(Plan::Hit(entry.state()));
      }
    }

    if let Some(in_flight) = state.in_flight.get_mut(key) {
      debug!(%key, "joining in-flight request");
      in_flight.waiters += 1;
      return Ok(Plan::Wait(in_flight.generation, in_flight.fetch.clone()));
    }

    let (generation, fetch) = self.start_fetch(state, key, origin.clone(), false)?;
    if let Some(in_flight) = state.in_flight.get_mut(key) {
      in_flight.waiters += 1;
    }
    state.origins.insert(key.clone(), origin);
    Ok(Plan::Wait(generation, fetch))
  }

  /// Issue the request for `key` under a new generation and register it as in flight.
  fn start_fetch(
    &self,
    state: &mut CacheState,
    key: &CacheKey,
    origin: Origin,
    for_subscription: bool,
  ) -> Result<(u64, SharedFetch), ApiError> {
    let request = origin.operation.request(&origin.args)?;
    let generation = state.store.begin_fetch(key);
    state
      .store
      .tag_pending(key, origin.operation.provided_tags(&origin.args, None));
    debug!(%key, generation, %request, "issuing request");

    let send = self.inner.transport.send(request);
    let coordinator = Arc::downgrade(&self.inner);
    let fetch_key = key.clone();

    let fetch = async move {
      let result = send.await;
      if let Some(inner) = coordinator.upgrade() {
        RequestCoordinator { inner }.complete(&fetch_key, generation, &origin, &result);
      }
      result
    }
    .boxed()
    .shared();

    state.in_flight.insert(
      key.clone(),
      InFlight {
        generation,
        fetch: fetch.clone(),
        for_subscription,
        waiters: 0,
      },
    );
    tokio::spawn(fetch.clone());

    Ok((generation, fetch))
  }

  /// Apply a finished request to the store.
  fn complete(
    &self,
    key: &CacheKey,
    generation: u64,
    origin: &Origin,
    result: &Result<Value, ApiError>,
  ) {
    let mut state = self.lock();
    if state.in_flight.get(key).map(|f| f.generation) == Some(generation) {
      state.in_flight.remove(key);
    }

    match result {
      Ok(data) => {
        let tags = origin.operation.provided_tags(&origin.args, Some(data));
        state.store.resolve(key, generation, data.clone(), tags);
      }
      Err(error) => {
        warn!(%key, %error, "request failed");
        state.store.reject(key, generation, error.clone());
      }
    }
  }

  /// What a caller that awaited a fetch gets back: the entry if it has settled, otherwise
  /// the outcome of the request it waited on.
  fn settled_state(&self, key: &CacheKey, result: Result<Value, ApiError>) -> QueryState<Value> {
    let state = self.lock();
    match state.store.get(key) {
      Some(entry) if entry.status != EntryStatus::Pending => entry.state(),
      _ => match result {
        Ok(data) => QueryState::Success(data),
        Err(error) => QueryState::Error(error),
      },
    }
  }

  /// Run a mutation. Mutations are never cached or deduplicated.
  ///
  /// On success the operation's invalidated tags are applied before this returns, so a
  /// query issued afterwards never sees pre-mutation data. Failures are returned to the
  /// caller and invalidate nothing.
  pub async fn mutate(&self, operation: &'static Operation, args: Value) -> Result<Value, ApiError> {
    operation.ensure_kind(OperationKind::Mutation)?;
    let request = operation.request(&args)?;
    debug!(operation = operation.name, %request, "issuing mutation");

    let result = self
      .inner
      .transport
      .send(request)
      .await
      .inspect_err(|error| warn!(operation = operation.name, %error, "mutation failed"))?;

    let tags = operation.invalidated_tags(&args, Some(&result));
    self.invalidate_tags(&tags);
    Ok(result)
  }

  /// Invalidate every entry carrying one of `tags`. Returns how many entries were hit.
  pub fn invalidate_tags<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> usize {
    let mut state = self.lock();
    let tags: Vec<&Tag> = tags.into_iter().collect();
    let keys: HashSet<CacheKey> = tags
      .iter()
      .flat_map(|tag| state.store.tag_index().lookup(tag))
      .collect();

    debug!(
      tags = ?tags.iter().map(ToString::to_string).collect::<Vec<_>>(),
      entries = keys.len(),
      "invalidating"
    );

    // Requests issued before the invalidation must not be joined afterwards
    for key in &keys {
      state.in_flight.remove(key);
    }

    let refetch = state.store.invalidate(&keys);
    for key in &refetch {
      let Some(origin) = state.origins.get(key).cloned() else {
        continue;
      };
      if let Err(error) = self.start_fetch(&mut state, key, origin, true) {
        warn!(%key, %error, "could not refetch invalidated entry");
      }
    }

    keys.len()
  }

  /// Subscribe to a query. The entry is kept alive and refetched after invalidation for
  /// as long as the returned handle lives.
  pub fn subscribe(
    &self,
    operation: &'static Operation,
    args: Value,
    options: QueryOptions,
  ) -> Result<Subscription, ApiError> {
    operation.ensure_kind(OperationKind::Query)?;
    let key = CacheKey::new(operation.name, &args);
    let events = self.inner.events.subscribe();

    if options.skip {
      return Ok(Subscription {
        coordinator: self.clone(),
        key,
        token: None,
        events,
        poller: None,
      });
    }

    // Validate before registering anything
    operation.request(&args)?;
    let origin = Origin { operation, args };

    let token = {
      let mut state = self.lock();
      self.collect_garbage_locked(&mut state);

      let token = state.store.subscribe(&key);
      state.origins.insert(key.clone(), origin.clone());

      let fresh = state
        .store
        .get(&key)
        .map(CacheEntry::is_fresh)
        .unwrap_or(false);
      if !fresh && !state.in_flight.contains_key(&key) {
        if let Err(error) = self.start_fetch(&mut state, &key, origin, true) {
          state.store.unsubscribe(token)?;
          return Err(error);
        }
      }
      token
    };

    let poller = options
      .poll_interval
      .map(|period| self.spawn_poller(key.clone(), period));

    Ok(Subscription {
      coordinator: self.clone(),
      key,
      token: Some(token),
      events,
      poller,
    })
  }

  fn spawn_poller(&self, key: CacheKey, period: Duration) -> JoinHandle<()> {
    let coordinator = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
      loop {
        ticker.tick().await;
        coordinator.refetch(&key);
      }
    })
  }

  /// Re-issue the request behind `key` unless one is already in flight.
  pub fn refetch(&self, key: &CacheKey) -> bool {
    let mut state = self.lock();
    if state.in_flight.contains_key(key) {
      return false;
    }
    let Some(origin) = state.origins.get(key).cloned() else {
      return false;
    };

    match self.start_fetch(&mut state, key, origin, true) {
      Ok(_) => true,
      Err(error) => {
        warn!(%key, %error, "refetch failed to start");
        false
      }
    }
  }

  /// Release a subscription. If it was the last one and the request it kept going has
  /// nobody else waiting on it, that request is abandoned.
  fn release(&self, token: SubscriptionToken) -> Result<(), ApiError> {
    let mut state = self.lock();
    let key = state.store.unsubscribe(token)?;

    let unsubscribed = state
      .store
      .get(&key)
      .map(|entry| entry.subscribers == 0)
      .unwrap_or(true);
    let orphaned = state
      .in_flight
      .get(&key)
      .map(|in_flight| in_flight.for_subscription && in_flight.waiters == 0)
      .unwrap_or(false);

    if unsubscribed && orphaned {
      state.in_flight.remove(&key);
      state.store.abandon_fetch(&key);
    }
    Ok(())
  }

  /// Reclaim entries that have had no subscribers for the grace period.
  pub fn collect_garbage(&self) -> usize {
    let mut state = self.lock();
    self.collect_garbage_locked(&mut state)
  }

  fn collect_garbage_locked(&self, state: &mut CacheState) -> usize {
    let CacheState {
      store,
      in_flight,
      origins,
    } = state;
    let evicted = store.collect_garbage(self.inner.keep_unused_for, |key| {
      in_flight.contains_key(key)
    });
    for key in &evicted {
      origins.remove(key);
    }
    evicted.len()
  }
}

/// Live binding between a consumer and a cache key.
///
/// Dropping the handle releases the subscription and stops polling.
pub struct Subscription {
  coordinator: RequestCoordinator,
  key: CacheKey,
  token: Option<SubscriptionToken>,
  events: broadcast::Receiver<CacheEvent>,
  poller: Option<JoinHandle<()>>,
}

impl Subscription {
  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  /// `false` for skipped subscriptions, which hold no entry.
  pub fn is_active(&self) -> bool {
    self.token.is_some()
  }

  pub fn state(&self) -> QueryState<Value> {
    self.coordinator.state(&self.key)
  }

  pub fn refetch(&self) -> bool {
    self.is_active() && self.coordinator.refetch(&self.key)
  }

  /// Wait for the next change to this entry. Returns `false` if the cache went away.
  pub async fn changed(&mut self) -> bool {
    loop {
      match self.events.recv().await {
        Ok(event) if event.key() == &self.key => return true,
        Ok(_) => continue,
        Err(broadcast::error::RecvError::Lagged(_)) => return true,
        Err(broadcast::error::RecvError::Closed) => return false,
      }
    }
  }

  /// Wait until the entry is no longer loading and return its state.
  pub async fn settled(&mut self) -> QueryState<Value> {
    loop {
      let state = self.state();
      if !state.is_loading() || !self.changed().await {
        return state;
      }
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(poller) = self.poller.take() {
      poller.abort();
    }
    if let Some(token) = self.token.take() {
      if let Err(error) = self.coordinator.release(token) {
        error!(key = %self.key, %error, "failed to release subscription");
      }
    }
  }
}

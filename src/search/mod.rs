//! Debounced free-text search over the aggregated search endpoint.
//!
//! Keystrokes feed `SearchController::input`. After a quiet period the latest text is
//! committed; terms shorter than the configured minimum leave the controller `Idle` and
//! never reach the network. Consumers read a `SearchView` through a watch channel.

mod debounce;
mod facet;

pub use debounce::DebounceTimer;
pub use facet::{SearchFacet, SearchGroup};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::types::SearchResults;
use crate::api::ApiClient;
use crate::config::SearchConfig;
use crate::query::QueryState;

/// Whether the committed term is long enough to search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchPhase {
  #[default]
  Idle,
  Armed,
}

/// What a search UI renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchView {
  pub phase: SearchPhase,
  /// Last committed term
  pub term: String,
  pub results: QueryState<SearchResults>,
}

struct Shared {
  client: ApiClient,
  min_term_length: usize,
  view: watch::Sender<SearchView>,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
  fn commit(self: &Arc<Self>, term: String) {
    // A failed search is retried when its term is committed again
    let unchanged = {
      let view = self.view.borrow();
      view.term == term && !view.results.is_error()
    };
    if unchanged {
      return;
    }

    let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = task.take() {
      previous.abort();
    }

    if term.chars().count() < self.min_term_length {
      debug!(%term, "search term below minimum length");
      self.view.send_replace(SearchView {
        phase: SearchPhase::Idle,
        term,
        results: QueryState::Idle,
      });
      return;
    }

    debug!(%term, "committing search term");
    self.view.send_replace(SearchView {
      phase: SearchPhase::Armed,
      term: term.clone(),
      results: QueryState::Loading(None),
    });

    let shared = self.clone();
    *task = Some(tokio::spawn(async move {
      let results = match shared.client.search(&term).await {
        Ok(state) => state,
        Err(error) => QueryState::Error(error),
      };
      shared.view.send_if_modified(|view| {
        if view.term != term {
          debug!(%term, current = %view.term, "discarding results for superseded term");
          return false;
        }
        view.results = results;
        true
      });
    }));
  }
}

/// Turns a stream of input values into at most one search per settled term.
///
/// Dropping the controller cancels the pending commit and the search in flight.
pub struct SearchController {
  shared: Arc<Shared>,
  debounce: Duration,
  timer: DebounceTimer,
  view: watch::Receiver<SearchView>,
}

impl SearchController {
  pub fn new(client: ApiClient, config: &SearchConfig) -> Self {
    let (tx, rx) = watch::channel(SearchView::default());
    Self {
      shared: Arc::new(Shared {
        client,
        min_term_length: config.min_term_length,
        view: tx,
        task: Mutex::new(None),
      }),
      debounce: config.debounce(),
      timer: DebounceTimer::new(),
      view: rx,
    }
  }

  /// Record a new input value. It is committed once no further input arrives for the
  /// debounce window.
  pub fn input(&mut self, text: impl Into<String>) {
    let text = text.into();
    let shared = self.shared.clone();
    self
      .timer
      .schedule(self.debounce, move || shared.commit(text));
  }

  /// Commit `text` now, dropping any pending input.
  pub fn commit(&mut self, text: impl Into<String>) {
    self.timer.cancel();
    self.shared.commit(text.into());
  }

  /// Whether input is waiting for the debounce window to pass.
  pub fn is_pending(&self) -> bool {
    self.timer.is_pending()
  }

  pub fn view(&self) -> SearchView {
    self.view.borrow().clone()
  }

  /// Receiver that is notified whenever the view changes.
  pub fn watch(&self) -> watch::Receiver<SearchView> {
    self.view.clone()
  }

  /// Wait until the current term's results are no longer loading.
  pub async fn settled(&mut self) -> SearchView {
    if let Ok(view) = self.view.wait_for(|view| !view.results.is_loading()).await {
      return view.clone();
    }
    self.view()
  }
}

impl Drop for SearchController {
  fn drop(&mut self) {
    self.timer.cancel();
    if let Some(task) = self
      .shared
      .task
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
    {
      task.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::transport::mock::MockTransport;
  use crate::api::transport::Method;
  use crate::config::CacheConfig;
  use crate::error::ApiError;
  use serde_json::json;

  const QUIET: Duration = Duration::from_millis(600);

  fn controller() -> (Arc<MockTransport>, SearchController) {
    let mock = Arc::new(MockTransport::new());
    let client = ApiClient::with_transport(mock.clone(), &CacheConfig::default());
    let controller = SearchController::new(client, &SearchConfig::default());
    (mock, controller)
  }

  fn hits(term: &str) -> serde_json::Value {
    json!({ "tasks": [{ "id": 1, "title": term, "projectId": 1 }] })
  }

  #[tokio::test(start_paused = true)]
  async fn test_rapid_typing_issues_one_query() {
    let (mock, mut search) = controller();
    mock.respond(Method::Get, "search?query=abc", hits("abc"));

    for text in ["a", "ab", "abc"] {
      search.input(text);
      tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(mock.calls().is_empty());

    tokio::time::sleep(QUIET).await;
    let view = search.settled().await;

    assert_eq!(mock.calls().len(), 1);
    assert_eq!(mock.count(Method::Get, "search?query=abc"), 1);
    assert_eq!(view.phase, SearchPhase::Armed);
    assert_eq!(view.term, "abc");
    let tasks = view.results.data().and_then(|r| r.tasks.as_ref());
    assert_eq!(tasks.map(Vec::len), Some(1));
  }

  #[tokio::test(start_paused = true)]
  async fn test_short_term_stays_idle() {
    let (mock, mut search) = controller();

    search.input("ab");
    tokio::time::sleep(QUIET).await;

    let view = search.view();
    assert_eq!(view.phase, SearchPhase::Idle);
    assert_eq!(view.term, "ab");
    assert!(view.results.is_idle());
    assert!(mock.calls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_settled_terms_each_query_once() {
    let (mock, mut search) = controller();
    mock.respond(Method::Get, "search?query=abc", hits("abc"));
    mock.respond(Method::Get, "search?query=abcd", hits("abcd"));

    search.input("abc");
    tokio::time::sleep(QUIET).await;
    search.input("abcd");
    tokio::time::sleep(QUIET).await;

    assert_eq!(search.settled().await.term, "abcd");
    assert_eq!(mock.count(Method::Get, "search?query=abc"), 1);
    assert_eq!(mock.count(Method::Get, "search?query=abcd"), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_drop_before_quiet_period_cancels() {
    let (mock, mut search) = controller();
    mock.respond(Method::Get, "search?query=abc", hits("abc"));

    search.input("abc");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(search.is_pending());
    drop(search);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(mock.calls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_results_for_superseded_term_are_dropped() {
    let (mock, mut search) = controller();
    mock.respond_after(
      Method::Get,
      "search?query=slow",
      hits("slow"),
      Duration::from_secs(5),
    );
    mock.respond(Method::Get, "search?query=fast", hits("fast"));

    search.commit("slow");
    assert!(search.view().results.is_loading());
    search.commit("fast");

    tokio::time::sleep(Duration::from_secs(6)).await;
    let view = search.view();
    assert_eq!(view.term, "fast");
    let title = view
      .results
      .data()
      .and_then(|r| r.tasks.as_ref())
      .map(|tasks| tasks[0].title.clone());
    assert_eq!(title.as_deref(), Some("fast"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_term_is_retried_when_committed_again() {
    let (mock, mut search) = controller();
    mock.fail(
      Method::Get,
      "search?query=abc",
      ApiError::Network("offline".into()),
    );

    search.commit("abc");
    assert!(search.settled().await.results.is_error());

    mock.respond(Method::Get, "search?query=abc", hits("abc"));
    search.commit("abc");
    let view = search.settled().await;

    assert!(view.results.is_success());
    assert_eq!(mock.count(Method::Get, "search?query=abc"), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_facet_filter_does_not_refetch() {
    let (mock, mut search) = controller();
    mock.respond(
      Method::Get,
      "search?query=launch",
      json!({
        "tasks": [{ "id": 1, "title": "Launch", "projectId": 1 }],
        "projects": [{ "id": 1, "name": "Launch" }],
        "users": []
      }),
    );

    search.commit("launch");
    let view = search.settled().await;
    let results = view.results.data().unwrap();

    assert_eq!(results.groups(SearchFacet::All).len(), 2);
    assert_eq!(results.groups(SearchFacet::Projects).len(), 1);
    assert!(results.groups(SearchFacet::Users).is_empty());
    assert_eq!(mock.calls().len(), 1);
  }
}

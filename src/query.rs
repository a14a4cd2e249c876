//! Query state and options shared by the cache and its consumers.
//!
//! Inspired by TanStack Query: every cached request is observed as a `QueryState<T>`
//! that views match on to render loading, error and success.
//!
//! # Example
//!
//! ```ignore
//! match client.get_tasks(project_id).await? {
//!     QueryState::Idle => {}
//!     QueryState::Loading(previous) => render_spinner(previous),
//!     QueryState::Success(tasks) => render_tasks(&tasks),
//!     QueryState::Error(e) => render_error(&e),
//! }
//! ```

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::error::ApiError;

/// The state of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Query has not been started, or was skipped
  Idle,
  /// Query is fetching; carries the previous data while revalidating
  Loading(Option<T>),
  /// Query completed successfully
  Success(T),
  /// Query failed
  Error(ApiError),
}

impl<T> QueryState<T> {
  pub fn is_idle(&self) -> bool {
    matches!(self, QueryState::Idle)
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading(_))
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  /// Data of a successful query.
  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  /// Data of a successful query, or the stale data shown while refetching.
  pub fn latest(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) | QueryState::Loading(Some(data)) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ApiError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }

  pub fn into_data(self) -> Option<T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryState<U> {
    match self {
      QueryState::Idle => QueryState::Idle,
      QueryState::Loading(previous) => QueryState::Loading(previous.map(f)),
      QueryState::Success(data) => QueryState::Success(f(data)),
      QueryState::Error(e) => QueryState::Error(e),
    }
  }
}

impl<T> Default for QueryState<T> {
  fn default() -> Self {
    QueryState::Idle
  }
}

impl QueryState<Value> {
  /// Deserialize the JSON payload into an entity type.
  ///
  /// A payload that does not match `T` turns the state into `Error(Decode)`. Stale data
  /// that no longer decodes is dropped.
  pub fn decode<T: DeserializeOwned>(self) -> QueryState<T> {
    match self {
      QueryState::Idle => QueryState::Idle,
      QueryState::Loading(previous) => {
        QueryState::Loading(previous.and_then(|value| serde_json::from_value(value).ok()))
      }
      QueryState::Success(value) => match serde_json::from_value(value) {
        Ok(data) => QueryState::Success(data),
        Err(e) => QueryState::Error(ApiError::from(e)),
      },
      QueryState::Error(e) => QueryState::Error(e),
    }
  }
}

/// Per-call options for `query` and `subscribe`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
  /// Do not touch the network; report whatever is cached, or `Idle`
  pub skip: bool,
  /// Refetch periodically while a subscription is alive
  pub poll_interval: Option<Duration>,
}

impl QueryOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Skip the query while `condition` holds.
  pub fn skip_if(mut self, condition: bool) -> Self {
    self.skip = condition;
    self
  }

  pub fn poll_every(mut self, interval: Duration) -> Self {
    self.poll_interval = Some(interval);
    self
  }
}

//! Typed API client with transparent caching.

use color_eyre::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::cache::{RequestCoordinator, Subscription};
use crate::config::{CacheConfig, Config};
use crate::error::ApiError;
use crate::query::{QueryOptions, QueryState};

use super::endpoints::{self, Operation};
use super::transport::{HttpTransport, Transport};
use super::types::{
  NewProject, NewTask, Project, SearchResults, Status, Task, TaskPatch, Team, User,
};

/// Project-management API client.
///
/// Queries go through the tag-indexed cache and come back as `QueryState`; mutations
/// return the server's answer directly and invalidate the cache before returning.
/// Cloning is cheap and every clone shares one cache.
#[derive(Clone)]
pub struct ApiClient {
  cache: RequestCoordinator,
}

impl ApiClient {
  /// Create a client talking HTTP to the configured server.
  pub fn new(config: &Config) -> Result<Self> {
    let transport = HttpTransport::new(&config.api)?;
    Ok(Self::with_transport(Arc::new(transport), &config.cache))
  }

  pub fn with_transport(transport: Arc<dyn Transport>, config: &CacheConfig) -> Self {
    Self {
      cache: RequestCoordinator::new(transport, config.keep_unused_for()),
    }
  }

  /// The cache behind this client.
  pub fn cache(&self) -> &RequestCoordinator {
    &self.cache
  }

  async fn query<T: DeserializeOwned>(
    &self,
    operation: &'static Operation,
    args: Value,
  ) -> Result<QueryState<T>, ApiError> {
    let state = self
      .cache
      .query(operation, args, QueryOptions::default())
      .await?;
    Ok(state.decode())
  }

  async fn mutate<T: DeserializeOwned>(
    &self,
    operation: &'static Operation,
    args: Value,
  ) -> Result<T, ApiError> {
    let value = self.cache.mutate(operation, args).await?;
    Ok(serde_json::from_value(value)?)
  }

  // ==========================================================================
  // Projects
  // ==========================================================================

  pub async fn get_projects(&self) -> Result<QueryState<Vec<Project>>, ApiError> {
    self.query(&endpoints::GET_PROJECTS, Value::Null).await
  }

  pub async fn get_project(&self, id: u64) -> Result<QueryState<Project>, ApiError> {
    self
      .query(&endpoints::GET_SINGLE_PROJECT, json!({ "id": id }))
      .await
  }

  pub async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError> {
    self
      .mutate(&endpoints::CREATE_PROJECT, to_args(project)?)
      .await
  }

  pub fn watch_projects(&self, options: QueryOptions) -> Result<Subscription, ApiError> {
    self
      .cache
      .subscribe(&endpoints::GET_PROJECTS, Value::Null, options)
  }

  pub fn watch_project(&self, id: u64, options: QueryOptions) -> Result<Subscription, ApiError> {
    self
      .cache
      .subscribe(&endpoints::GET_SINGLE_PROJECT, json!({ "id": id }), options)
  }

  // ==========================================================================
  // Tasks
  // ==========================================================================

  pub async fn get_tasks(&self, project_id: u64) -> Result<QueryState<Vec<Task>>, ApiError> {
    self
      .query(&endpoints::GET_TASKS, json!({ "projectId": project_id }))
      .await
  }

  pub async fn get_tasks_by_user(&self, user_id: u64) -> Result<QueryState<Vec<Task>>, ApiError> {
    self
      .query(&endpoints::GET_TASKS_BY_USER, json!({ "userId": user_id }))
      .await
  }

  pub async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
    self.mutate(&endpoints::CREATE_TASK, to_args(task)?).await
  }

  pub async fn update_task_status(
    &self,
    project_id: u64,
    task_id: u64,
    status: Status,
  ) -> Result<Task, ApiError> {
    self
      .mutate(
        &endpoints::UPDATE_TASK_STATUS,
        json!({ "projectId": project_id, "taskId": task_id, "status": status }),
      )
      .await
  }

  pub async fn update_task(
    &self,
    project_id: u64,
    task_id: u64,
    patch: &TaskPatch,
  ) -> Result<Task, ApiError> {
    let args = json!({ "projectId": project_id, "taskId": task_id, "task": to_args(patch)? });
    self.mutate(&endpoints::UPDATE_TASK, args).await
  }

  pub fn watch_tasks(
    &self,
    project_id: u64,
    options: QueryOptions,
  ) -> Result<Subscription, ApiError> {
    self.cache.subscribe(
      &endpoints::GET_TASKS,
      json!({ "projectId": project_id }),
      options,
    )
  }

  pub fn watch_tasks_by_user(
    &self,
    user_id: u64,
    options: QueryOptions,
  ) -> Result<Subscription, ApiError> {
    self.cache.subscribe(
      &endpoints::GET_TASKS_BY_USER,
      json!({ "userId": user_id }),
      options,
    )
  }

  // ==========================================================================
  // Users, teams and search
  // ==========================================================================

  pub async fn get_users(&self) -> Result<QueryState<Vec<User>>, ApiError> {
    self.query(&endpoints::GET_USERS, Value::Null).await
  }

  pub fn watch_users(&self, options: QueryOptions) -> Result<Subscription, ApiError> {
    self
      .cache
      .subscribe(&endpoints::GET_USERS, Value::Null, options)
  }

  pub async fn get_teams(&self) -> Result<QueryState<Vec<Team>>, ApiError> {
    self.query(&endpoints::GET_TEAMS, Value::Null).await
  }

  pub fn watch_teams(&self, options: QueryOptions) -> Result<Subscription, ApiError> {
    self
      .cache
      .subscribe(&endpoints::GET_TEAMS, Value::Null, options)
  }

  /// Aggregated search over tasks, projects and users. The term is sent as typed.
  pub async fn search(&self, term: &str) -> Result<QueryState<SearchResults>, ApiError> {
    self.query(&endpoints::SEARCH, json!(term)).await
  }
}

fn to_args<T: Serialize>(body: &T) -> Result<Value, ApiError> {
  serde_json::to_value(body).map_err(|e| ApiError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::transport::mock::MockTransport;
  use crate::api::transport::Method;

  fn client() -> (Arc<MockTransport>, ApiClient) {
    let mock = Arc::new(MockTransport::new());
    let client = ApiClient::with_transport(mock.clone(), &CacheConfig::default());
    (mock, client)
  }

  #[tokio::test]
  async fn test_typed_task_list() {
    let (mock, client) = client();
    mock.respond(
      Method::Get,
      "projects/1/tasks",
      json!([{ "id": 7, "title": "Write docs", "projectId": 1, "status": "To Do" }]),
    );

    let tasks = client.get_tasks(1).await.unwrap().into_data().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, Some(Status::ToDo));
  }

  #[tokio::test]
  async fn test_unexpected_payload_is_decode_error() {
    let (mock, client) = client();
    mock.respond(Method::Get, "users", json!({ "users": "nope" }));

    let state = client.get_users().await.unwrap();
    assert!(matches!(state, QueryState::Error(ApiError::Decode(_))));
  }

  #[tokio::test]
  async fn test_status_update_sends_display_string() {
    let (mock, client) = client();
    mock.respond(
      Method::Patch,
      "projects/2/tasks/9",
      json!({ "id": 9, "title": "t", "projectId": 2, "status": "Under Review" }),
    );

    let task = client
      .update_task_status(2, 9, Status::UnderReview)
      .await
      .unwrap();
    assert_eq!(task.status, Some(Status::UnderReview));

    let call = &mock.calls()[0];
    assert_eq!(call.body, Some(json!({ "status": "Under Review" })));
  }

  #[tokio::test]
  async fn test_create_task_refreshes_watched_list() {
    let (mock, client) = client();
    mock.respond(Method::Get, "projects/1/tasks", json!([]));
    mock.respond(
      Method::Post,
      "tasks",
      json!({ "id": 1, "title": "New", "projectId": 1 }),
    );

    let mut watch = client.watch_tasks(1, QueryOptions::default()).unwrap();
    assert_eq!(watch.settled().await, QueryState::Success(json!([])));

    mock.respond(
      Method::Get,
      "projects/1/tasks",
      json!([{ "id": 1, "title": "New", "projectId": 1 }]),
    );
    let created = client
      .create_task(&NewTask {
        title: "New".into(),
        project_id: 1,
        ..NewTask::default()
      })
      .await
      .unwrap();
    assert_eq!(created.id, 1);

    let tasks: QueryState<Vec<Task>> = watch.settled().await.decode();
    assert_eq!(tasks.data().map(Vec::len), Some(1));
  }

  #[tokio::test]
  async fn test_update_task_sends_patch_only() {
    let (mock, client) = client();
    mock.respond(
      Method::Patch,
      "projects/1/tasks/3",
      json!({ "id": 3, "title": "t", "projectId": 1, "points": 5 }),
    );

    let patch = TaskPatch {
      points: Some(5),
      ..TaskPatch::default()
    };
    client.update_task(1, 3, &patch).await.unwrap();
    assert_eq!(mock.calls()[0].body, Some(json!({ "points": 5 })));
  }
}

//! Entity types exchanged with the project-management API.
//!
//! Field names follow the server's camelCase JSON (`fileUrl`, `profilePictureUrl`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  pub id: u64,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
  Urgent,
  High,
  Medium,
  Low,
  Backlog,
}

impl FromStr for Priority {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "urgent" => Ok(Priority::Urgent),
      "high" => Ok(Priority::High),
      "medium" => Ok(Priority::Medium),
      "low" => Ok(Priority::Low),
      "backlog" => Ok(Priority::Backlog),
      _ => Err(format!("unknown priority: {s}")),
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Priority::Urgent => "Urgent",
      Priority::High => "High",
      Priority::Medium => "Medium",
      Priority::Low => "Low",
      Priority::Backlog => "Backlog",
    };
    f.write_str(name)
  }
}

/// Workflow status of a task. Serialized with the server's display strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
  #[serde(rename = "To Do")]
  ToDo,
  #[serde(rename = "In Progress")]
  WorkInProgress,
  #[serde(rename = "Under Review")]
  UnderReview,
  #[serde(rename = "Completed")]
  Completed,
}

impl Status {
  pub fn as_str(&self) -> &'static str {
    match self {
      Status::ToDo => "To Do",
      Status::WorkInProgress => "In Progress",
      Status::UnderReview => "Under Review",
      Status::Completed => "Completed",
    }
  }
}

/// Accepts the display strings as well as dashed forms (`in-progress`).
impl FromStr for Status {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
    match normalized.as_str() {
      "to do" | "todo" => Ok(Status::ToDo),
      "in progress" | "work in progress" => Ok(Status::WorkInProgress),
      "under review" | "review" => Ok(Status::UnderReview),
      "completed" | "done" => Ok(Status::Completed),
      _ => Err(format!("unknown status: {s}")),
    }
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<u64>,
  pub username: String,
  #[serde(default)]
  pub email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub profile_picture_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cognito_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub team_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub team_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uploaded_by_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  pub id: u64,
  pub text: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: u64,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  /// Free-form comma separated labels, not cache tags
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub points: Option<u32>,
  pub project_id: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author_user_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assigned_user_id: Option<u64>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author: Option<User>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assignee: Option<User>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub comments: Option<Vec<Comment>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub attachments: Option<Vec<Attachment>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
  pub id: u64,
  pub team_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub product_owner_user_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project_manager_user_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub product_owner_username: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project_manager_username: Option<String>,
}

/// Aggregate returned by the search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
  #[serde(default)]
  pub comments: Vec<Comment>,
  #[serde(default)]
  pub attachments: Vec<Attachment>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tasks: Option<Vec<Task>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub projects: Option<Vec<Project>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub users: Option<Vec<User>>,
}

// ============================================================================
// Request bodies
// ============================================================================

/// Body for `createProject`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
}

/// Body for `createTask`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
  pub title: String,
  pub project_id: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub start_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub points: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author_user_id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assigned_user_id: Option<u64>,
}

/// Partial task sent by `updateTask`. Only set fields are transmitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<Status>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub priority: Option<Priority>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub points: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assigned_user_id: Option<u64>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_task_wire_names() {
    let task: Task = serde_json::from_value(json!({
      "id": 7,
      "title": "Ship it",
      "status": "In Progress",
      "priority": "Urgent",
      "projectId": 1,
      "assignedUserId": 3,
      "attachments": [{ "id": 1, "fileUrl": "a.png", "fileName": "a" }]
    }))
    .unwrap();

    assert_eq!(task.status, Some(Status::WorkInProgress));
    assert_eq!(task.priority, Some(Priority::Urgent));
    assert_eq!(task.assigned_user_id, Some(3));
    let attachment = &task.attachments.as_ref().unwrap()[0];
    assert_eq!(attachment.file_url.as_deref(), Some("a.png"));
  }

  #[test]
  fn test_user_profile_picture_url() {
    let user: User = serde_json::from_value(json!({
      "userId": 4,
      "username": "ada",
      "email": "ada@example.com",
      "profilePictureUrl": "p4.jpeg"
    }))
    .unwrap();
    assert_eq!(user.user_id, Some(4));
    assert_eq!(user.profile_picture_url.as_deref(), Some("p4.jpeg"));
  }

  #[test]
  fn test_search_results_missing_groups() {
    let results: SearchResults = serde_json::from_value(json!({ "tasks": [] })).unwrap();
    assert!(results.comments.is_empty());
    assert_eq!(results.tasks, Some(vec![]));
    assert!(results.projects.is_none());
  }

  #[test]
  fn test_status_parsing() {
    assert_eq!("in-progress".parse::<Status>(), Ok(Status::WorkInProgress));
    assert_eq!("To Do".parse::<Status>(), Ok(Status::ToDo));
    assert_eq!("done".parse::<Status>(), Ok(Status::Completed));
    assert!("sideways".parse::<Status>().is_err());
    assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
  }

  #[test]
  fn test_task_patch_skips_unset_fields() {
    let patch = TaskPatch {
      status: Some(Status::Completed),
      ..TaskPatch::default()
    };
    assert_eq!(
      serde_json::to_value(&patch).unwrap(),
      json!({ "status": "Completed" })
    );
  }
}

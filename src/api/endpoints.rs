//! Declarations of every remote operation the client knows about.
//!
//! Each `Operation` is plain data: how to build the HTTP request from the JSON
//! arguments, and which cache tags it provides (queries) or invalidates (mutations).
//! The coordinator consumes these generically.

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::cache::{Tag, TagKind};
use crate::error::ApiError;

use super::transport::{HttpRequest, Method};

/// Whether an operation reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
  Query,
  Mutation,
}

/// Computes tags from `(args, result)`; `result` is `None` when there is no payload.
pub type TagFn = fn(&Value, Option<&Value>) -> Vec<Tag>;

/// Static description of one query or mutation.
pub struct Operation {
  pub name: &'static str,
  pub kind: OperationKind,
  pub method: Method,
  pub path: fn(&Value) -> Result<String, ApiError>,
  pub body: fn(&Value) -> Option<Value>,
  pub provides: TagFn,
  pub invalidates: TagFn,
}

impl Operation {
  /// Build the HTTP request for `args`, validating required ids.
  pub fn request(&self, args: &Value) -> Result<HttpRequest, ApiError> {
    Ok(HttpRequest {
      method: self.method,
      path: (self.path)(args)?,
      body: (self.body)(args),
    })
  }

  pub fn ensure_kind(&self, kind: OperationKind) -> Result<(), ApiError> {
    if self.kind == kind {
      Ok(())
    } else {
      Err(ApiError::Validation(format!(
        "{} is a {:?}, not a {:?}",
        self.name, self.kind, kind
      )))
    }
  }

  pub fn provided_tags(&self, args: &Value, result: Option<&Value>) -> BTreeSet<Tag> {
    (self.provides)(args, result).into_iter().collect()
  }

  pub fn invalidated_tags(&self, args: &Value, result: Option<&Value>) -> BTreeSet<Tag> {
    (self.invalidates)(args, result).into_iter().collect()
  }
}

impl fmt::Debug for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Operation")
      .field("name", &self.name)
      .field("kind", &self.kind)
      .field("method", &self.method)
      .finish_non_exhaustive()
  }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Required integer id field of the argument object.
fn id_arg(args: &Value, field: &str) -> Result<u64, ApiError> {
  args
    .get(field)
    .and_then(Value::as_u64)
    .ok_or_else(|| ApiError::Validation(format!("missing or non-integer `{field}`")))
}

fn no_body(_: &Value) -> Option<Value> {
  None
}

fn args_body(args: &Value) -> Option<Value> {
  Some(args.clone())
}

fn no_tags(_: &Value, _: Option<&Value>) -> Vec<Tag> {
  Vec::new()
}

/// `Tasks` plus `Tasks:{id}` for every task in a list result.
fn task_list_tags(_: &Value, result: Option<&Value>) -> Vec<Tag> {
  let mut tags = vec![Tag::all(TagKind::Tasks)];
  if let Some(tasks) = result.and_then(Value::as_array) {
    tags.extend(
      tasks
        .iter()
        .filter_map(|task| task.get("id").and_then(Value::as_u64))
        .map(|id| Tag::id(TagKind::Tasks, id)),
    );
  }
  tags
}

fn single_task_tags(args: &Value, _: Option<&Value>) -> Vec<Tag> {
  id_arg(args, "taskId")
    .map(|id| vec![Tag::id(TagKind::Tasks, id)])
    .unwrap_or_default()
}

// ============================================================================
// Operation table
// ============================================================================

pub static GET_PROJECTS: Operation = Operation {
  name: "getProjects",
  kind: OperationKind::Query,
  method: Method::Get,
  path: |_| Ok("projects".into()),
  body: no_body,
  provides: |_, _| vec![Tag::all(TagKind::Projects)],
  invalidates: no_tags,
};

pub static GET_SINGLE_PROJECT: Operation = Operation {
  name: "getSingleProject",
  kind: OperationKind::Query,
  method: Method::Get,
  path: |args| Ok(format!("projects/{}", id_arg(args, "id")?)),
  body: no_body,
  provides: |args, _| {
    id_arg(args, "id")
      .map(|id| vec![Tag::id(TagKind::Projects, id)])
      .unwrap_or_default()
  },
  invalidates: no_tags,
};

pub static CREATE_PROJECT: Operation = Operation {
  name: "createProject",
  kind: OperationKind::Mutation,
  method: Method::Post,
  path: |_| Ok("projects".into()),
  body: args_body,
  provides: no_tags,
  invalidates: |_, _| vec![Tag::all(TagKind::Projects)],
};

pub static GET_TASKS: Operation = Operation {
  name: "getTasks",
  kind: OperationKind::Query,
  method: Method::Get,
  path: |args| Ok(format!("projects/{}/tasks", id_arg(args, "projectId")?)),
  body: no_body,
  provides: task_list_tags,
  invalidates: no_tags,
};

pub static GET_TASKS_BY_USER: Operation = Operation {
  name: "getTasksByUser",
  kind: OperationKind::Query,
  method: Method::Get,
  path: |args| Ok(format!("users/{}/tasks", id_arg(args, "userId")?)),
  body: no_body,
  provides: task_list_tags,
  invalidates: no_tags,
};

pub static CREATE_TASK: Operation = Operation {
  name: "createTask",
  kind: OperationKind::Mutation,
  method: Method::Post,
  path: |_| Ok("tasks".into()),
  body: args_body,
  provides: no_tags,
  invalidates: |_, _| vec![Tag::all(TagKind::Tasks)],
};

pub static UPDATE_TASK_STATUS: Operation = Operation {
  name: "updateTaskStatus",
  kind: OperationKind::Mutation,
  method: Method::Patch,
  path: |args| {
    Ok(format!(
      "projects/{}/tasks/{}",
      id_arg(args, "projectId")?,
      id_arg(args, "taskId")?
    ))
  },
  body: |args| Some(json!({ "status": args.get("status").cloned().unwrap_or(Value::Null) })),
  provides: no_tags,
  invalidates: single_task_tags,
};

pub static UPDATE_TASK: Operation = Operation {
  name: "updateTask",
  kind: OperationKind::Mutation,
  method: Method::Patch,
  path: |args| {
    Ok(format!(
      "projects/{}/tasks/{}",
      id_arg(args, "projectId")?,
      id_arg(args, "taskId")?
    ))
  },
  body: |args| Some(args.get("task").cloned().unwrap_or_else(|| json!({}))),
  provides: no_tags,
  invalidates: single_task_tags,
};

pub static GET_USERS: Operation = Operation {
  name: "getUsers",
  kind: OperationKind::Query,
  method: Method::Get,
  path: |_| Ok("users".into()),
  body: no_body,
  provides: |_, _| vec![Tag::all(TagKind::Users)],
  invalidates: no_tags,
};

pub static GET_TEAMS: Operation = Operation {
  name: "getTeams",
  kind: OperationKind::Query,
  method: Method::Get,
  path: |_| Ok("teams".into()),
  body: no_body,
  provides: |_, _| vec![Tag::all(TagKind::Teams)],
  invalidates: no_tags,
};

/// Aggregated search. Keyed by the raw term and never tagged.
pub static SEARCH: Operation = Operation {
  name: "search",
  kind: OperationKind::Query,
  method: Method::Get,
  path: |args| {
    let term = args
      .as_str()
      .ok_or_else(|| ApiError::Validation("search term must be a string".into()))?;
    let query = url::form_urlencoded::Serializer::new(String::new())
      .append_pair("query", term)
      .finish();
    Ok(format!("search?{query}"))
  },
  body: no_body,
  provides: no_tags,
  invalidates: no_tags,
};

/// Every operation, in declaration order.
pub static OPERATIONS: [&Operation; 11] = [
  &GET_PROJECTS,
  &GET_SINGLE_PROJECT,
  &CREATE_PROJECT,
  &GET_TASKS,
  &GET_TASKS_BY_USER,
  &CREATE_TASK,
  &UPDATE_TASK_STATUS,
  &UPDATE_TASK,
  &GET_USERS,
  &GET_TEAMS,
  &SEARCH,
];

/// Look an operation up by name.
pub fn find(name: &str) -> Option<&'static Operation> {
  OPERATIONS.iter().copied().find(|op| op.name == name)
}

//! Cache keys and invalidation tags.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

// ============================================================================
// Tags
// ============================================================================

/// Entity family a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
  Projects,
  Tasks,
  Users,
  Teams,
}

impl TagKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TagKind::Projects => "Projects",
      TagKind::Tasks => "Tasks",
      TagKind::Users => "Users",
      TagKind::Teams => "Teams",
    }
  }
}

/// Invalidation label attached to a cache entry, e.g. `Tasks` or `Tasks:42`.
///
/// A bare tag (no id) invalidates every entry tagged with the same kind, parameterized
/// or not. A parameterized tag only matches itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
  pub kind: TagKind,
  pub id: Option<u64>,
}

impl Tag {
  /// Tag covering the whole entity family.
  pub const fn all(kind: TagKind) -> Self {
    Self { kind, id: None }
  }

  /// Tag for a single entity.
  pub const fn id(kind: TagKind, id: u64) -> Self {
    Self { kind, id: Some(id) }
  }

  pub fn is_parameterized(&self) -> bool {
    self.id.is_some()
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.id {
      Some(id) => write!(f, "{}:{}", self.kind.as_str(), id),
      None => f.write_str(self.kind.as_str()),
    }
  }
}

// ============================================================================
// Cache key
// ============================================================================

/// Deterministic identifier of a cached query result.
///
/// Derived from the operation name and a canonical encoding of the arguments, so two
/// calls with structurally equal arguments share a key whatever their field order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  operation: &'static str,
  args_hash: String,
}

impl CacheKey {
  pub fn new(operation: &'static str, args: &Value) -> Self {
    let mut canonical = String::new();
    write_canonical(args, &mut canonical);

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical.as_bytes());

    Self {
      operation,
      args_hash: hex::encode(hasher.finalize()),
    }
  }

  pub fn operation(&self) -> &'static str {
    self.operation
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.operation, &self.args_hash[..12])
  }
}

/// JSON encoding with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      let mut fields: Vec<(&String, &Value)> = map.iter().collect();
      fields.sort_by(|a, b| a.0.cmp(b.0));

      out.push('{');
      for (i, (name, field)) in fields.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(name.clone()).to_string());
        out.push(':');
        write_canonical(field, out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_equal_args_share_key() {
    let a = CacheKey::new("getTasks", &json!({ "projectId": 1 }));
    let b = CacheKey::new("getTasks", &json!({ "projectId": 1 }));
    assert_eq!(a, b);
  }

  #[test]
  fn test_field_order_is_irrelevant() {
    let a = CacheKey::new(
      "updateTask",
      &json!({ "projectId": 1, "taskId": 2, "task": { "title": "x", "points": 3 } }),
    );
    let b = CacheKey::new(
      "updateTask",
      &json!({ "task": { "points": 3, "title": "x" }, "taskId": 2, "projectId": 1 }),
    );
    assert_eq!(a, b);
  }

  #[test]
  fn test_distinct_operations_and_args() {
    let tasks_1 = CacheKey::new("getTasks", &json!({ "projectId": 1 }));
    let tasks_2 = CacheKey::new("getTasks", &json!({ "projectId": 2 }));
    let by_user = CacheKey::new("getTasksByUser", &json!({ "projectId": 1 }));
    assert_ne!(tasks_1, tasks_2);
    assert_ne!(tasks_1, by_user);
  }

  #[test]
  fn test_tag_display() {
    assert_eq!(Tag::all(TagKind::Tasks).to_string(), "Tasks");
    assert_eq!(Tag::id(TagKind::Tasks, 42).to_string(), "Tasks:42");
    assert!(Tag::id(TagKind::Projects, 1).is_parameterized());
  }
}

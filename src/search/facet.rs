//! Display-side grouping of search results.

use std::fmt;
use std::str::FromStr;

use crate::api::types::{Project, SearchResults, Task, User};

/// Which groups of a search result to show. Filtering never refetches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchFacet {
  #[default]
  All,
  Tasks,
  Projects,
  Users,
}

impl FromStr for SearchFacet {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "all" => Ok(SearchFacet::All),
      "tasks" => Ok(SearchFacet::Tasks),
      "projects" => Ok(SearchFacet::Projects),
      "users" => Ok(SearchFacet::Users),
      _ => Err(format!("unknown facet: {s}")),
    }
  }
}

impl fmt::Display for SearchFacet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      SearchFacet::All => "all",
      SearchFacet::Tasks => "tasks",
      SearchFacet::Projects => "projects",
      SearchFacet::Users => "users",
    })
  }
}

/// One non-empty list of a search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchGroup<'a> {
  Tasks(&'a [Task]),
  Projects(&'a [Project]),
  Users(&'a [User]),
}

impl SearchGroup<'_> {
  pub fn title(&self) -> &'static str {
    match self {
      SearchGroup::Tasks(_) => "Tasks",
      SearchGroup::Projects(_) => "Projects",
      SearchGroup::Users(_) => "Users",
    }
  }

  pub fn len(&self) -> usize {
    match self {
      SearchGroup::Tasks(items) => items.len(),
      SearchGroup::Projects(items) => items.len(),
      SearchGroup::Users(items) => items.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl SearchResults {
  /// Non-empty groups selected by `facet`, ordered tasks, projects, users.
  pub fn groups(&self, facet: SearchFacet) -> Vec<SearchGroup<'_>> {
    let wants = |f: SearchFacet| facet == SearchFacet::All || facet == f;
    let mut groups = Vec::new();

    if let Some(tasks) = self.tasks.as_deref().filter(|t| !t.is_empty()) {
      if wants(SearchFacet::Tasks) {
        groups.push(SearchGroup::Tasks(tasks));
      }
    }
    if let Some(projects) = self.projects.as_deref().filter(|p| !p.is_empty()) {
      if wants(SearchFacet::Projects) {
        groups.push(SearchGroup::Projects(projects));
      }
    }
    if let Some(users) = self.users.as_deref().filter(|u| !u.is_empty()) {
      if wants(SearchFacet::Users) {
        groups.push(SearchGroup::Users(users));
      }
    }

    groups
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn results() -> SearchResults {
    serde_json::from_value(json!({
      "tasks": [{ "id": 1, "title": "Launch plan", "projectId": 1 }],
      "projects": [],
      "users": [{ "userId": 2, "username": "launcher" }]
    }))
    .unwrap()
  }

  #[test]
  fn test_all_skips_empty_groups() {
    let results = results();
    let titles: Vec<&str> = results
      .groups(SearchFacet::All)
      .iter()
      .map(SearchGroup::title)
      .collect();
    assert_eq!(titles, vec!["Tasks", "Users"]);
  }

  #[test]
  fn test_single_facet() {
    let results = results();
    let groups = results.groups(SearchFacet::Users);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 1);

    assert!(results.groups(SearchFacet::Projects).is_empty());
  }

  #[test]
  fn test_facet_parsing() {
    assert_eq!("Tasks".parse::<SearchFacet>(), Ok(SearchFacet::Tasks));
    assert!("comments".parse::<SearchFacet>().is_err());
  }
}

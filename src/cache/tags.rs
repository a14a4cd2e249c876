//! Inverted index from invalidation tag to cache keys.

use std::collections::{HashMap, HashSet};

use super::keys::{CacheKey, Tag, TagKind};

/// Tracks tag → cache keys so a mutation can find every entry it affects.
///
/// Two maps are kept in step:
/// - `exact` answers lookups for a specific tag (`Tasks:7`)
/// - `by_kind` answers lookups for a bare tag (`Tasks`) and covers keys tagged with the
///   bare tag or any parameterized variant; the count is how many of a key's tags share
///   the kind
#[derive(Debug, Default)]
pub struct TagIndex {
  exact: HashMap<Tag, HashSet<CacheKey>>,
  by_kind: HashMap<TagKind, HashMap<CacheKey, usize>>,
}

impl TagIndex {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add `key` to each tag bucket.
  pub fn tag_entry<'a>(&mut self, key: &CacheKey, tags: impl IntoIterator<Item = &'a Tag>) {
    for tag in tags {
      if self.exact.entry(*tag).or_default().insert(key.clone()) {
        *self
          .by_kind
          .entry(tag.kind)
          .or_default()
          .entry(key.clone())
          .or_insert(0) += 1;
      }
    }
  }

  /// Remove `key` from each tag bucket, dropping buckets that become empty.
  pub fn untag_entry<'a>(&mut self, key: &CacheKey, tags: impl IntoIterator<Item = &'a Tag>) {
    for tag in tags {
      let Some(bucket) = self.exact.get_mut(tag) else {
        continue;
      };
      if !bucket.remove(key) {
        continue;
      }
      if bucket.is_empty() {
        self.exact.remove(tag);
      }

      if let Some(kind_bucket) = self.by_kind.get_mut(&tag.kind) {
        if let Some(count) = kind_bucket.get_mut(key) {
          *count -= 1;
          if *count == 0 {
            kind_bucket.remove(key);
          }
        }
        if kind_bucket.is_empty() {
          self.by_kind.remove(&tag.kind);
        }
      }
    }
  }

  /// Keys currently tagged with `tag`. A bare tag also returns keys tagged with any
  /// parameterized variant of it.
  pub fn lookup(&self, tag: &Tag) -> HashSet<CacheKey> {
    if tag.is_parameterized() {
      self.exact.get(tag).cloned().unwrap_or_default()
    } else {
      self
        .by_kind
        .get(&tag.kind)
        .map(|keys| keys.keys().cloned().collect())
        .unwrap_or_default()
    }
  }

  /// Whether `key` sits in the bucket of exactly `tag`.
  pub fn contains(&self, tag: &Tag, key: &CacheKey) -> bool {
    self
      .exact
      .get(tag)
      .map(|bucket| bucket.contains(key))
      .unwrap_or(false)
  }

  /// Number of distinct tags with at least one key.
  pub fn tag_count(&self) -> usize {
    self.exact.len()
  }

  pub fn is_empty(&self) -> bool {
    self.exact.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn key(project: u64) -> CacheKey {
    CacheKey::new("getTasks", &json!({ "projectId": project }))
  }

  #[test]
  fn test_tag_and_lookup() {
    let mut index = TagIndex::new();
    let k = key(1);
    index.tag_entry(&k, &[Tag::all(TagKind::Projects)]);

    assert!(index.lookup(&Tag::all(TagKind::Projects)).contains(&k));
    assert!(index.lookup(&Tag::all(TagKind::Tasks)).is_empty());
  }

  #[test]
  fn test_bare_tag_matches_parameterized_variants() {
    let mut index = TagIndex::new();
    let k1 = key(1);
    let k2 = key(2);
    index.tag_entry(&k1, &[Tag::id(TagKind::Tasks, 7)]);
    index.tag_entry(&k2, &[Tag::all(TagKind::Tasks)]);

    let all = index.lookup(&Tag::all(TagKind::Tasks));
    assert_eq!(all.len(), 2);

    let seven = index.lookup(&Tag::id(TagKind::Tasks, 7));
    assert_eq!(seven.len(), 1);
    assert!(seven.contains(&k1));
    assert!(index.lookup(&Tag::id(TagKind::Tasks, 8)).is_empty());
  }

  #[test]
  fn test_partial_untag_keeps_kind_membership() {
    let mut index = TagIndex::new();
    let k = key(1);
    let tags = [Tag::id(TagKind::Tasks, 1), Tag::id(TagKind::Tasks, 2)];
    index.tag_entry(&k, &tags);

    index.untag_entry(&k, &tags[..1]);
    assert!(index.lookup(&Tag::all(TagKind::Tasks)).contains(&k));

    index.untag_entry(&k, &tags[1..]);
    assert!(index.lookup(&Tag::all(TagKind::Tasks)).is_empty());
    assert!(index.is_empty());
  }

  #[test]
  fn test_double_tag_is_idempotent() {
    let mut index = TagIndex::new();
    let k = key(1);
    let tag = Tag::id(TagKind::Tasks, 3);
    index.tag_entry(&k, &[tag]);
    index.tag_entry(&k, &[tag]);
    index.untag_entry(&k, &[tag]);

    assert!(index.lookup(&Tag::all(TagKind::Tasks)).is_empty());
    assert_eq!(index.tag_count(), 0);
  }

  #[test]
  fn test_untag_unknown_is_noop() {
    let mut index = TagIndex::new();
    index.untag_entry(&key(1), &[Tag::all(TagKind::Users)]);
    assert!(index.is_empty());
  }
}

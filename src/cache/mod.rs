//! Tag-indexed, auto-revalidating cache of query results.
//!
//! This module provides:
//! - `CacheStore`: one entry per (operation, arguments) key with status, payload and tags
//! - `TagIndex`: tag → keys, so a mutation finds every entry it invalidates
//! - `RequestCoordinator`: deduplicates in-flight requests, applies responses and
//!   refetches subscribed entries after invalidation

mod coordinator;
mod keys;
mod store;
mod tags;

pub use coordinator::{RequestCoordinator, Subscription};
pub use keys::{CacheKey, Tag, TagKind};
pub use store::{CacheEntry, CacheStore, EntryStatus, SubscriptionToken};
pub use tags::TagIndex;

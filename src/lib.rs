//! Client core for the project-management API: typed endpoints, a tag-indexed query
//! cache that revalidates itself after mutations, and a debounced search controller.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod query;
pub mod search;

//! Client for the project-management REST API.
//!
//! - `endpoints`: every query and mutation with its cache tags
//! - `transport`: the HTTP seam (`reqwest` in production, canned responses in tests)
//! - `client`: typed methods on top of the cache coordinator
//! - `types`: entities exchanged with the server

pub mod client;
pub mod endpoints;
pub mod transport;
pub mod types;

pub use client::ApiClient;

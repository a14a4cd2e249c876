use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ApiError;

/// HTTP verbs used by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Post,
  Patch,
}

impl Method {
  fn as_reqwest(self) -> reqwest::Method {
    match self {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Patch => reqwest::Method::PATCH,
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Patch => "PATCH",
    })
  }
}

/// A request ready to send, relative to the API base URL
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
  pub method: Method,
  /// Path and query, without a leading slash (e.g. `projects/1/tasks`)
  pub path: String,
  pub body: Option<Value>,
}

impl fmt::Display for HttpRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} /{}", self.method, self.path)
  }
}

/// Executes requests against the remote service.
///
/// The returned future must not borrow `self`, so the coordinator can share and
/// drive it from a spawned task.
pub trait Transport: Send + Sync {
  fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<Value, ApiError>>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base_url = normalize_base_url(&config.base_url)?;

    let client = reqwest::Client::builder()
      .user_agent(concat!("taskboard/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Absolute URL for a request path.
  pub fn url_for(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::Validation(format!("invalid request path {path:?}: {e}")))
  }
}

/// Parse the configured base URL, making sure relative joins keep its path.
fn normalize_base_url(raw: &str) -> Result<Url> {
  let mut url =
    Url::parse(raw.trim()).map_err(|e| eyre!("Invalid API base URL {:?}: {}", raw, e))?;
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  Ok(url)
}

impl Transport for HttpTransport {
  fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<Value, ApiError>> {
    execute(self.client.clone(), self.url_for(&request.path), request).boxed()
  }
}

async fn execute(
  client: reqwest::Client,
  url: Result<Url, ApiError>,
  request: HttpRequest,
) -> Result<Value, ApiError> {
  let mut builder = client.request(request.method.as_reqwest(), url?);
  if let Some(body) = &request.body {
    builder = builder.json(body);
  }

  let response = builder
    .send()
    .await
    .map_err(|e| ApiError::Network(e.to_string()))?;

  let status = response.status();
  let bytes = response
    .bytes()
    .await
    .map_err(|e| ApiError::Network(e.to_string()))?;

  if !status.is_success() {
    return Err(ApiError::Http {
      status: status.as_u16(),
      body: String::from_utf8_lossy(&bytes).into_owned(),
    });
  }

  // 204 and friends
  if bytes.iter().all(u8::is_ascii_whitespace) {
    return Ok(Value::Null);
  }
  Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
pub mod mock {
  //! In-process transport for tests.

  use super::*;
  use std::collections::HashMap;
  use std::sync::Mutex;
  use std::time::Duration;

  #[derive(Clone)]
  struct Route {
    response: Result<Value, ApiError>,
    latency: Duration,
  }

  /// Serves canned responses keyed by `"METHOD path"` and records every request.
  ///
  /// Latency uses tokio time, so tests with a paused clock stay deterministic.
  #[derive(Default)]
  pub struct MockTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<HttpRequest>>,
  }

  impl MockTransport {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn respond(&self, method: Method, path: &str, body: Value) {
      self.route(method, path, Ok(body), Duration::ZERO);
    }

    pub fn respond_after(&self, method: Method, path: &str, body: Value, latency: Duration) {
      self.route(method, path, Ok(body), latency);
    }

    pub fn fail(&self, method: Method, path: &str, error: ApiError) {
      self.route(method, path, Err(error), Duration::ZERO);
    }

    fn route(&self, method: Method, path: &str, response: Result<Value, ApiError>, latency: Duration) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(format!("{method} {path}"), Route { response, latency });
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
      self.calls.lock().unwrap().clone()
    }

    /// Number of requests sent to `"METHOD path"`.
    pub fn count(&self, method: Method, path: &str) -> usize {
      self
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|call| call.method == method && call.path == path)
        .count()
    }
  }

  impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<Value, ApiError>> {
      let name = format!("{} {}", request.method, request.path);
      let route = self
        .routes
        .lock()
        .unwrap()
        .get(&name)
        .cloned()
        .unwrap_or_else(|| Route {
          response: Err(ApiError::Http {
            status: 404,
            body: format!("no route for {name}"),
          }),
          latency: Duration::ZERO,
        });
      self.calls.lock().unwrap().push(request);

      async move {
        if !route.latency.is_zero() {
          tokio::time::sleep(route.latency).await;
        }
        route.response
      }
      .boxed()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn transport(base: &str) -> HttpTransport {
    HttpTransport::new(&ApiConfig {
      base_url: base.to_string(),
    })
    .unwrap()
  }

  #[test]
  fn test_base_url_keeps_path_prefix() {
    let transport = transport("http://localhost:8000/api");
    assert_eq!(
      transport.url_for("projects/1/tasks").unwrap().as_str(),
      "http://localhost:8000/api/projects/1/tasks"
    );
  }

  #[test]
  fn test_leading_slash_is_relative_to_base() {
    let transport = transport("http://localhost:8000/");
    assert_eq!(
      transport.url_for("/search?query=abc").unwrap().as_str(),
      "http://localhost:8000/search?query=abc"
    );
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(HttpTransport::new(&ApiConfig {
      base_url: "not a url".into()
    })
    .is_err());
  }

  #[test]
  fn test_request_display() {
    let request = HttpRequest {
      method: Method::Patch,
      path: "projects/1/tasks/7".into(),
      body: None,
    };
    assert_eq!(request.to_string(), "PATCH /projects/1/tasks/7");
  }
}

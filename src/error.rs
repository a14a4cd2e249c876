use thiserror::Error;

/// Errors produced by the API client and its cache.
///
/// Transport failures (`Network`, `Http`, `Decode`) are captured per cache entry and handed
/// to subscribers as data. `Precondition` and `Validation` are contract violations by the
/// caller and are returned immediately.
///
/// The type is `Clone` because one deduplicated request fans its outcome out to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// The request never produced a response
  #[error("network error: {0}")]
  Network(String),

  /// The server answered with a non-2xx status
  #[error("HTTP {status}: {body}")]
  Http { status: u16, body: String },

  /// The response body did not match the expected shape
  #[error("failed to decode response: {0}")]
  Decode(String),

  /// Misuse of the cache contract, e.g. releasing an unknown subscription
  #[error("precondition violated: {0}")]
  Precondition(String),

  /// Malformed arguments for an operation
  #[error("invalid arguments: {0}")]
  Validation(String),
}

impl ApiError {
  /// Whether this error came from talking to the remote service.
  pub fn is_transport(&self) -> bool {
    matches!(
      self,
      ApiError::Network(_) | ApiError::Http { .. } | ApiError::Decode(_)
    )
  }

  /// HTTP status, if the server answered.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Http { status, .. } => Some(*status),
      _ => None,
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    ApiError::Decode(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transport_classification() {
    assert!(ApiError::Network("reset".into()).is_transport());
    assert!(ApiError::Http {
      status: 500,
      body: String::new()
    }
    .is_transport());
    assert!(!ApiError::Validation("missing id".into()).is_transport());
    assert!(!ApiError::Precondition("unknown token".into()).is_transport());
  }

  #[test]
  fn test_http_error_display() {
    let err = ApiError::Http {
      status: 404,
      body: "not found".into(),
    };
    assert_eq!(err.to_string(), "HTTP 404: not found");
    assert_eq!(err.status(), Some(404));
  }
}

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use common::config::UpdateParseError;
use common::status::ControllerState;
use serde::Serialize;
use std::fmt::{self, Display};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid JSON: {0}")]
  InvalidJson(#[from] UpdateParseError),
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to encode configuration: {0}")]
  Encode(#[from] serde_json::Error),
}

/// Failures reported by a media pipeline backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
  #[error("element '{0}' is not available")]
  ElementMissing(String),
  #[error("encoder '{0}' is not available")]
  EncoderUnavailable(String),
  #[error("failed to link {0}")]
  Link(String),
  #[error("state change failed: {0}")]
  StateChange(String),
  #[error("pipeline has no sink element")]
  SinkMissing,
  #[error("{0}")]
  Other(String),
}

impl BackendError {
  /// The next encoder candidate may still succeed after this error.
  pub fn allows_fallback(&self) -> bool {
    matches!(self, BackendError::EncoderUnavailable(_) | BackendError::Link(_))
  }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
  #[error("no usable encoder (tried {}): {last}", tried.join(", "))]
  EncodersExhausted { tried: Vec<String>, last: BackendError },
  #[error("pipeline build failed: {0}")]
  Build(#[source] BackendError),
  #[error("sink patch failed: {0}")]
  Patch(#[source] BackendError),
  #[error("illegal state transition {from} -> {to}")]
  IllegalTransition {
    from: ControllerState,
    to: ControllerState,
  },
  #[error("backend worker failed: {0}")]
  Worker(String),
}

/// JSON error returned by the control API.
#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  message: String,
}

impl ApiError {
  pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
    Self {
      status,
      message: message.into(),
    }
  }

  pub fn bad_request(message: impl Into<String>) -> Self {
    Self::new(StatusCode::BAD_REQUEST, message)
  }

  pub fn not_found() -> Self {
    Self::new(StatusCode::NOT_FOUND, "Not Found")
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
  }

  pub fn status(&self) -> StatusCode {
    self.status
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = Json(ErrorBody {
      error: self.message,
    });
    (self.status, body).into_response()
  }
}

impl Display for ApiError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.message, self.status)
  }
}

impl std::error::Error for ApiError {}

impl From<SupervisorError> for ApiError {
  fn from(value: SupervisorError) -> Self {
    Self::internal(value.to_string())
  }
}

#[derive(Serialize)]
struct ErrorBody {
  error: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_encoder_and_link_errors_fall_back() {
    assert!(BackendError::EncoderUnavailable("x264enc".into()).allows_fallback());
    assert!(BackendError::Link("encoder ! h264parse".into()).allows_fallback());
    assert!(!BackendError::ElementMissing("libcamerasrc".into()).allows_fallback());
    assert!(!BackendError::StateChange("camera busy".into()).allows_fallback());
  }

  #[test]
  fn exhausted_error_lists_candidates() {
    let err = SupervisorError::EncodersExhausted {
      tried: vec!["v4l2h264enc".into(), "x264enc".into()],
      last: BackendError::EncoderUnavailable("x264enc".into()),
    };
    assert_eq!(
      err.to_string(),
      "no usable encoder (tried v4l2h264enc, x264enc): encoder 'x264enc' is not available"
    );
  }

  #[test]
  fn api_error_status() {
    assert_eq!(ApiError::not_found().status(), StatusCode::NOT_FOUND);
    assert_eq!(ApiError::bad_request("Invalid JSON").status(), StatusCode::BAD_REQUEST);
  }
}

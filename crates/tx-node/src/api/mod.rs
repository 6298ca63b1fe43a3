mod routes;

use crate::supervisor::Supervisor;
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use telemetry::trace_http_request;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct TxNodeState {
  inner: Arc<StateInner>,
}

struct StateInner {
  supervisor: Arc<Supervisor>,
}

impl TxNodeState {
  pub fn new(supervisor: Arc<Supervisor>) -> Self {
    Self {
      inner: Arc::new(StateInner { supervisor }),
    }
  }

  pub fn supervisor(&self) -> &Arc<Supervisor> {
    &self.inner.supervisor
  }
}

pub fn router(state: TxNodeState) -> Router {
  Router::new()
    .route("/health", get(routes::health).fallback(routes::not_found))
    .route(
      "/config",
      get(routes::get_config)
        .post(routes::post_config)
        .fallback(routes::not_found),
    )
    .route("/stats", get(routes::stats).fallback(routes::not_found))
    .route("/status", get(routes::status).fallback(routes::not_found))
    .route("/devices", get(routes::devices).fallback(routes::not_found))
    .route(
      "/devices/:id/modes",
      get(routes::device_modes).fallback(routes::not_found),
    )
    .route("/metrics", get(routes::metrics).fallback(routes::not_found))
    .fallback(routes::not_found)
    .layer(middleware::from_fn(trace_http_request))
    .layer(CorsLayer::permissive())
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::{SimulatedBackend, SimulatedOptions};
  use crate::supervisor::SupervisorSettings;
  use axum::body::Body;
  use axum::http::{Request, StatusCode};
  use common::config::Configuration;
  use tower::ServiceExt;

  fn app() -> Router {
    let backend = SimulatedBackend::new(SimulatedOptions::manual());
    let supervisor = Supervisor::new(
      Arc::new(backend),
      Configuration::default(),
      SupervisorSettings::default(),
      None,
    );
    router(TxNodeState::new(supervisor))
  }

  #[tokio::test]
  async fn responses_allow_any_origin() {
    let response = app()
      .oneshot(
        Request::builder()
          .uri("/health")
          .header("origin", "http://example.com")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
      response.headers().get("access-control-allow-origin").unwrap(),
      "*"
    );
    assert!(response.headers().contains_key("x-correlation-id"));
  }

  #[tokio::test]
  async fn wrong_method_is_not_found() {
    let response = app()
      .oneshot(
        Request::builder()
          .method("DELETE")
          .uri("/config")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }
}

use super::TxNodeState;
use crate::error::ApiError;
use crate::supervisor::ReconcileOutcome;
use axum::{
  body::Bytes,
  extract::{Path, State},
  http::header,
  response::IntoResponse,
  Json,
};
use common::config::{ConfigUpdate, Configuration, SUPPORTED_ENCODERS};
use common::status::{
  DeviceListResponse, DeviceModesResponse, HealthResponse, StatusResponse, StreamStatsView,
  UpdateAction, UpdateResponse, VideoMode,
};
use common::validation;
use telemetry::metrics::{encode_metrics, TX_CONFIG_UPDATES};
use tracing::{debug, info};

pub(super) async fn not_found() -> ApiError {
  ApiError::not_found()
}

pub(super) async fn health(State(state): State<TxNodeState>) -> Json<HealthResponse> {
  Json(HealthResponse {
    status: "ok".to_string(),
    state: state.supervisor().state().await,
  })
}

pub(super) async fn get_config(State(state): State<TxNodeState>) -> Json<Configuration> {
  Json(state.supervisor().config().await)
}

pub(super) async fn post_config(
  State(state): State<TxNodeState>,
  body: Bytes,
) -> Result<Json<UpdateResponse>, ApiError> {
  let update = ConfigUpdate::from_json(&body).map_err(|e| {
    debug!(error = %e, "rejecting configuration body");
    TX_CONFIG_UPDATES.with_label_values(&["invalid"]).inc();
    ApiError::bad_request("Invalid JSON")
  })?;

  let (applied, outcome) = state.supervisor().submit(&update).await;
  let outcome = outcome.map_err(|e| {
    TX_CONFIG_UPDATES.with_label_values(&["failed"]).inc();
    ApiError::from(e)
  })?;

  let (action, label) = match outcome {
    ReconcileOutcome::Unchanged => (UpdateAction::None, "none"),
    ReconcileOutcome::Ignored => (UpdateAction::Ignored, "ignored"),
    ReconcileOutcome::Deferred => (UpdateAction::Deferred, "deferred"),
    ReconcileOutcome::Patched => (UpdateAction::Patched, "patched"),
    ReconcileOutcome::PatchFailed => (UpdateAction::PatchFailed, "patch_failed"),
    ReconcileOutcome::Scheduled | ReconcileOutcome::Rebuilt | ReconcileOutcome::FellBack => {
      (UpdateAction::RebuildScheduled, "rebuild")
    }
  };
  TX_CONFIG_UPDATES.with_label_values(&[label]).inc();
  info!(
    action = label,
    changed = ?applied.delta.fields().collect::<Vec<_>>(),
    rejected = applied.rejections.len(),
    "configuration updated"
  );

  Ok(Json(UpdateResponse {
    status: "configuration updated".to_string(),
    action,
    rejected: applied.rejections,
  }))
}

pub(super) async fn stats(State(state): State<TxNodeState>) -> Json<StreamStatsView> {
  Json(state.supervisor().stats().await)
}

pub(super) async fn status(State(state): State<TxNodeState>) -> Json<StatusResponse> {
  Json(state.supervisor().status().await)
}

pub(super) async fn devices(State(state): State<TxNodeState>) -> Result<Json<DeviceListResponse>, ApiError> {
  let backend = state.supervisor().backend().clone();
  let listing = tokio::task::spawn_blocking(move || {
    let encoders = SUPPORTED_ENCODERS
      .iter()
      .filter(|enc| backend.encoder_available(enc))
      .map(|enc| enc.to_string())
      .collect();
    DeviceListResponse {
      devices: backend.devices(),
      encoders,
    }
  })
  .await
  .map_err(|e| ApiError::internal(format!("device probe failed: {e}")))?;
  Ok(Json(listing))
}

pub(super) async fn device_modes(
  State(state): State<TxNodeState>,
  Path(id): Path<String>,
) -> Result<Json<DeviceModesResponse>, ApiError> {
  validation::validate_device(&id).map_err(|e| ApiError::bad_request(e.to_string()))?;

  let backend = state.supervisor().backend().clone();
  let device = id.clone();
  let mut modes = tokio::task::spawn_blocking(move || backend.device_modes(&device))
    .await
    .map_err(|e| ApiError::internal(format!("device probe failed: {e}")))?;
  if modes.is_empty() {
    debug!(device = %id, "no modes reported, using basic fallbacks");
    modes = VideoMode::basic_fallbacks();
  }

  Ok(Json(DeviceModesResponse {
    device: id,
    supported_resolutions: modes,
  }))
}

pub(super) async fn metrics() -> Result<impl IntoResponse, ApiError> {
  let body = encode_metrics().map_err(|e| ApiError::internal(format!("failed to encode metrics: {e}")))?;
  Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

//! Integration tests for the tx-node control API
//!
//! The router runs against the simulated backend with manual frames, so
//! frame counters only move when a test pushes frames.

use common::config::{ConfigField, Configuration};
use common::status::{
  ControllerState, DeviceListResponse, DeviceModesResponse, HealthResponse, StatusResponse,
  StreamStatsView, UpdateAction, UpdateResponse,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tx_node::api::{self, TxNodeState};
use tx_node::backend::{SimulatedBackend, SimulatedOptions};
use tx_node::supervisor::{RestartPolicy, Supervisor, SupervisorSettings};

fn test_settings() -> SupervisorSettings {
  SupervisorSettings {
    teardown_timeout: Duration::from_millis(200),
    quiescence: Duration::from_millis(5),
    restart: RestartPolicy::default(),
  }
}

/// Helper to create a started controller behind a test server
async fn setup_test_server() -> (axum_test::TestServer, SimulatedBackend, Arc<Supervisor>) {
  let backend = SimulatedBackend::new(SimulatedOptions::manual());
  let supervisor = Supervisor::new(
    Arc::new(backend.clone()),
    Configuration::default(),
    test_settings(),
    None,
  );
  supervisor.start().await.unwrap();
  let app = api::router(TxNodeState::new(supervisor.clone()));
  let server = axum_test::TestServer::new(app).unwrap();
  (server, backend, supervisor)
}

async fn wait_for_rebuild(server: &axum_test::TestServer, backend: &SimulatedBackend, builds: usize) {
  for _ in 0..200 {
    let status: StatusResponse = server.get("/status").await.json();
    if status.state == ControllerState::Running && !status.pending_restart && backend.builds() >= builds {
      return;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("rebuild did not complete");
}

#[tokio::test]
async fn test_health_reports_running() {
  let (server, _backend, _sup) = setup_test_server().await;

  let response = server.get("/health").await;
  assert_eq!(response.status_code(), 200);

  let health: HealthResponse = response.json();
  assert_eq!(health.status, "ok");
  assert_eq!(health.state, ControllerState::Running);
}

#[tokio::test]
async fn test_get_config_returns_full_document() {
  let (server, _backend, _sup) = setup_test_server().await;

  let response = server.get("/config").await;
  assert_eq!(response.status_code(), 200);
  let config: Configuration = response.json();
  assert_eq!(config, Configuration::default());
}

#[tokio::test]
async fn test_host_update_is_patched_without_restart() {
  let (server, backend, _sup) = setup_test_server().await;
  for _ in 0..10 {
    backend.push_frame(1200);
  }

  let response = server.post("/config").json(&json!({"host": "10.0.0.5"})).await;
  assert_eq!(response.status_code(), 200);
  let update: UpdateResponse = response.json();
  assert_eq!(update.status, "configuration updated");
  assert_eq!(update.action, UpdateAction::Patched);
  assert!(update.rejected.is_empty());

  let health: HealthResponse = server.get("/health").await.json();
  assert_eq!(health.state, ControllerState::Running);
  let stats: StreamStatsView = server.get("/stats").await.json();
  assert_eq!(stats.frame_count, 10);
  assert_eq!(stats.total_bytes, 12_000);
  assert_eq!(backend.builds(), 1);
  assert_eq!(backend.current_sink(), Some(("10.0.0.5".to_string(), 5000)));

  let config: Configuration = server.get("/config").await.json();
  assert_eq!(config.host, "10.0.0.5");
}

#[tokio::test]
async fn test_resolution_change_rebuilds_and_resets_stats() {
  let (server, backend, _sup) = setup_test_server().await;
  for _ in 0..10 {
    backend.push_frame(1200);
  }

  let response = server
    .post("/config")
    .json(&json!({"width": 1920, "height": 1080}))
    .await;
  assert_eq!(response.status_code(), 200);
  let update: UpdateResponse = response.json();
  assert_eq!(update.action, UpdateAction::RebuildScheduled);

  wait_for_rebuild(&server, &backend, 2).await;
  assert_eq!(backend.builds(), 2);
  assert_eq!(backend.stops(), 1);

  let stats: StreamStatsView = server.get("/stats").await.json();
  assert_eq!(stats.frame_count, 0);
  assert_eq!(stats.total_bytes, 0);

  let built = backend.last_built_config().unwrap();
  assert_eq!((built.width, built.height), (1920, 1080));
}

#[tokio::test]
async fn test_out_of_range_framerate_is_rejected() {
  let (server, backend, _sup) = setup_test_server().await;

  let response = server.post("/config").json(&json!({"framerate": 500})).await;
  assert_eq!(response.status_code(), 200);
  let update: UpdateResponse = response.json();
  assert_eq!(update.action, UpdateAction::None);
  assert_eq!(update.rejected.len(), 1);
  assert_eq!(update.rejected[0].field, ConfigField::Framerate);
  assert_eq!(update.rejected[0].reason, "framerate must be between 1 and 120, got 500");

  let config: Configuration = server.get("/config").await.json();
  assert_eq!(config.framerate, 30);
  assert_eq!(backend.builds(), 1);
}

#[tokio::test]
async fn test_partial_rejection_still_applies_valid_fields() {
  let (server, _backend, _sup) = setup_test_server().await;

  let response = server
    .post("/config")
    .json(&json!({"port": 70000, "host": "192.168.1.50"}))
    .await;
  let update: UpdateResponse = response.json();
  assert_eq!(update.action, UpdateAction::Patched);
  assert_eq!(update.rejected.len(), 1);
  assert_eq!(update.rejected[0].field, ConfigField::Port);

  let config: Configuration = server.get("/config").await.json();
  assert_eq!(config.host, "192.168.1.50");
  assert_eq!(config.port, 5000);
}

#[tokio::test]
async fn test_failed_sink_patch_reports_degraded() {
  let (server, backend, _sup) = setup_test_server().await;
  backend.fail_patches(true);

  let response = server
    .post("/config")
    .json(&json!({"port": 6000, "framerate": 500}))
    .await;
  assert_eq!(response.status_code(), 200);
  let update: UpdateResponse = response.json();
  assert_eq!(update.status, "configuration updated");
  assert_eq!(update.action, UpdateAction::PatchFailed);
  assert_eq!(update.rejected.len(), 1);
  assert_eq!(update.rejected[0].field, ConfigField::Framerate);

  let status: StatusResponse = server.get("/status").await.json();
  assert_eq!(status.state, ControllerState::Degraded);
  assert!(status.last_error.is_some());
  let config: Configuration = server.get("/config").await.json();
  assert_eq!(config.port, 6000);
  assert_eq!(config.framerate, 30);

  // A later successful patch brings the stream back
  backend.fail_patches(false);
  let update: UpdateResponse = server.post("/config").json(&json!({"port": 6001})).await.json();
  assert_eq!(update.action, UpdateAction::Patched);
  let health: HealthResponse = server.get("/health").await.json();
  assert_eq!(health.state, ControllerState::Running);
}

#[tokio::test]
async fn test_invalid_json_is_bad_request() {
  let (server, _backend, _sup) = setup_test_server().await;

  let response = server.post("/config").text("{ not json").await;
  assert_eq!(response.status_code(), 400);
  let body: serde_json::Value = response.json();
  assert_eq!(body, json!({"error": "Invalid JSON"}));

  let response = server.post("/config").json(&json!([1, 2, 3])).await;
  assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_unknown_routes_are_not_found() {
  let (server, _backend, _sup) = setup_test_server().await;

  let response = server.get("/nope").await;
  assert_eq!(response.status_code(), 404);
  let body: serde_json::Value = response.json();
  assert_eq!(body, json!({"error": "Not Found"}));

  let response = server.put("/stats").await;
  assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_device_listing() {
  let (server, backend, _sup) = setup_test_server().await;
  backend.set_encoder_available("nvh264enc", false);

  let devices: DeviceListResponse = server.get("/devices").await.json();
  assert_eq!(devices.devices.len(), 1);
  assert_eq!(devices.devices[0].id, "sim0");
  assert!(devices.encoders.iter().any(|e| e == "x264enc"));
  assert!(!devices.encoders.iter().any(|e| e == "nvh264enc"));
}

#[tokio::test]
async fn test_device_modes_fall_back_to_basic_list() {
  let (server, _backend, _sup) = setup_test_server().await;

  let modes: DeviceModesResponse = server.get("/devices/sim0/modes").await.json();
  assert_eq!(modes.device, "sim0");
  assert_eq!(modes.supported_resolutions.len(), 3);
  assert_eq!(modes.supported_resolutions[1].width, 1920);

  let modes: DeviceModesResponse = server.get("/devices/unknown-cam/modes").await.json();
  let sizes: Vec<_> = modes
    .supported_resolutions
    .iter()
    .map(|m| (m.width, m.height, m.max_framerate))
    .collect();
  assert_eq!(sizes, vec![(640, 480, 30), (1280, 720, 30), (1920, 1080, 15)]);
}

#[tokio::test]
async fn test_status_reports_running_encoder() {
  let (server, _backend, _sup) = setup_test_server().await;

  let status: StatusResponse = server.get("/status").await.json();
  assert_eq!(status.state, ControllerState::Running);
  assert_eq!(status.encoder.as_deref(), Some("v4l2h264enc"));
  assert!(!status.pending_restart);
  assert_eq!(status.restarts_in_window, 0);
}

#[tokio::test]
async fn test_metrics_are_exposed() {
  let (server, _backend, _sup) = setup_test_server().await;
  server.post("/config").json(&json!({"framerate": 500})).await;

  let response = server.get("/metrics").await;
  assert_eq!(response.status_code(), 200);
  let text = response.text();
  assert!(text.contains("tx_controller_state"));
  assert!(text.contains("tx_rejected_fields_total"));
}

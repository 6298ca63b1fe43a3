use crate::config::{CaptureSource, FieldRejection};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the supervised pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
  Stopped,
  Building,
  Running,
  Restarting,
  Degraded,
  Terminating,
}

impl ControllerState {
  /// A build is in flight and owns the pipeline slot.
  pub fn is_transitioning(&self) -> bool {
    matches!(self, ControllerState::Building | ControllerState::Restarting)
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, ControllerState::Terminating)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ControllerState::Stopped => "stopped",
      ControllerState::Building => "building",
      ControllerState::Running => "running",
      ControllerState::Restarting => "restarting",
      ControllerState::Degraded => "degraded",
      ControllerState::Terminating => "terminating",
    }
  }

  /// Numeric code exported on the state gauge.
  pub fn code(&self) -> i64 {
    match self {
      ControllerState::Stopped => 0,
      ControllerState::Building => 1,
      ControllerState::Running => 2,
      ControllerState::Restarting => 3,
      ControllerState::Degraded => 4,
      ControllerState::Terminating => 5,
    }
  }
}

impl fmt::Display for ControllerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
  pub status: String,
  pub state: ControllerState,
}

/// Point-in-time view of transmission counters plus derived rates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamStatsView {
  pub total_bytes: u64,
  pub frame_count: u64,
  pub current_bitrate_kbps: f64,
  pub elapsed_secs: f64,
  pub actual_framerate: Option<f64>,
  pub target_framerate: u32,
  pub efficiency_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
  pub state: ControllerState,
  /// Encoder element actually running, which may differ from the requested one.
  pub encoder: Option<String>,
  pub pending_restart: bool,
  pub restarts_in_window: usize,
  pub last_error: Option<String>,
  pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
  /// Nothing changed
  None,
  /// Sink address patched on the live pipeline
  Patched,
  /// Values stored, but the live sink refused them; the controller is degraded
  PatchFailed,
  /// Teardown and rebuild scheduled
  RebuildScheduled,
  /// A rebuild is already running; it will pick up this change
  Deferred,
  /// Controller is shutting down
  Ignored,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateResponse {
  pub status: String,
  pub action: UpdateAction,
  pub rejected: Vec<FieldRejection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
  pub id: String,
  pub name: String,
  pub source: CaptureSource,
  pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoMode {
  pub width: u32,
  pub height: u32,
  pub max_framerate: u32,
  pub description: Option<String>,
}

impl VideoMode {
  /// Modes reported when a device cannot be probed.
  pub fn basic_fallbacks() -> Vec<VideoMode> {
    vec![
      VideoMode {
        width: 640,
        height: 480,
        max_framerate: 30,
        description: Some("VGA (basic fallback)".to_string()),
      },
      VideoMode {
        width: 1280,
        height: 720,
        max_framerate: 30,
        description: Some("HD (basic fallback)".to_string()),
      },
      VideoMode {
        width: 1920,
        height: 1080,
        max_framerate: 15,
        description: Some("Full HD (basic fallback)".to_string()),
      },
    ]
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceListResponse {
  pub devices: Vec<DeviceInfo>,
  pub encoders: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceModesResponse {
  pub device: String,
  pub supported_resolutions: Vec<VideoMode>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transitioning_states() {
    assert!(ControllerState::Building.is_transitioning());
    assert!(ControllerState::Restarting.is_transitioning());
    assert!(!ControllerState::Running.is_transitioning());
    assert!(!ControllerState::Degraded.is_transitioning());
    assert!(ControllerState::Terminating.is_terminal());
  }

  #[test]
  fn state_serializes_snake_case() {
    let health = HealthResponse {
      status: "ok".into(),
      state: ControllerState::Restarting,
    };
    let json = serde_json::to_string(&health).unwrap();
    assert_eq!(json, r#"{"status":"ok","state":"restarting"}"#);
  }

  #[test]
  fn fallback_modes_cover_vga_to_full_hd() {
    let modes = VideoMode::basic_fallbacks();
    assert_eq!(modes.len(), 3);
    assert_eq!(modes[2].max_framerate, 15);
  }
}

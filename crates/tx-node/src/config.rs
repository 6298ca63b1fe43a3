use crate::supervisor::{RestartPolicy, SupervisorSettings};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
  /// libcamera/V4L2 capture through GStreamer
  Gstreamer,
  /// Synthetic frames, no hardware
  Simulated,
}

impl Default for BackendKind {
  fn default() -> Self {
    if cfg!(feature = "gstreamer") {
      BackendKind::Gstreamer
    } else {
      BackendKind::Simulated
    }
  }
}

#[derive(Clone, Debug, Parser)]
#[command(name = "tx-node")]
#[command(about = "Camera transmitter: captures, encodes and streams H.264 over RTP/UDP", long_about = None)]
pub struct NodeConfig {
  /// Control API listen address
  #[arg(long, env = "TX_NODE_ADDR", default_value = "0.0.0.0:8888")]
  pub bind_addr: SocketAddr,

  /// Configuration document; resolved from XDG/HOME when unset
  #[arg(long, env = "CAMERA_TX_CONFIG_PATH")]
  pub config_path: Option<PathBuf>,

  #[arg(long, env = "PIPELINE_BACKEND", value_enum, default_value_t = BackendKind::default())]
  pub backend: BackendKind,

  /// Longest wait for the capture device to be released on teardown
  #[arg(long, env = "TEARDOWN_TIMEOUT_MS", default_value_t = 5000)]
  pub teardown_timeout_ms: u64,

  /// Pause between teardown and the next build
  #[arg(long, env = "QUIESCENCE_MS", default_value_t = 1000)]
  pub quiescence_ms: u64,

  /// Pipeline event poll interval
  #[arg(long, env = "EVENT_POLL_MS", default_value_t = 100)]
  pub event_poll_ms: u64,

  #[arg(long, env = "RESTART_MAX_RETRIES", default_value_t = 3)]
  pub restart_max_retries: u32,

  #[arg(long, env = "RESTART_WINDOW_SECS", default_value_t = 60)]
  pub restart_window_secs: u64,

  #[arg(long, env = "RESTART_BACKOFF_MS_START", default_value_t = 500)]
  pub restart_backoff_ms_start: u64,

  #[arg(long, env = "RESTART_BACKOFF_MS_MAX", default_value_t = 10_000)]
  pub restart_backoff_ms_max: u64,
}

impl NodeConfig {
  pub fn supervisor_settings(&self) -> SupervisorSettings {
    SupervisorSettings {
      teardown_timeout: Duration::from_millis(self.teardown_timeout_ms),
      quiescence: Duration::from_millis(self.quiescence_ms),
      restart: RestartPolicy {
        max_retries: self.restart_max_retries,
        window: Duration::from_secs(self.restart_window_secs),
        backoff_start_ms: self.restart_backoff_ms_start,
        backoff_max_ms: self.restart_backoff_ms_max.max(self.restart_backoff_ms_start),
      },
    }
  }

  pub fn event_poll(&self) -> Duration {
    Duration::from_millis(self.event_poll_ms.max(1))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_documented_values() {
    let config = NodeConfig::try_parse_from(["tx-node"]).unwrap();
    assert_eq!(config.bind_addr.port(), 8888);
    let settings = config.supervisor_settings();
    assert_eq!(settings.teardown_timeout, Duration::from_secs(5));
    assert_eq!(settings.quiescence, Duration::from_secs(1));
    assert_eq!(settings.restart.max_retries, 3);
    assert_eq!(settings.restart.window, Duration::from_secs(60));
    assert_eq!(config.event_poll(), Duration::from_millis(100));
  }

  #[test]
  fn flags_override_defaults() {
    let config = NodeConfig::try_parse_from([
      "tx-node",
      "--backend",
      "simulated",
      "--restart-backoff-ms-start",
      "2000",
      "--restart-backoff-ms-max",
      "100",
      "--config-path",
      "/tmp/tx.json",
    ])
    .unwrap();
    assert_eq!(config.backend, BackendKind::Simulated);
    assert_eq!(config.config_path, Some(PathBuf::from("/tmp/tx.json")));
    // max never drops below start
    assert_eq!(config.supervisor_settings().restart.backoff_max_ms, 2000);
  }
}

//! Media pipeline backends.
//!
//! A backend turns a configuration snapshot into a running
//! capture → encode → RTP → UDP graph. The supervisor only ever talks to the
//! [`PipelineBackend`] / [`PipelineHandle`] traits; backend calls block and are
//! run off the async executor.

#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod simulated;

use crate::config::BackendKind;
use crate::error::BackendError;
use common::config::Configuration;
use common::status::{DeviceInfo, VideoMode};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub use simulated::{SimulatedBackend, SimulatedOptions};

/// Called with the payload size of every buffer reaching the network sink.
pub type FrameProbe = Arc<dyn Fn(usize) + Send + Sync>;

/// Events emitted by one pipeline instance.
pub type EventStream = mpsc::UnboundedReceiver<PipelineEvent>;

/// Identity of one built pipeline. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl HandleId {
  pub fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    HandleId(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Display for HandleId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "pipeline-{}", self.0)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
  Error {
    source: String,
    message: String,
    debug: Option<String>,
  },
  Warning {
    source: String,
    message: String,
  },
  Info {
    source: String,
    message: String,
  },
  EndOfStream,
  StateChanged {
    source: String,
    from: String,
    to: String,
    /// Emitted by the top-level pipeline rather than one of its elements
    is_pipeline: bool,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
  pub handle: HandleId,
  pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
  /// Reached the null state within the timeout
  Graceful,
  /// Still releasing when the timeout expired
  TimedOut,
}

impl StopOutcome {
  pub fn as_str(&self) -> &'static str {
    match self {
      StopOutcome::Graceful => "graceful",
      StopOutcome::TimedOut => "timed_out",
    }
  }
}

/// A built pipeline. Dropping a handle releases it without waiting.
pub trait PipelineHandle: Send {
  fn id(&self) -> HandleId;

  /// Encoder element this pipeline was built with.
  fn encoder(&self) -> &str;

  fn start(&mut self) -> Result<(), BackendError>;

  /// Retarget the network sink without interrupting the stream.
  fn patch_sink(&mut self, host: &str, port: u16) -> Result<(), BackendError>;

  /// Bring the pipeline down, waiting at most `timeout` for the capture
  /// hardware to be released.
  fn stop(&mut self, timeout: Duration) -> Result<StopOutcome, BackendError>;

  /// The event stream can be taken once.
  fn take_events(&mut self) -> Option<EventStream>;

  fn attach_frame_probe(&mut self, probe: FrameProbe);
}

pub trait PipelineBackend: Send + Sync + 'static {
  fn name(&self) -> &'static str;

  /// Construct an un-started pipeline for `cfg` using `encoder`.
  fn build(&self, cfg: &Configuration, encoder: &str) -> Result<Box<dyn PipelineHandle>, BackendError>;

  fn encoder_available(&self, encoder: &str) -> bool;

  fn devices(&self) -> Vec<DeviceInfo>;

  /// Resolutions the device advertises. Empty when it cannot be probed.
  fn device_modes(&self, device: &str) -> Vec<VideoMode>;
}

pub fn create(kind: BackendKind) -> anyhow::Result<Arc<dyn PipelineBackend>> {
  match kind {
    BackendKind::Simulated => Ok(Arc::new(SimulatedBackend::new(SimulatedOptions::default()))),
    #[cfg(feature = "gstreamer")]
    BackendKind::Gstreamer => Ok(Arc::new(gst::GstBackend::new()?)),
    #[cfg(not(feature = "gstreamer"))]
    BackendKind::Gstreamer => {
      anyhow::bail!("tx-node was built without the `gstreamer` feature; set PIPELINE_BACKEND=simulated")
    }
  }
}

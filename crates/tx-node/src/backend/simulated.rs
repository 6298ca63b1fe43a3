//! Test-pattern backend.
//!
//! Produces synthetic encoded frames at the configured rate without touching
//! capture hardware. Used for hardware-less runs and throughout the test
//! suite, where faults, missing encoders and slow teardowns are injected.

use super::{
    EventKind, EventStream, FrameProbe, HandleId, PipelineBackend, PipelineEvent, PipelineHandle,
    StopOutcome,
};
use crate::error::BackendError;
use common::config::{CaptureSource, Configuration};
use common::status::{DeviceInfo, VideoMode};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

const DEVICE_ID: &str = "sim0";

/// Nominal encoder output, matching the 2 Mbps tuning of the real encoders.
const TARGET_BITRATE_BPS: u64 = 2_048_000;

#[derive(Debug, Clone)]
pub struct SimulatedOptions {
    /// Emit frames from a background thread at the configured framerate.
    /// When off, frames are only produced by [`SimulatedBackend::push_frame`].
    pub auto_frames: bool,
    pub unavailable_encoders: Vec<String>,
    /// How long `stop` blocks before returning.
    pub stop_delay: Duration,
}

impl Default for SimulatedOptions {
    fn default() -> Self {
        Self {
            auto_frames: true,
            unavailable_encoders: Vec::new(),
            stop_delay: Duration::ZERO,
        }
    }
}

impl SimulatedOptions {
    pub fn manual() -> Self {
        Self {
            auto_frames: false,
            ..Self::default()
        }
    }
}

/// State shared by a running simulated pipeline and the backend that built it.
struct Core {
    id: HandleId,
    events: mpsc::UnboundedSender<PipelineEvent>,
    probe: Mutex<Option<FrameProbe>>,
    sink: Mutex<(String, u16)>,
}

impl Core {
    fn emit(&self, kind: EventKind) {
        let _ = self.events.send(PipelineEvent {
            handle: self.id,
            kind,
        });
    }

    fn frame(&self, bytes: usize) {
        let probe = self.probe.lock().clone();
        if let Some(probe) = probe {
            probe(bytes);
        }
    }
}

#[derive(Default)]
struct Shared {
    auto_frames: bool,
    unavailable: Mutex<HashSet<String>>,
    stop_delay: Mutex<Duration>,
    build_delay: Mutex<Duration>,
    fail_next_builds: AtomicUsize,
    failing_devices: Mutex<HashSet<String>>,
    fail_patches: AtomicBool,
    builds: AtomicUsize,
    stops: AtomicUsize,
    patches: AtomicUsize,
    live: AtomicUsize,
    current: Mutex<Option<Arc<Core>>>,
    last_config: Mutex<Option<Configuration>>,
}

/// Cloning yields another view of the same backend.
#[derive(Clone)]
pub struct SimulatedBackend {
    shared: Arc<Shared>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(SimulatedOptions::default())
    }
}

impl SimulatedBackend {
    pub fn new(options: SimulatedOptions) -> Self {
        let shared = Shared {
            auto_frames: options.auto_frames,
            unavailable: Mutex::new(options.unavailable_encoders.into_iter().collect()),
            stop_delay: Mutex::new(options.stop_delay),
            ..Shared::default()
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn set_encoder_available(&self, encoder: &str, available: bool) {
        let mut unavailable = self.shared.unavailable.lock();
        if available {
            unavailable.remove(encoder);
        } else {
            unavailable.insert(encoder.to_string());
        }
    }

    /// The next `n` builds fail with a state-change error.
    pub fn fail_next_builds(&self, n: usize) {
        self.shared.fail_next_builds.store(n, Ordering::SeqCst);
    }

    /// Builds for this device fail until cleared.
    pub fn fail_device(&self, device: &str, failing: bool) {
        let mut devices = self.shared.failing_devices.lock();
        if failing {
            devices.insert(device.to_string());
        } else {
            devices.remove(device);
        }
    }

    pub fn fail_patches(&self, fail: bool) {
        self.shared.fail_patches.store(fail, Ordering::SeqCst);
    }

    pub fn set_stop_delay(&self, delay: Duration) {
        *self.shared.stop_delay.lock() = delay;
    }

    /// How long each `build` blocks before it succeeds or fails.
    pub fn set_build_delay(&self, delay: Duration) {
        *self.shared.build_delay.lock() = delay;
    }

    /// Feed one frame through the running pipeline's probe.
    pub fn push_frame(&self, bytes: usize) -> bool {
        match self.current() {
            Some(core) => {
                core.frame(bytes);
                true
            }
            None => false,
        }
    }

    pub fn inject_error(&self, message: &str) -> bool {
        self.emit(EventKind::Error {
            source: "encoder".to_string(),
            message: message.to_string(),
            debug: None,
        })
    }

    pub fn inject_end_of_stream(&self) -> bool {
        self.emit(EventKind::EndOfStream)
    }

    pub fn inject_warning(&self, message: &str) -> bool {
        self.emit(EventKind::Warning {
            source: "source".to_string(),
            message: message.to_string(),
        })
    }

    fn emit(&self, kind: EventKind) -> bool {
        match self.current() {
            Some(core) => {
                core.emit(kind);
                true
            }
            None => false,
        }
    }

    fn current(&self) -> Option<Arc<Core>> {
        self.shared.current.lock().clone()
    }

    pub fn current_handle(&self) -> Option<HandleId> {
        self.current().map(|core| core.id)
    }

    pub fn current_sink(&self) -> Option<(String, u16)> {
        self.current().map(|core| core.sink.lock().clone())
    }

    pub fn last_built_config(&self) -> Option<Configuration> {
        self.shared.last_config.lock().clone()
    }

    pub fn builds(&self) -> usize {
        self.shared.builds.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }

    pub fn patches(&self) -> usize {
        self.shared.patches.load(Ordering::SeqCst)
    }

    /// Handles built and not yet released.
    pub fn live_handles(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }
}

impl PipelineBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn build(&self, cfg: &Configuration, encoder: &str) -> Result<Box<dyn PipelineHandle>, BackendError> {
        self.shared.builds.fetch_add(1, Ordering::SeqCst);
        let delay = *self.shared.build_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        if !self.encoder_available(encoder) {
            return Err(BackendError::EncoderUnavailable(encoder.to_string()));
        }
        let pending_failures = self.shared.fail_next_builds.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.shared
                .fail_next_builds
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(BackendError::StateChange("simulated build failure".to_string()));
        }
        if self.shared.failing_devices.lock().contains(&cfg.device) {
            return Err(BackendError::StateChange(format!("device '{}' is busy", cfg.device)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let core = Arc::new(Core {
            id: HandleId::next(),
            events: tx,
            probe: Mutex::new(None),
            sink: Mutex::new((cfg.host.clone(), cfg.port)),
        });
        *self.shared.last_config.lock() = Some(cfg.clone());
        self.shared.live.fetch_add(1, Ordering::SeqCst);
        debug!(handle = %core.id, encoder, "simulated pipeline built");

        Ok(Box::new(SimulatedHandle {
            core,
            shared: self.shared.clone(),
            encoder: encoder.to_string(),
            framerate: cfg.framerate.max(1),
            events: Some(rx),
            running: Arc::new(AtomicBool::new(false)),
            frames: None,
            released: false,
        }))
    }

    fn encoder_available(&self, encoder: &str) -> bool {
        !self.shared.unavailable.lock().contains(encoder)
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            id: DEVICE_ID.to_string(),
            name: "Simulated test pattern".to_string(),
            source: CaptureSource::Libcamera,
            path: None,
        }]
    }

    fn device_modes(&self, device: &str) -> Vec<VideoMode> {
        if device != DEVICE_ID {
            return Vec::new();
        }
        [(1280, 720, 60), (1920, 1080, 30), (4608, 2592, 14)]
            .into_iter()
            .map(|(width, height, max_framerate)| VideoMode {
                width,
                height,
                max_framerate,
                description: None,
            })
            .collect()
    }
}

struct SimulatedHandle {
    core: Arc<Core>,
    shared: Arc<Shared>,
    encoder: String,
    framerate: u32,
    events: Option<EventStream>,
    running: Arc<AtomicBool>,
    frames: Option<JoinHandle<()>>,
    released: bool,
}

impl SimulatedHandle {
    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(frames) = self.frames.take() {
            let _ = frames.join();
        }
        if self.released {
            return;
        }
        self.released = true;
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
        let mut current = self.shared.current.lock();
        if current.as_ref().map(|c| c.id) == Some(self.core.id) {
            *current = None;
        }
    }
}

impl PipelineHandle for SimulatedHandle {
    fn id(&self) -> HandleId {
        self.core.id
    }

    fn encoder(&self) -> &str {
        &self.encoder
    }

    fn start(&mut self) -> Result<(), BackendError> {
        self.running.store(true, Ordering::SeqCst);
        *self.shared.current.lock() = Some(self.core.clone());
        self.core.emit(EventKind::StateChanged {
            source: "camera-tx".to_string(),
            from: "paused".to_string(),
            to: "playing".to_string(),
            is_pipeline: true,
        });

        if self.shared.auto_frames {
            let core = self.core.clone();
            let running = self.running.clone();
            let interval = Duration::from_secs_f64(1.0 / f64::from(self.framerate));
            let frame_bytes = (TARGET_BITRATE_BPS / 8 / u64::from(self.framerate)) as usize;
            let frames = thread::Builder::new()
                .name(format!("sim-frames-{}", self.core.id.0))
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        thread::sleep(interval);
                        core.frame(frame_bytes);
                    }
                })
                .map_err(|e| BackendError::Other(format!("failed to spawn frame thread: {e}")))?;
            self.frames = Some(frames);
        }
        Ok(())
    }

    fn patch_sink(&mut self, host: &str, port: u16) -> Result<(), BackendError> {
        if self.shared.fail_patches.load(Ordering::SeqCst) {
            return Err(BackendError::Other("sink rejected the new address".to_string()));
        }
        *self.core.sink.lock() = (host.to_string(), port);
        self.shared.patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self, _timeout: Duration) -> Result<StopOutcome, BackendError> {
        let delay = *self.shared.stop_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.release();
        self.shared.stops.fetch_add(1, Ordering::SeqCst);
        Ok(StopOutcome::Graceful)
    }

    fn take_events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    fn attach_frame_probe(&mut self, probe: FrameProbe) {
        *self.core.probe.lock() = Some(probe);
    }
}

impl Drop for SimulatedHandle {
    fn drop(&mut self) {
        self.release();
    }
}

//! Pipeline supervisor.
//!
//! Owns the one live pipeline and the desired configuration, and drives both
//! through the controller state machine. A single async mutex guards the
//! configuration store, controller state, pipeline slot, pending-restart flag
//! and fault history. Backend calls (build, start, stop) run on blocking
//! workers with the lock released; every result is re-validated against the
//! state found after re-acquiring it.

use crate::backend::{EventStream, FrameProbe, HandleId, PipelineBackend, PipelineHandle, StopOutcome};
use crate::delta::ConfigDelta;
use crate::encoders;
use crate::error::{BackendError, SupervisorError};
use crate::persist::ConfigFile;
use crate::state;
use crate::stats::StatsRegister;
use crate::store::{ApplyOutcome, ConfigStore};
use common::config::{ConfigUpdate, Configuration};
use common::status::{ControllerState, StatusResponse, StreamStatsView};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics::{
  TX_BUILD_DURATION, TX_ENCODER_FALLBACKS, TX_HOT_PATCHES, TX_PIPELINE_BUILDS, TX_RUNTIME_FAULTS,
  TX_TEARDOWNS,
};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Margin on top of the teardown timeout before a blocked stop is abandoned.
const STOP_GRACE: Duration = Duration::from_millis(250);

/// Log a transmission summary every this many frames.
const FRAME_LOG_INTERVAL: u64 = 60;

#[derive(Clone, Debug)]
pub struct RestartPolicy {
  /// Runtime faults tolerated within `window`; one more terminates.
  pub max_retries: u32,
  pub window: Duration,
  pub backoff_start_ms: u64,
  pub backoff_max_ms: u64,
}

impl Default for RestartPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      window: Duration::from_secs(60),
      backoff_start_ms: 500,
      backoff_max_ms: 10_000,
    }
  }
}

impl RestartPolicy {
  /// Delay before recovery attempt `attempt` (1-based).
  pub fn backoff(&self, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let ms = self
      .backoff_start_ms
      .saturating_mul(1u64 << shift)
      .min(self.backoff_max_ms);
    Duration::from_millis(ms)
  }
}

#[derive(Clone, Debug)]
pub struct SupervisorSettings {
  pub teardown_timeout: Duration,
  /// Pause after releasing the capture device before it is opened again.
  pub quiescence: Duration,
  pub restart: RestartPolicy,
}

impl Default for SupervisorSettings {
  fn default() -> Self {
    Self {
      teardown_timeout: Duration::from_millis(5000),
      quiescence: Duration::from_millis(1000),
      restart: RestartPolicy::default(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
  /// Nothing changed
  Unchanged,
  /// Controller is terminating
  Ignored,
  /// A rebuild is in flight and will pick up the change
  Deferred,
  /// Sink retargeted in place
  Patched,
  /// Sink patch failed; values stay stored and the controller is `Degraded`
  PatchFailed,
  /// Rebuild handed to a background task
  Scheduled,
  /// Rebuilt with the desired configuration
  Rebuilt,
  /// Desired configuration failed; running on the last good one
  FellBack,
}

/// Runtime failure reported by the event monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeFault {
  Error(String),
  EndOfStream,
}

impl RuntimeFault {
  pub fn kind(&self) -> &'static str {
    match self {
      RuntimeFault::Error(_) => "error",
      RuntimeFault::EndOfStream => "end_of_stream",
    }
  }
}

impl fmt::Display for RuntimeFault {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RuntimeFault::Error(message) => write!(f, "pipeline error: {message}"),
      RuntimeFault::EndOfStream => f.write_str("unexpected end of stream"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDecision {
  /// Event belongs to a pipeline that is no longer live
  Stale,
  /// Recovery scheduled after the given backoff
  Restart { attempt: u32, backoff: Duration },
  /// Fault budget exhausted
  Terminate,
}

/// Event stream of a freshly started pipeline, handed to the monitor.
pub type Attachment = (HandleId, EventStream);

struct LivePipeline {
  handle: Box<dyn PipelineHandle>,
  built_from: Configuration,
}

struct Inner {
  store: ConfigStore,
  state: ControllerState,
  live: Option<LivePipeline>,
  pending_restart: bool,
  last_good: Option<Configuration>,
  faults: VecDeque<Instant>,
  last_error: Option<String>,
  fault_budget_exhausted: bool,
  /// Bumped on every accepted change; orders writes of the config file.
  revision: u64,
}

impl Inner {
  /// Snapshot of the desired configuration to write out, if `delta` changed it.
  fn record_change(&mut self, delta: &ConfigDelta) -> Option<(u64, Configuration)> {
    if delta.is_empty() {
      return None;
    }
    self.revision += 1;
    Some((self.revision, self.store.read()))
  }

  fn prune_faults(&mut self, window: Duration) {
    let now = Instant::now();
    while let Some(oldest) = self.faults.front() {
      if now.saturating_duration_since(*oldest) > window {
        self.faults.pop_front();
      } else {
        break;
      }
    }
  }
}

enum Plan {
  Done(ReconcileOutcome),
  Rebuild,
}

pub struct Supervisor {
  backend: Arc<dyn PipelineBackend>,
  settings: SupervisorSettings,
  inner: Mutex<Inner>,
  stats: Arc<StatsRegister>,
  config_file: Option<ConfigFile>,
  /// Revision of the last configuration written to `config_file`.
  persisted: Mutex<u64>,
  attach_tx: mpsc::UnboundedSender<Attachment>,
  attach_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Attachment>>>,
  shutdown: CancellationToken,
}

impl Supervisor {
  pub fn new(
    backend: Arc<dyn PipelineBackend>,
    initial: Configuration,
    settings: SupervisorSettings,
    config_file: Option<ConfigFile>,
  ) -> Arc<Self> {
    let (attach_tx, attach_rx) = mpsc::unbounded_channel();
    Arc::new(Self {
      backend,
      settings,
      inner: Mutex::new(Inner {
        store: ConfigStore::new(initial),
        state: ControllerState::Stopped,
        live: None,
        pending_restart: false,
        last_good: None,
        faults: VecDeque::new(),
        last_error: None,
        fault_budget_exhausted: false,
        revision: 0,
      }),
      stats: Arc::new(StatsRegister::new()),
      config_file,
      persisted: Mutex::new(0),
      attach_tx,
      attach_rx: parking_lot::Mutex::new(Some(attach_rx)),
      shutdown: CancellationToken::new(),
    })
  }

  pub fn backend(&self) -> &Arc<dyn PipelineBackend> {
    &self.backend
  }

  pub fn settings(&self) -> &SupervisorSettings {
    &self.settings
  }

  /// Cancelled once the controller starts terminating.
  pub fn shutdown_token(&self) -> CancellationToken {
    self.shutdown.clone()
  }

  /// Receiver of pipeline event streams. Can be taken once.
  pub fn take_attachments(&self) -> Option<mpsc::UnboundedReceiver<Attachment>> {
    self.attach_rx.lock().take()
  }

  pub async fn state(&self) -> ControllerState {
    self.inner.lock().await.state
  }

  pub async fn config(&self) -> Configuration {
    self.inner.lock().await.store.read()
  }

  pub async fn current_handle(&self) -> Option<HandleId> {
    self.inner.lock().await.live.as_ref().map(|l| l.handle.id())
  }

  pub async fn fault_budget_exhausted(&self) -> bool {
    self.inner.lock().await.fault_budget_exhausted
  }

  pub async fn stats(&self) -> StreamStatsView {
    let target = self.inner.lock().await.store.read().framerate;
    self.stats.snapshot(target)
  }

  pub fn stats_register(&self) -> &Arc<StatsRegister> {
    &self.stats
  }

  pub async fn status(&self) -> StatusResponse {
    let mut inner = self.inner.lock().await;
    inner.prune_faults(self.settings.restart.window);
    StatusResponse {
      state: inner.state,
      encoder: inner.live.as_ref().map(|l| l.handle.encoder().to_string()),
      pending_restart: inner.pending_restart,
      restarts_in_window: inner.faults.len(),
      last_error: inner.last_error.clone(),
      config_path: self
        .config_file
        .as_ref()
        .map(|f| f.path().display().to_string()),
    }
  }

  /// Build and start the pipeline from the current configuration.
  pub async fn start(self: &Arc<Self>) -> Result<(), SupervisorError> {
    {
      let mut inner = self.inner.lock().await;
      if inner.state.is_terminal() {
        return Ok(());
      }
      state::transition(&mut inner.state, ControllerState::Building)?;
    }
    self.rebuild().await.map(|_| ())
  }

  /// Merge an update into the desired configuration and persist it.
  ///
  /// Does not touch the pipeline; pass the returned delta to [`Self::reconcile`].
  pub async fn apply(&self, update: &ConfigUpdate) -> ApplyOutcome {
    let (outcome, snapshot) = {
      let mut inner = self.inner.lock().await;
      let outcome = inner.store.apply(update);
      let snapshot = inner.record_change(&outcome.delta);
      (outcome, snapshot)
    };
    self.persist(snapshot).await;
    outcome
  }

  /// Drive the pipeline towards the desired configuration and wait for it.
  pub async fn reconcile(self: &Arc<Self>, delta: &ConfigDelta) -> Result<ReconcileOutcome, SupervisorError> {
    let plan = {
      let mut inner = self.inner.lock().await;
      self.plan(&mut inner, delta)?
    };
    match plan {
      Plan::Done(outcome) => Ok(outcome),
      Plan::Rebuild => self.rebuild().await,
    }
  }

  /// Apply an update and reconcile it under one lock acquisition. Hot patches
  /// complete before this returns; rebuilds continue on a background task.
  pub async fn submit(
    self: &Arc<Self>,
    update: &ConfigUpdate,
  ) -> (ApplyOutcome, Result<ReconcileOutcome, SupervisorError>) {
    let (applied, snapshot, plan) = {
      let mut inner = self.inner.lock().await;
      let applied = inner.store.apply(update);
      let snapshot = inner.record_change(&applied.delta);
      let plan = self.plan(&mut inner, &applied.delta);
      (applied, snapshot, plan)
    };
    self.persist(snapshot).await;

    let outcome = match plan {
      Ok(Plan::Done(outcome)) => Ok(outcome),
      Ok(Plan::Rebuild) => {
        let this = self.clone();
        tokio::spawn(async move {
          if let Err(e) = this.rebuild().await {
            error!(error = %e, "rebuild failed");
          }
        });
        Ok(ReconcileOutcome::Scheduled)
      }
      Err(e) => Err(e),
    };
    (applied, outcome)
  }

  fn plan(&self, inner: &mut Inner, delta: &ConfigDelta) -> Result<Plan, SupervisorError> {
    if delta.is_empty() {
      return Ok(Plan::Done(ReconcileOutcome::Unchanged));
    }
    if inner.state.is_terminal() {
      return Ok(Plan::Done(ReconcileOutcome::Ignored));
    }
    if inner.state.is_transitioning() {
      inner.pending_restart = true;
      debug!(state = %inner.state, "rebuild in flight, change deferred");
      return Ok(Plan::Done(ReconcileOutcome::Deferred));
    }
    if delta.is_sink_only() && inner.live.is_some() {
      let cfg = inner.store.read();
      return match self.patch_live(inner, &cfg) {
        Ok(()) => Ok(Plan::Done(ReconcileOutcome::Patched)),
        Err(SupervisorError::Patch(_)) => Ok(Plan::Done(ReconcileOutcome::PatchFailed)),
        Err(e) => Err(e),
      };
    }
    let next = if inner.state == ControllerState::Stopped {
      ControllerState::Building
    } else {
      ControllerState::Restarting
    };
    state::transition(&mut inner.state, next)?;
    Ok(Plan::Rebuild)
  }

  fn patch_live(&self, inner: &mut Inner, cfg: &Configuration) -> Result<(), SupervisorError> {
    let Some(live) = inner.live.as_mut() else {
      return Ok(());
    };
    match live.handle.patch_sink(&cfg.host, cfg.port) {
      Ok(()) => {
        live.built_from.host = cfg.host.clone();
        live.built_from.port = cfg.port;
        let in_sync = live.built_from == inner.store.read();
        TX_HOT_PATCHES.with_label_values(&["success"]).inc();
        info!(host = %cfg.host, port = cfg.port, "sink retargeted");
        // Recovered once the live pipeline matches the desired configuration
        if inner.state == ControllerState::Degraded && in_sync {
          state::transition(&mut inner.state, ControllerState::Running)?;
        }
        Ok(())
      }
      Err(e) => {
        TX_HOT_PATCHES.with_label_values(&["failure"]).inc();
        warn!(error = %e, host = %cfg.host, port = cfg.port, "sink patch failed");
        inner.last_error = Some(e.to_string());
        if inner.state == ControllerState::Running {
          state::transition(&mut inner.state, ControllerState::Degraded)?;
        }
        Err(SupervisorError::Patch(e))
      }
    }
  }

  /// Tear down, pause, build. The caller has already moved the state to
  /// `Building` or `Restarting`.
  async fn rebuild(self: &Arc<Self>) -> Result<ReconcileOutcome, SupervisorError> {
    let started = Instant::now();
    loop {
      let (old, cfg) = {
        let mut inner = self.inner.lock().await;
        if inner.state.is_terminal() {
          return Ok(ReconcileOutcome::Ignored);
        }
        inner.pending_restart = false;
        (inner.live.take(), inner.store.read())
      };

      if let Some(old) = old {
        self.teardown(old).await;
        tokio::time::sleep(self.settings.quiescence).await;
      }

      info!(
        encoder = %cfg.encoder,
        width = cfg.width,
        height = cfg.height,
        framerate = cfg.framerate,
        "building pipeline"
      );
      let built = self.build_with_fallback(&cfg).await;

      let mut inner = self.inner.lock().await;
      match built {
        Ok(handle) => {
          if inner.state.is_terminal() {
            drop(inner);
            info!("controller terminating, discarding new pipeline");
            self
              .teardown(LivePipeline {
                handle,
                built_from: cfg,
              })
              .await;
            return Ok(ReconcileOutcome::Ignored);
          }

          TX_PIPELINE_BUILDS.with_label_values(&["success"]).inc();
          TX_BUILD_DURATION.observe(started.elapsed().as_secs_f64());
          self.install(&mut inner, handle, cfg.clone());
          inner.last_good = Some(cfg.clone());
          state::transition(&mut inner.state, ControllerState::Running)?;

          // Anything that changed while the lock was released
          let latest = inner.store.read();
          let drift = ConfigDelta::between(&cfg, &latest);
          inner.pending_restart = false;
          if drift.requires_rebuild() {
            info!(changed = ?drift.fields().collect::<Vec<_>>(), "configuration changed during build, rebuilding");
            state::transition(&mut inner.state, ControllerState::Restarting)?;
            continue;
          }
          if drift.is_sink_only() {
            if let Err(e) = self.patch_live(&mut inner, &latest) {
              warn!(error = %e, "deferred sink patch failed");
            }
          }
          return Ok(ReconcileOutcome::Rebuilt);
        }
        Err(err) => {
          TX_PIPELINE_BUILDS.with_label_values(&["failure"]).inc();
          error!(error = %err, "pipeline build failed");
          inner.last_error = Some(err.to_string());
          if inner.state.is_terminal() {
            return Ok(ReconcileOutcome::Ignored);
          }

          if inner.pending_restart && inner.store.read() != cfg {
            info!("newer configuration arrived during failed build, retrying");
            continue;
          }

          let fallback = match (&inner.last_good, inner.state) {
            (Some(good), ControllerState::Restarting) if *good != cfg => Some(good.clone()),
            _ => None,
          };
          let Some(good) = fallback else {
            inner.pending_restart = false;
            state::transition(&mut inner.state, ControllerState::Stopped)?;
            return Err(err);
          };
          drop(inner);

          warn!("retrying with last known good configuration");
          let recovered = self.build_with_fallback(&good).await;
          let mut inner = self.inner.lock().await;
          return match recovered {
            Ok(handle) => {
              if inner.state.is_terminal() {
                drop(inner);
                self
                  .teardown(LivePipeline {
                    handle,
                    built_from: good,
                  })
                  .await;
                return Ok(ReconcileOutcome::Ignored);
              }
              TX_PIPELINE_BUILDS.with_label_values(&["fallback"]).inc();
              self.install(&mut inner, handle, good);
              state::transition(&mut inner.state, ControllerState::Degraded)?;
              if inner.pending_restart && inner.store.read() != cfg {
                info!("configuration changed during fallback build, rebuilding");
                state::transition(&mut inner.state, ControllerState::Restarting)?;
                continue;
              }
              inner.pending_restart = false;
              Ok(ReconcileOutcome::FellBack)
            }
            Err(fallback_err) => {
              error!(error = %fallback_err, "last known good configuration also failed");
              if inner.state.is_terminal() {
                return Err(err);
              }
              if inner.pending_restart && inner.store.read() != cfg {
                info!("configuration changed during fallback build, retrying");
                continue;
              }
              inner.pending_restart = false;
              state::transition(&mut inner.state, ControllerState::Stopped)?;
              Err(err)
            }
          };
        }
      }
    }
  }

  fn install(&self, inner: &mut Inner, mut handle: Box<dyn PipelineHandle>, built_from: Configuration) {
    let id = handle.id();
    if let Some(events) = handle.take_events() {
      if self.attach_tx.send((id, events)).is_err() {
        warn!(handle = %id, "event monitor is gone, pipeline events will be dropped");
      }
    }
    info!(handle = %id, encoder = %handle.encoder(), "pipeline running");
    inner.live = Some(LivePipeline { handle, built_from });
  }

  /// Walk the encoder candidates until one builds and starts.
  async fn build_with_fallback(&self, cfg: &Configuration) -> Result<Box<dyn PipelineHandle>, SupervisorError> {
    let backend = self.backend.clone();
    let stats = self.stats.clone();
    let cfg = cfg.clone();
    let teardown_timeout = self.settings.teardown_timeout;

    tokio::task::spawn_blocking(move || {
      let mut tried = Vec::new();
      let mut last = None;
      for encoder in encoders::candidates(&cfg.encoder) {
        tried.push(encoder.clone());
        if !backend.encoder_available(&encoder) {
          debug!(encoder = %encoder, "encoder not installed, skipping");
          TX_ENCODER_FALLBACKS.with_label_values(&[&encoder]).inc();
          last = Some(BackendError::EncoderUnavailable(encoder));
          continue;
        }

        let mut handle = match backend.build(&cfg, &encoder) {
          Ok(handle) => handle,
          Err(e) if e.allows_fallback() => {
            warn!(encoder = %encoder, error = %e, "encoder failed, trying next");
            TX_ENCODER_FALLBACKS.with_label_values(&[&encoder]).inc();
            last = Some(e);
            continue;
          }
          Err(e) => return Err(SupervisorError::Build(e)),
        };

        handle.attach_frame_probe(frame_probe(stats.clone()));
        match handle.start() {
          Ok(()) => {
            stats.reset();
            if encoder != cfg.encoder {
              warn!(requested = %cfg.encoder, selected = %encoder, "using fallback encoder");
            }
            return Ok(handle);
          }
          Err(e) => {
            let _ = handle.stop(teardown_timeout);
            if e.allows_fallback() {
              warn!(encoder = %encoder, error = %e, "encoder failed to start, trying next");
              last = Some(e);
              continue;
            }
            return Err(SupervisorError::Build(e));
          }
        }
      }
      Err(SupervisorError::EncodersExhausted {
        tried,
        last: last.unwrap_or_else(|| BackendError::Other("no encoder candidates".to_string())),
      })
    })
    .await
    .map_err(|e| SupervisorError::Worker(e.to_string()))?
  }

  /// Stop a pipeline on a blocking worker. Past the timeout the worker is
  /// abandoned and the handle released whenever it returns.
  async fn teardown(&self, live: LivePipeline) {
    let LivePipeline { mut handle, .. } = live;
    let id = handle.id();
    let timeout = self.settings.teardown_timeout;
    let worker = tokio::task::spawn_blocking(move || handle.stop(timeout));

    match tokio::time::timeout(timeout + STOP_GRACE, worker).await {
      Ok(Ok(Ok(outcome))) => {
        TX_TEARDOWNS.with_label_values(&[outcome.as_str()]).inc();
        if outcome == StopOutcome::TimedOut {
          warn!(handle = %id, timeout_ms = timeout.as_millis() as u64, "pipeline did not reach null state in time");
        } else {
          debug!(handle = %id, "pipeline stopped");
        }
      }
      Ok(Ok(Err(e))) => {
        TX_TEARDOWNS.with_label_values(&["error"]).inc();
        warn!(handle = %id, error = %e, "pipeline stop failed, releasing anyway");
      }
      Ok(Err(e)) => {
        TX_TEARDOWNS.with_label_values(&["error"]).inc();
        warn!(handle = %id, error = %e, "teardown worker panicked");
      }
      Err(_) => {
        TX_TEARDOWNS.with_label_values(&["forced"]).inc();
        warn!(handle = %id, timeout_ms = timeout.as_millis() as u64, "teardown timed out, forcing release");
      }
    }
  }

  /// Runtime fault from the event monitor.
  pub async fn handle_fault(self: &Arc<Self>, handle: HandleId, fault: RuntimeFault) -> FaultDecision {
    let mut inner = self.inner.lock().await;
    if inner.state.is_terminal() || inner.live.as_ref().map(|l| l.handle.id()) != Some(handle) {
      debug!(handle = %handle, "fault from stale pipeline ignored");
      return FaultDecision::Stale;
    }

    TX_RUNTIME_FAULTS.with_label_values(&[fault.kind()]).inc();
    inner.last_error = Some(fault.to_string());
    let policy = self.settings.restart.clone();
    inner.prune_faults(policy.window);
    inner.faults.push_back(Instant::now());
    let attempt = inner.faults.len() as u32;

    if attempt > policy.max_retries {
      error!(
        handle = %handle,
        faults = attempt,
        window_secs = policy.window.as_secs(),
        "fault budget exhausted, terminating"
      );
      inner.fault_budget_exhausted = true;
      let _ = state::transition(&mut inner.state, ControllerState::Terminating);
      let live = inner.live.take();
      drop(inner);
      self.shutdown.cancel();
      if let Some(live) = live {
        self.teardown(live).await;
      }
      return FaultDecision::Terminate;
    }

    if let Err(e) = state::transition(&mut inner.state, ControllerState::Restarting) {
      warn!(error = %e, "cannot restart from current state");
      return FaultDecision::Stale;
    }
    let backoff = policy.backoff(attempt);
    warn!(handle = %handle, attempt, backoff_ms = backoff.as_millis() as u64, %fault, "restarting pipeline");
    drop(inner);

    let this = self.clone();
    tokio::spawn(async move {
      tokio::select! {
        _ = this.shutdown.cancelled() => return,
        _ = tokio::time::sleep(backoff) => {}
      }
      if let Err(e) = this.rebuild().await {
        error!(error = %e, "recovery rebuild failed");
      }
    });
    FaultDecision::Restart { attempt, backoff }
  }

  /// Tear the pipeline down and enter `Terminating`. Safe to call repeatedly.
  pub async fn stop(&self) {
    let live = {
      let mut inner = self.inner.lock().await;
      if let Err(e) = state::transition(&mut inner.state, ControllerState::Terminating) {
        warn!(error = %e, "unexpected state during shutdown");
      }
      inner.live.take()
    };
    self.shutdown.cancel();
    if let Some(live) = live {
      info!("stopping pipeline");
      self.teardown(live).await;
    }
  }

  /// Write a configuration snapshot on a blocking worker, outside the
  /// controller lock. Snapshots older than the last written one are dropped.
  async fn persist(&self, snapshot: Option<(u64, Configuration)>) {
    let (Some(file), Some((revision, cfg))) = (&self.config_file, snapshot) else {
      return;
    };
    let mut written = self.persisted.lock().await;
    if revision <= *written {
      debug!(revision, written = *written, "newer configuration already persisted");
      return;
    }
    let file = file.clone();
    match tokio::task::spawn_blocking(move || file.save(&cfg)).await {
      Ok(Ok(())) => *written = revision,
      Ok(Err(e)) => warn!(error = %e, "failed to persist configuration"),
      Err(e) => warn!(error = %e, "persistence worker panicked"),
    }
  }
}

fn frame_probe(stats: Arc<StatsRegister>) -> FrameProbe {
  Arc::new(move |bytes| {
    let frames = stats.record_frame(bytes);
    if frames % FRAME_LOG_INTERVAL == 0 {
      debug!(frames, bytes, "frames transmitted");
    }
  })
}

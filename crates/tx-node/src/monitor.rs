//! Pipeline event monitor.
//!
//! Follows the event stream of whichever pipeline is currently live and turns
//! errors and end-of-stream into runtime faults for the supervisor. A new
//! stream is attached after every successful build; events still queued from
//! a replaced pipeline are discarded.

use crate::backend::{EventKind, EventStream, HandleId, PipelineEvent};
use crate::encoders;
use crate::supervisor::{Attachment, FaultDecision, RuntimeFault, Supervisor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct EventMonitor {
  supervisor: Arc<Supervisor>,
  attachments: mpsc::UnboundedReceiver<Attachment>,
  poll: Duration,
}

impl EventMonitor {
  /// `None` when the supervisor's attachment channel was already taken.
  pub fn new(supervisor: &Arc<Supervisor>, poll: Duration) -> Option<Self> {
    let attachments = supervisor.take_attachments()?;
    Some(Self {
      supervisor: supervisor.clone(),
      attachments,
      poll,
    })
  }

  pub fn spawn(self) -> JoinHandle<()> {
    tokio::spawn(self.run())
  }

  pub async fn run(mut self) {
    let shutdown = self.supervisor.shutdown_token();
    let mut current: Option<(HandleId, EventStream)> = None;
    info!(poll_ms = self.poll.as_millis() as u64, "event monitor started");

    loop {
      while let Ok(attachment) = self.attachments.try_recv() {
        current = Some(attachment);
      }

      match current.as_mut() {
        Some((live, events)) => {
          let live = *live;
          tokio::select! {
            _ = shutdown.cancelled() => break,
            attachment = self.attachments.recv() => match attachment {
              Some(attachment) => current = Some(attachment),
              None => break,
            },
            polled = tokio::time::timeout(self.poll, events.recv()) => match polled {
              Err(_) => {}
              Ok(Some(event)) => {
                if self.dispatch(live, event).await {
                  current = None;
                }
              }
              Ok(None) => {
                debug!(handle = %live, "event stream closed");
                current = None;
              }
            },
          }
        }
        None => {
          tokio::select! {
            _ = shutdown.cancelled() => break,
            attachment = self.attachments.recv() => match attachment {
              Some(attachment) => current = Some(attachment),
              None => break,
            },
          }
        }
      }
    }

    info!("event monitor stopped");
  }

  /// Returns true when the stream should be detached.
  async fn dispatch(&self, live: HandleId, event: PipelineEvent) -> bool {
    if event.handle != live {
      debug!(handle = %event.handle, live = %live, "discarding event from replaced pipeline");
      return false;
    }

    let fault = match event.kind {
      EventKind::Error {
        source,
        message,
        debug: details,
      } => {
        error!(handle = %live, %source, %message, details = ?details, "pipeline error");
        if encoders::is_encoder_element(&source) {
          warn!(%source, "encoder failed at runtime; check that the hardware encoder is present or select another encoder");
        }
        RuntimeFault::Error(message)
      }
      EventKind::EndOfStream => {
        warn!(handle = %live, "pipeline reached end of stream");
        RuntimeFault::EndOfStream
      }
      EventKind::Warning { source, message } => {
        warn!(handle = %live, %source, %message, "pipeline warning");
        return false;
      }
      EventKind::Info { source, message } => {
        info!(handle = %live, %source, %message, "pipeline info");
        return false;
      }
      EventKind::StateChanged {
        source,
        from,
        to,
        is_pipeline,
      } => {
        if is_pipeline {
          info!(handle = %live, %source, %from, %to, "pipeline state changed");
        }
        return false;
      }
    };

    match self.supervisor.handle_fault(live, fault).await {
      FaultDecision::Stale => false,
      FaultDecision::Restart { .. } | FaultDecision::Terminate => true,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::{SimulatedBackend, SimulatedOptions};
  use crate::supervisor::{RestartPolicy, SupervisorSettings};
  use common::config::Configuration;
  use common::status::ControllerState;

  fn settings(max_retries: u32) -> SupervisorSettings {
    SupervisorSettings {
      teardown_timeout: Duration::from_millis(200),
      quiescence: Duration::from_millis(5),
      restart: RestartPolicy {
        max_retries,
        window: Duration::from_secs(60),
        backoff_start_ms: 1,
        backoff_max_ms: 5,
      },
    }
  }

  async fn running(max_retries: u32) -> (SimulatedBackend, Arc<Supervisor>, JoinHandle<()>) {
    let backend = SimulatedBackend::new(SimulatedOptions::manual());
    let sup = Supervisor::new(
      Arc::new(backend.clone()),
      Configuration::default(),
      settings(max_retries),
      None,
    );
    let monitor = EventMonitor::new(&sup, Duration::from_millis(10)).unwrap();
    sup.start().await.unwrap();
    let task = monitor.spawn();
    (backend, sup, task)
  }

  async fn settle<F, Fut>(mut check: F)
  where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
  {
    for _ in 0..300 {
      if check().await {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held");
  }

  #[tokio::test]
  async fn attachments_can_be_taken_once() {
    let backend = SimulatedBackend::new(SimulatedOptions::manual());
    let sup = Supervisor::new(Arc::new(backend), Configuration::default(), settings(3), None);
    assert!(EventMonitor::new(&sup, Duration::from_millis(10)).is_some());
    assert!(EventMonitor::new(&sup, Duration::from_millis(10)).is_none());
  }

  #[tokio::test]
  async fn runtime_error_triggers_rebuild() {
    let (backend, sup, _task) = running(3).await;
    let first = sup.current_handle().await.unwrap();

    assert!(backend.inject_error("encoder stalled"));
    settle(|| {
      let sup = sup.clone();
      async move {
        sup.state().await == ControllerState::Running && sup.current_handle().await != Some(first)
      }
    })
    .await;
    assert_eq!(sup.status().await.restarts_in_window, 1);
    assert_eq!(backend.live_handles(), 1);
  }

  #[tokio::test]
  async fn warnings_do_not_restart() {
    let (backend, sup, _task) = running(3).await;
    let first = sup.current_handle().await;
    assert!(backend.inject_warning("dropped a frame"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sup.current_handle().await, first);
    assert_eq!(sup.state().await, ControllerState::Running);
    assert_eq!(backend.builds(), 1);
  }

  #[tokio::test]
  async fn exhausted_budget_stops_monitor() {
    let (backend, sup, task) = running(0).await;
    assert!(backend.inject_end_of_stream());
    tokio::time::timeout(Duration::from_secs(3), task).await.unwrap().unwrap();
    assert_eq!(sup.state().await, ControllerState::Terminating);
    assert!(sup.fault_budget_exhausted().await);
    assert_eq!(backend.live_handles(), 0);
  }
}

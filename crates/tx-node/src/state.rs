use crate::error::SupervisorError;
use common::status::ControllerState;
use telemetry::metrics::TX_CONTROLLER_STATE;
use tracing::info;

use ControllerState::*;

pub fn can_transition(from: ControllerState, to: ControllerState) -> bool {
  match (from, to) {
    (_, Terminating) => true,
    (Stopped, Building) => true,
    (Building, Running | Stopped) => true,
    (Running, Restarting | Degraded) => true,
    (Degraded, Restarting | Running) => true,
    (Restarting, Running | Degraded | Stopped) => true,
    _ => false,
  }
}

/// Move `current` to `to`. Every state change in the controller goes through here.
///
/// Returns `Ok(false)` for the `Terminating -> Terminating` no-op.
pub fn transition(current: &mut ControllerState, to: ControllerState) -> Result<bool, SupervisorError> {
  let from = *current;
  if from == Terminating {
    if to == Terminating {
      return Ok(false);
    }
    return Err(SupervisorError::IllegalTransition { from, to });
  }
  if !can_transition(from, to) {
    return Err(SupervisorError::IllegalTransition { from, to });
  }
  *current = to;
  TX_CONTROLLER_STATE.set(to.code());
  info!(from = %from, to = %to, "controller state changed");
  Ok(true)
}

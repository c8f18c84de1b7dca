// Single-owner steering worker
//
// The controller lives on its own thread and serves requests strictly in
// arrival order; a ramp in progress always runs to completion before the
// next request starts. Handles are cheap to clone and usable from async code.

use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use super::controller::{Delay, Result, SteeringController, SteeringError};
use super::pattern::{MovementState, PatternTable, WHEEL_COUNT, WheelAngles};
use crate::actuator::{self, Actuator};
use crate::config::{ControllerConfig, PulseWidthRange};
use crate::messages::SteeringTelemetry;

/// Requests that can wait behind an in-flight ramp
pub const QUEUE_DEPTH: usize = 8;

type Reply = oneshot::Sender<Result<usize>>;

enum Request {
    SetState { state: MovementState, reply: Option<Reply> },
    SetAngles { targets: Vec<i32>, smooth: bool, reply: Reply },
}

/// Passes frames through while publishing them as telemetry
struct FrameTap<A> {
    inner: A,
    telemetry: watch::Sender<SteeringTelemetry>,
}

impl<A: Actuator> Actuator for FrameTap<A> {
    fn initialize(
        &mut self,
        channels: &[u8; WHEEL_COUNT],
        pulse_range: PulseWidthRange,
    ) -> actuator::Result<()> {
        self.inner.initialize(channels, pulse_range)
    }

    fn apply_frame(
        &mut self,
        angles: &WheelAngles,
        channels: &[u8; WHEEL_COUNT],
    ) -> actuator::Result<()> {
        self.inner.apply_frame(angles, channels)?;
        self.telemetry.send_modify(|t| t.angles = *angles);
        Ok(())
    }
}

/// Client side of the steering worker
#[derive(Clone)]
pub struct SteeringHandle {
    requests: mpsc::Sender<Request>,
    telemetry: watch::Receiver<SteeringTelemetry>,
}

impl SteeringHandle {
    /// Ramp to `state`, waiting until the ramp completes
    pub async fn set_state(&self, state: MovementState) -> Result<usize> {
        let (reply, done) = oneshot::channel();
        self.send(Request::SetState {
            state,
            reply: Some(reply),
        })
        .await?;
        done.await.map_err(|_| SteeringError::WorkerStopped)?
    }

    /// Set raw wheel angles, waiting until they are applied
    pub async fn set_angles(&self, targets: Vec<i32>, smooth: bool) -> Result<usize> {
        let (reply, done) = oneshot::channel();
        self.send(Request::SetAngles {
            targets,
            smooth,
            reply,
        })
        .await?;
        done.await.map_err(|_| SteeringError::WorkerStopped)?
    }

    /// Queue a state change without waiting for it
    pub fn submit_state(&self, state: MovementState) -> Result<()> {
        self.requests
            .try_send(Request::SetState { state, reply: None })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SteeringError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SteeringError::WorkerStopped,
            })
    }

    /// Latest applied frame and the state being steered toward
    pub fn telemetry(&self) -> SteeringTelemetry {
        self.telemetry.borrow().clone()
    }

    /// Wait until a new frame or state change is published
    pub async fn changed(&mut self) -> Result<SteeringTelemetry> {
        self.telemetry
            .changed()
            .await
            .map_err(|_| SteeringError::WorkerStopped)?;
        Ok(self.telemetry.borrow_and_update().clone())
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| SteeringError::WorkerStopped)
    }
}

/// Build a controller and move it onto a dedicated thread
///
/// The thread exits once every handle is dropped.
pub fn spawn<A, D>(
    actuator: A,
    delay: D,
    config: ControllerConfig,
    patterns: PatternTable,
) -> Result<(SteeringHandle, JoinHandle<()>)>
where
    A: Actuator + Send + 'static,
    D: Delay + Send + 'static,
{
    let (telemetry_tx, telemetry_rx) = watch::channel(SteeringTelemetry {
        state: config.initial_state,
        angles: WheelAngles::default(),
        fault: None,
    });
    let tap = FrameTap {
        inner: actuator,
        telemetry: telemetry_tx.clone(),
    };
    let controller = SteeringController::with_parts(tap, delay, config, patterns)?;

    let (requests_tx, requests_rx) = mpsc::channel(QUEUE_DEPTH);
    let thread = thread::Builder::new()
        .name("steering".to_string())
        .spawn(move || serve(controller, requests_rx, telemetry_tx))?;

    Ok((
        SteeringHandle {
            requests: requests_tx,
            telemetry: telemetry_rx,
        },
        thread,
    ))
}

fn serve<A: Actuator, D: Delay>(
    mut controller: SteeringController<FrameTap<A>, D>,
    mut requests: mpsc::Receiver<Request>,
    telemetry: watch::Sender<SteeringTelemetry>,
) {
    info!("Steering worker started");

    while let Some(request) = requests.blocking_recv() {
        match request {
            Request::SetState { state, reply } => {
                telemetry.send_modify(|t| t.state = state);
                let result = controller.set_state(state);
                if result.is_err() {
                    // Unknown states never change the controller's state
                    let current = controller.current_state();
                    telemetry.send_modify(|t| t.state = current);
                }
                finish(result, reply, &telemetry);
            }
            Request::SetAngles {
                targets,
                smooth,
                reply,
            } => {
                let result = controller.set_angles(&targets, smooth);
                finish(result, Some(reply), &telemetry);
            }
        }
    }

    info!("Steering worker stopped");
}

fn finish(
    result: Result<usize>,
    reply: Option<Reply>,
    telemetry: &watch::Sender<SteeringTelemetry>,
) {
    match &result {
        // Queued requests have nobody waiting, so faults also go out as telemetry
        Err(e @ SteeringError::Hardware(_)) => {
            warn!("Steering request failed: {}", e);
            let fault = e.to_string();
            telemetry.send_modify(|t| t.fault = Some(fault));
        }
        Err(e) => warn!("Steering request failed: {}", e),
        Ok(_) => {}
    }
    if let Some(reply) = reply {
        // Caller may have stopped waiting
        let _ = reply.send(result);
    }
}

/// Handle whose worker has already gone away
#[cfg(test)]
pub(crate) fn detached_handle() -> SteeringHandle {
    let (requests, _) = mpsc::channel(1);
    let (_, telemetry) = watch::channel(SteeringTelemetry {
        state: MovementState::Stop,
        angles: WheelAngles::default(),
        fault: None,
    });
    SteeringHandle {
        requests,
        telemetry,
    }
}

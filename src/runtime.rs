// 50 Hz loop with watchdog
// Steering requests go to the steering worker only when the requested state
// changes; the worker ramps the servos in the background while this loop
// keeps draining commands and publishing telemetry.
// If commands stop arriving for CMD_TIMEOUT, the drive motor is stopped and
// the steering is ramped back to STOP.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, TOPIC_CMD_DRIVE, TOPIC_CMD_STEERING, TOPIC_HEALTH, TOPIC_STEERING,
};
use crate::drive::{DriveError, DriveMotor, HBridge};
use crate::messages::{DriveCommand, RuntimeHealth, SteeringCommand};
use crate::steering::{MovementState, SteeringError, SteeringHandle};

/// What the hardware should be told this tick (only changes)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Actuation {
    pub steering: Option<MovementState>,
    pub drive: Option<DriveCommand>,
}

pub struct Runtime {
    latest_state: Option<MovementState>,
    latest_drive: DriveCommand,
    cmd_received_at: Instant,
    received_any: bool,
    sent_state: Option<MovementState>,
    applied_drive: Option<DriveCommand>,
    health: RuntimeHealth,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_state: None,
            latest_drive: DriveCommand::stop(),
            cmd_received_at: Instant::now(),
            received_any: false,
            sent_state: None,
            applied_drive: None,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn on_steering(&mut self, cmd: SteeringCommand) {
        if self.latest_state != Some(cmd.state) {
            info!("Received steering command: {}", cmd.state);
        }
        self.latest_state = Some(cmd.state);
        self.cmd_received_at = Instant::now();
        self.received_any = true;
    }

    pub fn on_drive(&mut self, cmd: DriveCommand) {
        debug!("Received drive command: {:?}", &cmd);
        self.latest_drive = cmd;
        self.cmd_received_at = Instant::now();
        self.received_any = true;
    }

    /// Compute actuation based on watchdog state
    pub fn compute_actuation(&mut self) -> Actuation {
        self.compute_actuation_at(Instant::now())
    }

    fn compute_actuation_at(&mut self, now: Instant) -> Actuation {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        let (state, drive) = if cmd_age > CMD_TIMEOUT || !self.received_any {
            // Watchdog triggered (or nothing received yet) - stop the rover
            if self.health == RuntimeHealth::Ok {
                warn!("Command stale ({:?} old), stopping rover", cmd_age);
            }
            if self.health != RuntimeHealth::Fault {
                self.health = RuntimeHealth::CmdStale;
            }
            self.latest_state = None;
            self.latest_drive = DriveCommand::stop();
            (MovementState::Stop, DriveCommand::stop())
        } else {
            if self.health != RuntimeHealth::Fault {
                self.health = RuntimeHealth::Ok;
            }
            (self.latest_state.unwrap_or_default(), self.latest_drive)
        };

        Actuation {
            steering: (self.sent_state != Some(state)).then_some(state),
            drive: (self.applied_drive != Some(drive)).then_some(drive),
        }
    }

    /// Record that the steering worker accepted `state`
    pub fn steering_sent(&mut self, state: MovementState) {
        self.sent_state = Some(state);
    }

    /// Record that the drive motor now runs `cmd`
    pub fn drive_applied(&mut self, cmd: DriveCommand) {
        self.applied_drive = Some(cmd);
    }

    /// Hand steering changes to the worker and apply drive changes
    ///
    /// Also picks up faults the worker hit on queued ramps.
    pub fn apply_actuation<H: HBridge>(
        &mut self,
        actuation: Actuation,
        steering: &SteeringHandle,
        drive: &mut DriveMotor<H>,
    ) {
        if let Some(state) = actuation.steering {
            match steering.submit_state(state) {
                Ok(()) => self.steering_sent(state),
                // Retried next tick
                Err(SteeringError::QueueFull) => debug!("Steering queue full, deferring {}", state),
                Err(e) => {
                    warn!("Steering worker unavailable: {}", e);
                    self.fault();
                }
            }
        }

        if let Some(cmd) = actuation.drive {
            match drive.drive(cmd.direction, cmd.speed) {
                Ok(()) => self.drive_applied(cmd),
                Err(e @ DriveError::InvalidSpeed(_)) => {
                    // Caller error: keep running whatever was applied before
                    warn!("Ignoring drive command {:?}: {}", cmd, e);
                    self.latest_drive = self.applied_drive.unwrap_or_default();
                }
                Err(e @ DriveError::Hardware(_)) => {
                    warn!("Drive command {:?} failed: {}", cmd, e);
                    self.fault();
                    self.drive_applied(cmd);
                }
            }
        }

        if let Some(fault) = steering.telemetry().fault {
            if self.health != RuntimeHealth::Fault {
                warn!("Steering worker fault: {}", fault);
                self.fault();
            }
        }
    }

    pub fn fault(&mut self) {
        self.health = RuntimeHealth::Fault;
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }
}

pub async fn run<H: HBridge>(
    steering: SteeringHandle,
    mut drive: DriveMotor<H>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_steering = session.declare_subscriber(TOPIC_CMD_STEERING).await?;
    let sub_drive = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let pub_steering = session.declare_publisher(TOPIC_STEERING).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_STEERING, TOPIC_CMD_DRIVE);
    info!("Publishing to: {}, {}", TOPIC_STEERING, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_steering.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<SteeringCommand>(&payload) {
                Ok(cmd) => runtime.on_steering(cmd),
                Err(e) => warn!("Failed to parse steering command: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_drive.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => runtime.on_drive(cmd),
                Err(e) => warn!("Failed to parse drive command: {}", e),
            }
        }

        // 2. Compute actuation (includes watchdog logic)
        let actuation = runtime.compute_actuation();

        // 3. Hand steering changes to the worker, apply drive changes
        runtime.apply_actuation(actuation, &steering, &mut drive);

        // 4. Publish live steering state
        let steering_json = serde_json::to_string(&steering.telemetry())?;
        pub_steering.put(steering_json).await?;

        // 5. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

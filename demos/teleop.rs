// Keyboard teleop: W/S forward/back, A/D strafe, Q/E diagonals, Z/X spin,
// space stop, R/F speed, Esc quit
//
// Usage: cargo run --example teleop
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use rover_steering_runtime::config::{TOPIC_CMD_DRIVE, TOPIC_CMD_STEERING};
use rover_steering_runtime::drive::DriveDirection;
use rover_steering_runtime::messages::{DriveCommand, SteeringCommand};
use rover_steering_runtime::steering::MovementState;

const SPEEDS: [f32; 3] = [30.0, 50.0, 80.0]; // duty cycle %
const INPUT_TIMEOUT_MS: u64 = 300; // Stop driving after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_steering = session.declare_publisher(TOPIC_CMD_STEERING).await?;
    let pub_drive = session.declare_publisher(TOPIC_CMD_DRIVE).await?;

    info!("Controls: W/S=forward/back, A/D=strafe, Q/E=diagonal, Z/X=spin, SPACE=stop, R/F=speed, ESC=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_steering, &pub_drive).await;
    disable_raw_mode()?;

    result
}

/// Steering state and drive direction for a movement key
fn key_intent(code: KeyCode) -> Option<(MovementState, DriveDirection)> {
    let intent = match code {
        KeyCode::Char('w') => (MovementState::Forward, DriveDirection::Forward),
        KeyCode::Char('s') => (MovementState::Backward, DriveDirection::Backward),
        KeyCode::Char('a') => (MovementState::StrafeLeft, DriveDirection::Forward),
        KeyCode::Char('d') => (MovementState::StrafeRight, DriveDirection::Forward),
        KeyCode::Char('q') => (MovementState::DiagonalLeftForward, DriveDirection::Forward),
        KeyCode::Char('e') => (MovementState::DiagonalRightForward, DriveDirection::Forward),
        KeyCode::Char('z') => (MovementState::SpinLeft, DriveDirection::Forward),
        KeyCode::Char('x') => (MovementState::SpinRight, DriveDirection::Forward),
        KeyCode::Char(' ') => (MovementState::Stop, DriveDirection::Stop),
        _ => return None,
    };
    Some(intent)
}

async fn run_teleop(
    pub_steering: &zenoh::pubsub::Publisher<'_>,
    pub_drive: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Steering holds its last state; driving lapses without input
    let mut state = MovementState::Stop;
    let mut direction = DriveDirection::Stop;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Esc if pressed => break,

                    code if pressed => {
                        if let Some((new_state, new_direction)) = key_intent(code) {
                            if new_state != state {
                                info!("Steering: {}", new_state);
                            }
                            state = new_state;
                            direction = new_direction;
                            last_movement_input = Instant::now();
                        }
                    }

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            direction = DriveDirection::Stop;
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        let steering = SteeringCommand { state };
        pub_steering.put(serde_json::to_string(&steering)?).await?;

        let drive = DriveCommand {
            direction,
            speed: SPEEDS[speed_idx],
        };
        pub_drive.put(serde_json::to_string(&drive)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}

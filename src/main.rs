use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rover_steering_runtime::actuator::{Actuator, DryRunActuator};
use rover_steering_runtime::config::RoverConfig;
use rover_steering_runtime::drive::{DriveMotor, DryRunBridge, HBridge};
use rover_steering_runtime::steering::{self, SteeringController, SteeringError, ThreadDelay};

type BoxedActuator = Box<dyn Actuator + Send>;
type BoxedBridge = Box<dyn HBridge + Send>;

#[derive(Parser)]
#[command(name = "rover-steering", about = "Six-wheel rover steering and drive runtime")]
struct Cli {
    /// JSON config file (missing fields take defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log frames instead of driving hardware
    #[arg(long)]
    dry_run: bool,

    /// Smoothing step in degrees per tick
    #[arg(long)]
    step: Option<u16>,

    /// Delay between smoothing ticks in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// TCA9548A port the servo board is on
    #[arg(long)]
    tca_channel: Option<u8>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve steering and drive commands over Zenoh (default)
    Run,
    /// Step through a few movement states and exit
    Demo,
    /// Loop the drive motor forward / stop / backward
    DriveCycle {
        /// Duty cycle percentage
        #[arg(long, default_value_t = 50.0)]
        speed: f32,
        /// How long each phase is held, in milliseconds
        #[arg(long, default_value_t = 2000)]
        hold_ms: u64,
        /// Number of cycles (runs forever when omitted)
        #[arg(long)]
        cycles: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            RoverConfig::load(path)?
        }
        None => RoverConfig::default(),
    };
    if let Some(step) = cli.step {
        config.controller.smooth_step = step;
    }
    if let Some(delay_ms) = cli.delay_ms {
        config.controller.smooth_delay_ms = delay_ms;
    }
    if let Some(tca_channel) = cli.tca_channel {
        config.tca_channel = tca_channel;
    }
    config.validate()?;

    let dry_run = cli.dry_run;
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let patterns = config.pattern_table()?;
            let controller = config.controller.clone();
            let (handle, _worker) = with_fallback(&config, dry_run, |actuator| {
                steering::spawn_worker(actuator, ThreadDelay, controller.clone(), patterns.clone())
            })?;
            let drive = DriveMotor::new(open_bridge(&config, dry_run))?;
            rover_steering_runtime::runtime::run(handle, drive).await
        }
        Command::Demo => {
            tokio::task::spawn_blocking(move || demo(&config, dry_run)).await??;
            Ok(())
        }
        Command::DriveCycle {
            speed,
            hold_ms,
            cycles,
        } => {
            tokio::task::spawn_blocking(move || {
                let mut motor = DriveMotor::new(open_bridge(&config, dry_run))?;
                let hold = Duration::from_millis(hold_ms);
                let mut done = 0;
                while cycles.is_none_or(|limit| done < limit) {
                    motor.cycle(speed, hold, &mut ThreadDelay)?;
                    done = done.saturating_add(1);
                }
                Ok::<(), rover_steering_runtime::drive::DriveError>(())
            })
            .await??;
            Ok(())
        }
    }
}

fn demo(config: &RoverConfig, dry_run: bool) -> Result<(), SteeringError> {
    let patterns = config
        .pattern_table()
        .map_err(|e| SteeringError::InvalidConfig(e.to_string()))?;
    let mut rover = with_fallback(config, dry_run, |actuator| {
        SteeringController::with_parts(
            actuator,
            ThreadDelay,
            config.controller.clone(),
            patterns.clone(),
        )
    })?;

    rover.forward()?;
    rover.strafe_left()?;
    rover.spin_right()?;
    rover.stop()?;
    info!(
        "Demo finished at {} ({} deg/tick)",
        rover.current_angles(),
        rover.config().smooth_step
    );
    Ok(())
}

/// Hardware actuator when available, dry-run otherwise
fn open_actuator(config: &RoverConfig, dry_run: bool) -> BoxedActuator {
    if dry_run {
        return Box::new(DryRunActuator::new());
    }

    #[cfg(feature = "hardware")]
    {
        use rover_steering_runtime::actuator::Pca9685Actuator;
        match Pca9685Actuator::open(config.tca_channel) {
            Ok(actuator) => return Box::new(actuator),
            Err(e) => warn!("Servo hardware unavailable ({}); switching to dry-run mode", e),
        }
    }
    #[cfg(not(feature = "hardware"))]
    {
        let _ = config;
        warn!("Built without hardware support; using dry-run mode");
    }

    Box::new(DryRunActuator::new())
}

/// Build on real hardware, retrying in dry-run if hardware setup faults
fn with_fallback<T>(
    config: &RoverConfig,
    dry_run: bool,
    build: impl Fn(BoxedActuator) -> steering::Result<T>,
) -> steering::Result<T> {
    match build(open_actuator(config, dry_run)) {
        Err(SteeringError::Hardware(e)) if !dry_run => {
            warn!("Hardware init failed ({}); switching to dry-run mode", e);
            build(Box::new(DryRunActuator::new()))
        }
        other => other,
    }
}

fn open_bridge(config: &RoverConfig, dry_run: bool) -> BoxedBridge {
    if dry_run {
        return Box::new(DryRunBridge);
    }

    #[cfg(feature = "hardware")]
    {
        use rover_steering_runtime::drive::GpioBridge;
        match GpioBridge::new(config.drive) {
            Ok(bridge) => return Box::new(bridge),
            Err(e) => warn!("Drive hardware unavailable ({}); switching to dry-run mode", e),
        }
    }
    #[cfg(not(feature = "hardware"))]
    let _ = config;

    Box::new(DryRunBridge)
}

// Steering controller for the six-servo array
//
// Owns the live wheel angles and the active movement state, and ramps the
// angles toward a requested pattern at a bounded rate, pushing one frame
// to the actuator per tick.

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::pattern::{MAX_ANGLE, MovementState, PatternTable, WHEEL_COUNT, WheelAngles};
use crate::actuator::{Actuator, ActuatorError};
use crate::config::ControllerConfig;

#[derive(Debug, thiserror::Error)]
pub enum SteeringError {
    #[error("Expected {expected} wheel angles, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Unknown movement state '{0}'")]
    UnknownState(String),

    #[error("Actuator fault: {0}")]
    Hardware(#[from] ActuatorError),

    #[error("Invalid controller configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to start steering worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Steering request queue is full")]
    QueueFull,

    #[error("Steering worker is no longer running")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, SteeringError>;

/// Pause between ramp ticks
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

/// Blocks the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay(&mut self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Fold any angle into the servo range [0, 180]
///
/// The angle is wrapped into [0, 360) first; anything past 180 is reflected
/// about 180, so 315 becomes 45 rather than clamping to 180.
pub fn normalize_angle(raw: i32) -> i32 {
    let wrapped = raw.rem_euclid(360);
    if wrapped > MAX_ANGLE {
        360 - wrapped
    } else {
        wrapped
    }
}

fn normalize_all(raw: &[i32; WHEEL_COUNT]) -> WheelAngles {
    WheelAngles::new((*raw).map(normalize_angle))
}

pub struct SteeringController<A: Actuator, D: Delay = ThreadDelay> {
    actuator: A,
    delay: D,
    config: ControllerConfig,
    patterns: PatternTable,
    state: MovementState,
    wheels: WheelAngles, // live angles, may be mid-ramp
}

impl<A: Actuator> SteeringController<A> {
    /// Create a controller with the stock patterns and a sleeping delay
    pub fn new(actuator: A, config: ControllerConfig) -> Result<Self> {
        Self::with_parts(actuator, ThreadDelay, config, PatternTable::default())
    }
}

impl<A: Actuator, D: Delay> SteeringController<A, D> {
    /// Create a controller from explicit collaborators
    ///
    /// Initializes the actuator, then applies the initial state's pattern
    /// as a single unsmoothed frame.
    pub fn with_parts(
        mut actuator: A,
        delay: D,
        config: ControllerConfig,
        patterns: PatternTable,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SteeringError::InvalidConfig(e.to_string()))?;

        let state = config.initial_state;
        let wheels = normalize_all(&patterns.lookup(state)?.as_array());

        actuator.initialize(&config.channels, config.pulse_range)?;
        info!(
            "Steering controller ready: channels {:?}, step {} deg, delay {}ms",
            config.channels, config.smooth_step, config.smooth_delay_ms
        );

        let mut controller = Self {
            actuator,
            delay,
            config,
            patterns,
            state,
            wheels,
        };
        controller.apply()?;
        Ok(controller)
    }

    /// Set all six wheel angles, returning the number of frames applied
    ///
    /// With `smooth`, every wheel moves at most `smooth_step` degrees per
    /// tick and the call blocks until all wheels reach their targets.
    pub fn set_angles(&mut self, targets: &[i32], smooth: bool) -> Result<usize> {
        let targets: &[i32; WHEEL_COUNT] =
            targets.try_into().map_err(|_| SteeringError::InvalidLength {
                expected: WHEEL_COUNT,
                actual: targets.len(),
            })?;
        let target = normalize_all(targets);

        if !smooth {
            self.wheels = target;
            self.apply()?;
            return Ok(1);
        }

        self.ramp_to(target)
    }

    fn ramp_to(&mut self, target: WheelAngles) -> Result<usize> {
        let step = i32::from(self.config.smooth_step);
        let delay = self.config.smooth_delay();
        let mut current = self.wheels.as_array();
        let mut ticks = 0;

        loop {
            let mut done = true;
            for (wheel, &goal) in current.iter_mut().zip(target.iter()) {
                let diff = goal - *wheel;
                if diff.abs() > step {
                    *wheel += step * diff.signum();
                    done = false;
                } else {
                    *wheel = goal;
                }
            }

            self.wheels = WheelAngles::new(current);
            self.apply()?;
            ticks += 1;

            if done {
                break;
            }
            self.delay.delay(delay);
        }

        debug!("Ramp to {} finished in {} ticks", target, ticks);
        Ok(ticks)
    }

    /// Ramp to the pattern for `state`, returning the number of frames applied
    pub fn set_state(&mut self, state: MovementState) -> Result<usize> {
        let pattern = self.patterns.lookup(state)?;
        if state != self.state {
            info!("Steering state {} -> {}", self.state, state);
        }
        self.state = state;
        self.set_angles(&pattern.as_array(), true)
    }

    /// Same as `set_state`, taking the state's upper-snake name
    pub fn set_state_by_name(&mut self, name: &str) -> Result<usize> {
        let state: MovementState = name.parse()?;
        self.set_state(state)
    }

    pub fn stop(&mut self) -> Result<usize> {
        self.set_state(MovementState::Stop)
    }

    pub fn forward(&mut self) -> Result<usize> {
        self.set_state(MovementState::Forward)
    }

    pub fn backward(&mut self) -> Result<usize> {
        self.set_state(MovementState::Backward)
    }

    pub fn strafe_left(&mut self) -> Result<usize> {
        self.set_state(MovementState::StrafeLeft)
    }

    pub fn strafe_right(&mut self) -> Result<usize> {
        self.set_state(MovementState::StrafeRight)
    }

    pub fn diagonal_left_forward(&mut self) -> Result<usize> {
        self.set_state(MovementState::DiagonalLeftForward)
    }

    pub fn diagonal_right_forward(&mut self) -> Result<usize> {
        self.set_state(MovementState::DiagonalRightForward)
    }

    pub fn spin_left(&mut self) -> Result<usize> {
        self.set_state(MovementState::SpinLeft)
    }

    pub fn spin_right(&mut self) -> Result<usize> {
        self.set_state(MovementState::SpinRight)
    }

    /// Snapshot of the live (possibly mid-ramp) angles
    pub fn current_angles(&self) -> WheelAngles {
        self.wheels
    }

    pub fn current_state(&self) -> MovementState {
        self.state
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn apply(&mut self) -> Result<()> {
        debug!("[{}] wheels -> {}", self.state, self.wheels);
        self.actuator
            .apply_frame(&self.wheels, &self.config.channels)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::RecordingActuator;

    /// Counts delays without sleeping
    #[derive(Debug, Default)]
    struct CountingDelay {
        calls: usize,
        total: Duration,
    }

    impl Delay for CountingDelay {
        fn delay(&mut self, duration: Duration) {
            self.calls += 1;
            self.total += duration;
        }
    }

    fn controller(
        config: ControllerConfig,
    ) -> (
        SteeringController<RecordingActuator, CountingDelay>,
        RecordingActuator,
    ) {
        let recorder = RecordingActuator::new();
        let controller = SteeringController::with_parts(
            recorder.clone(),
            CountingDelay::default(),
            config,
            PatternTable::default(),
        )
        .unwrap();
        recorder.clear();
        (controller, recorder)
    }

    fn distance(a: &WheelAngles, b: &WheelAngles) -> [i32; WHEEL_COUNT] {
        let mut out = [0; WHEEL_COUNT];
        for i in 0..WHEEL_COUNT {
            out[i] = (a[i] - b[i]).abs();
        }
        out
    }

    #[test]
    fn test_normalize_fixed_points() {
        assert_eq!(normalize_angle(0), 0);
        assert_eq!(normalize_angle(90), 90);
        assert_eq!(normalize_angle(180), 180);
        assert_eq!(normalize_angle(315), 45);
        assert_eq!(normalize_angle(270), 90);
        assert_eq!(normalize_angle(-45), 45);
        assert_eq!(normalize_angle(360), 0);
        assert_eq!(normalize_angle(181), 179);
        assert_eq!(normalize_angle(-720), 0);
    }

    #[test]
    fn test_normalize_range_and_idempotence() {
        let samples = (-1000..=1000)
            .chain([i32::MIN, i32::MIN + 1, i32::MAX, i32::MAX - 1]);
        for raw in samples {
            let once = normalize_angle(raw);
            assert!((0..=180).contains(&once), "{} -> {}", raw, once);
            assert_eq!(normalize_angle(once), once, "not idempotent at {}", raw);
        }
    }

    #[test]
    fn test_construction_applies_initial_pattern() {
        let recorder = RecordingActuator::new();
        let config = ControllerConfig::default().with_initial_state(MovementState::StrafeRight);
        let controller = SteeringController::with_parts(
            recorder.clone(),
            CountingDelay::default(),
            config.clone(),
            PatternTable::default(),
        )
        .unwrap();

        assert_eq!(recorder.initialized_with(), Some((config.channels, config.pulse_range)));
        assert_eq!(recorder.frame_count(), 1);
        assert_eq!(controller.current_state(), MovementState::StrafeRight);
        assert_eq!(
            controller.current_angles(),
            WheelAngles::new([135, 45, 135, 45, 135, 45])
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SteeringController::with_parts(
            RecordingActuator::new(),
            CountingDelay::default(),
            ControllerConfig::default().with_smooth_step(0),
            PatternTable::default(),
        );
        assert!(matches!(result, Err(SteeringError::InvalidConfig(_))));
    }

    #[test]
    fn test_wrong_length_leaves_state_untouched() {
        let (mut controller, recorder) = controller(ControllerConfig::default());
        let before = controller.current_angles();

        for targets in [vec![0; 5], vec![0; 7], vec![]] {
            match controller.set_angles(&targets, true) {
                Err(SteeringError::InvalidLength { expected, actual }) => {
                    assert_eq!(expected, 6);
                    assert_eq!(actual, targets.len());
                }
                other => panic!("expected InvalidLength, got {:?}", other),
            }
            assert!(controller.set_angles(&targets, false).is_err());
        }

        assert_eq!(controller.current_angles(), before);
        assert_eq!(recorder.frame_count(), 0);
    }

    #[test]
    fn test_unsmoothed_is_one_frame() {
        let (mut controller, recorder) = controller(ControllerConfig::default());
        controller.set_angles(&[0; 6], false).unwrap();
        recorder.clear();

        let ticks = controller.set_angles(&[90; 6], false).unwrap();
        assert_eq!(ticks, 1);
        assert_eq!(recorder.frames(), vec![WheelAngles::uniform(90)]);
        assert_eq!(controller.current_angles(), WheelAngles::uniform(90));
        assert_eq!(controller.delay.calls, 0);
    }

    #[test]
    fn test_unsmoothed_targets_are_normalized() {
        let (mut controller, _) = controller(ControllerConfig::default());
        controller
            .set_angles(&[315, -45, 270, 360, 181, 90], false)
            .unwrap();
        assert_eq!(
            controller.current_angles(),
            WheelAngles::new([45, 45, 90, 0, 179, 90])
        );
    }

    #[test]
    fn test_ramp_90_to_0_takes_30_ticks() {
        let config = ControllerConfig::default()
            .with_smooth_step(3)
            .with_smooth_delay(Duration::from_millis(20));
        let (mut controller, recorder) = controller(config);
        let target = WheelAngles::uniform(0);

        let ticks = controller.set_angles(&[0; 6], true).unwrap();
        let frames = recorder.frames();

        assert_eq!(ticks, 30);
        assert_eq!(frames.len(), 30);
        assert_eq!(frames.first(), Some(&WheelAngles::uniform(87)));
        assert_eq!(frames.last(), Some(&target));
        assert_eq!(controller.current_angles(), target);

        // Sleeps between ticks only, none after the final one
        assert_eq!(controller.delay.calls, 29);
        assert_eq!(controller.delay.total, Duration::from_millis(29 * 20));

        let mut previous = distance(&WheelAngles::uniform(90), &target);
        for frame in &frames {
            let now = distance(frame, &target);
            for wheel in 0..WHEEL_COUNT {
                assert!(now[wheel] <= previous[wheel]);
            }
            previous = now;
        }
    }

    #[test]
    fn test_ramp_rate_is_bounded_and_wheels_converge_independently() {
        let config = ControllerConfig::default().with_smooth_step(4);
        let (mut controller, recorder) = controller(config);
        let targets = [90, 100, 80, 130, 45, 180];

        let ticks = controller.set_angles(&targets, true).unwrap();
        let frames = recorder.frames();

        // ceil(max distance / step) = ceil(90 / 4)
        assert_eq!(ticks, 23);
        assert_eq!(frames.len(), 23);

        let mut previous = WheelAngles::uniform(90);
        for frame in &frames {
            for wheel in 0..WHEEL_COUNT {
                assert!((frame[wheel] - previous[wheel]).abs() <= 4);
            }
            previous = *frame;
        }

        // The middle-left wheel is 10 away: done on tick 3, then held
        assert_eq!(frames[1][2], 82);
        for frame in &frames[2..] {
            assert_eq!(frame[2], 80);
        }
        assert_eq!(controller.current_angles(), WheelAngles::new(targets));
    }

    #[test]
    fn test_ramp_already_at_target_emits_one_frame() {
        let (mut controller, recorder) = controller(ControllerConfig::default());
        let ticks = controller.set_angles(&[90; 6], true).unwrap();
        assert_eq!(ticks, 1);
        assert_eq!(recorder.frame_count(), 1);
        assert_eq!(controller.delay.calls, 0);
    }

    #[test]
    fn test_set_state_strafe_left() {
        let (mut controller, recorder) = controller(ControllerConfig::default());
        let ticks = controller.set_state(MovementState::StrafeLeft).unwrap();

        assert_eq!(ticks, 15); // 45 degrees at 3 per tick
        assert_eq!(recorder.frame_count(), 15);
        assert_eq!(controller.current_state(), MovementState::StrafeLeft);
        assert_eq!(
            controller.current_angles(),
            WheelAngles::new([45, 135, 45, 135, 45, 135])
        );
    }

    #[test]
    fn test_any_state_reachable_from_any_other() {
        let (mut controller, _) = controller(ControllerConfig::default().with_smooth_step(7));
        let table = PatternTable::default();
        for from in MovementState::ALL {
            for to in MovementState::ALL {
                controller.set_state(from).unwrap();
                controller.set_state(to).unwrap();
                assert_eq!(controller.current_state(), to);
                assert_eq!(controller.current_angles(), table.lookup(to).unwrap());
            }
        }
    }

    #[test]
    fn test_convenience_wrappers() {
        let (mut controller, _) = controller(ControllerConfig::default());
        controller.spin_right().unwrap();
        assert_eq!(controller.current_state(), MovementState::SpinRight);
        controller.diagonal_left_forward().unwrap();
        assert_eq!(controller.current_state(), MovementState::DiagonalLeftForward);
        assert_eq!(
            controller.current_angles(),
            WheelAngles::new([90, 60, 90, 60, 90, 60])
        );
        controller.stop().unwrap();
        assert_eq!(controller.current_angles(), WheelAngles::uniform(90));
    }

    #[test]
    fn test_unknown_state_leaves_state_untouched() {
        let recorder = RecordingActuator::new();
        let table = PatternTable::from_entries([
            (MovementState::Stop, WheelAngles::uniform(90)),
            (MovementState::StrafeLeft, WheelAngles::from_center([-45, 45, -45, 45, -45, 45])),
        ]);
        let mut controller = SteeringController::with_parts(
            recorder.clone(),
            CountingDelay::default(),
            ControllerConfig::default(),
            table,
        )
        .unwrap();
        controller.strafe_left().unwrap();
        recorder.clear();
        let before = controller.current_angles();

        assert!(matches!(
            controller.set_state(MovementState::SpinLeft),
            Err(SteeringError::UnknownState(_))
        ));
        assert!(matches!(
            controller.set_state_by_name("MOONWALK"),
            Err(SteeringError::UnknownState(_))
        ));
        assert_eq!(controller.current_state(), MovementState::StrafeLeft);
        assert_eq!(controller.current_angles(), before);
        assert_eq!(recorder.frame_count(), 0);
    }

    #[test]
    fn test_set_state_by_name() {
        let (mut controller, _) = controller(ControllerConfig::default());
        controller.set_state_by_name("SPIN_LEFT").unwrap();
        assert_eq!(controller.current_state(), MovementState::SpinLeft);
    }

    #[test]
    fn test_hardware_fault_aborts_ramp() {
        let recorder = RecordingActuator::failing_after(5);
        let mut controller = SteeringController::with_parts(
            recorder.clone(),
            CountingDelay::default(),
            ControllerConfig::default(),
            PatternTable::default(),
        )
        .unwrap();

        let result = controller.set_angles(&[0; 6], true);
        assert!(matches!(result, Err(SteeringError::Hardware(_))));

        // Power-on frame plus four ramp ticks got through, the fifth tick faulted
        assert_eq!(recorder.frame_count(), 5);
        assert_eq!(controller.current_angles(), WheelAngles::uniform(75));
        assert_eq!(controller.delay.calls, 4);
    }

    #[test]
    fn test_frames_follow_channel_assignment() {
        let config = ControllerConfig::default().with_channels([10, 11, 12, 13, 14, 15]);
        let (mut controller, recorder) = controller(config);
        controller.set_angles(&[1, 2, 3, 4, 5, 6], false).unwrap();
        let (angles, channels) = recorder.last_frame().unwrap();
        assert_eq!(angles, WheelAngles::new([1, 2, 3, 4, 5, 6]));
        assert_eq!(channels, [10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_controllers_are_independent() {
        let (mut first, _) = controller(ControllerConfig::default());
        let (second, _) = controller(ControllerConfig::default());
        first.spin_left().unwrap();
        assert_eq!(second.current_state(), MovementState::Stop);
        assert_eq!(second.current_angles(), WheelAngles::uniform(90));
    }
}

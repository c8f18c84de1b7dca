// Named movement states and their fixed steering patterns
// Wheel index order is always [FL, FR, ML, MR, RL, RR].

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SteeringError;

/// Number of steerable wheels on the rover
pub const WHEEL_COUNT: usize = 6;

/// Straight-ahead servo angle (degrees)
pub const CENTER: i32 = 90;

/// Upper end of the servo mechanical range (degrees)
pub const MAX_ANGLE: i32 = 180;

/// Discrete movement intents the steering array knows how to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementState {
    #[default]
    Stop,
    Forward,
    Backward,
    StrafeLeft,
    StrafeRight,
    DiagonalLeftForward,
    DiagonalRightForward,
    SpinLeft,
    SpinRight,
}

impl MovementState {
    pub const ALL: [MovementState; 9] = [
        MovementState::Stop,
        MovementState::Forward,
        MovementState::Backward,
        MovementState::StrafeLeft,
        MovementState::StrafeRight,
        MovementState::DiagonalLeftForward,
        MovementState::DiagonalRightForward,
        MovementState::SpinLeft,
        MovementState::SpinRight,
    ];

    /// Upper-snake name used on the wire and in config files
    pub fn name(self) -> &'static str {
        match self {
            MovementState::Stop => "STOP",
            MovementState::Forward => "FORWARD",
            MovementState::Backward => "BACKWARD",
            MovementState::StrafeLeft => "STRAFE_LEFT",
            MovementState::StrafeRight => "STRAFE_RIGHT",
            MovementState::DiagonalLeftForward => "DIAGONAL_LEFT_FORWARD",
            MovementState::DiagonalRightForward => "DIAGONAL_RIGHT_FORWARD",
            MovementState::SpinLeft => "SPIN_LEFT",
            MovementState::SpinRight => "SPIN_RIGHT",
        }
    }
}

impl fmt::Display for MovementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MovementState {
    type Err = SteeringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MovementState::ALL
            .into_iter()
            .find(|state| state.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SteeringError::UnknownState(s.to_string()))
    }
}

/// One angle per wheel, in wheel index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelAngles(pub [i32; WHEEL_COUNT]);

impl WheelAngles {
    pub const fn new(angles: [i32; WHEEL_COUNT]) -> Self {
        Self(angles)
    }

    /// Every wheel at the same angle
    pub const fn uniform(angle: i32) -> Self {
        Self([angle; WHEEL_COUNT])
    }

    /// Center plus a per-wheel offset
    pub const fn from_center(offsets: [i32; WHEEL_COUNT]) -> Self {
        let mut angles = [CENTER; WHEEL_COUNT];
        let mut i = 0;
        while i < WHEEL_COUNT {
            angles[i] += offsets[i];
            i += 1;
        }
        Self(angles)
    }

    /// Returns angles as array [FL, FR, ML, MR, RL, RR]
    pub fn as_array(&self) -> [i32; WHEEL_COUNT] {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &i32> {
        self.0.iter()
    }
}

impl Default for WheelAngles {
    fn default() -> Self {
        Self::uniform(CENTER)
    }
}

impl Index<usize> for WheelAngles {
    type Output = i32;

    fn index(&self, wheel: usize) -> &i32 {
        &self.0[wheel]
    }
}

impl fmt::Display for WheelAngles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Stock patterns, centered at 90 degrees (tune offsets for the real geometry)
pub const DEFAULT_PATTERNS: [(MovementState, WheelAngles); 9] = [
    (MovementState::Stop, WheelAngles::uniform(CENTER)),
    (MovementState::Forward, WheelAngles::uniform(CENTER)),
    // Steering is the same as forward, the drive motor handles direction
    (MovementState::Backward, WheelAngles::uniform(CENTER)),
    (
        MovementState::StrafeLeft,
        WheelAngles::from_center([-45, 45, -45, 45, -45, 45]),
    ),
    (
        MovementState::StrafeRight,
        WheelAngles::from_center([45, -45, 45, -45, 45, -45]),
    ),
    (
        MovementState::DiagonalLeftForward,
        WheelAngles::from_center([0, -30, 0, -30, 0, -30]),
    ),
    (
        MovementState::DiagonalRightForward,
        WheelAngles::from_center([30, 0, 30, 0, 30, 0]),
    ),
    // Toe in/out to pivot in place
    (
        MovementState::SpinLeft,
        WheelAngles::from_center([-45, 45, 45, -45, -45, 45]),
    ),
    (
        MovementState::SpinRight,
        WheelAngles::from_center([45, -45, -45, 45, 45, -45]),
    ),
];

/// Immutable lookup from movement state to target wheel angles
///
/// Entries hold the raw configured angles; the controller normalizes them
/// before use, so a row may carry values outside [0, 180].
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTable {
    patterns: HashMap<MovementState, WheelAngles>,
}

impl PatternTable {
    /// Build a table holding exactly the given rows
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (MovementState, WheelAngles)>,
    {
        Self {
            patterns: entries.into_iter().collect(),
        }
    }

    /// Replace individual rows, keeping the rest
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (MovementState, WheelAngles)>,
    {
        self.patterns.extend(overrides);
        self
    }

    pub fn lookup(&self, state: MovementState) -> Result<WheelAngles, SteeringError> {
        self.patterns
            .get(&state)
            .copied()
            .ok_or_else(|| SteeringError::UnknownState(state.name().to_string()))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::from_entries(DEFAULT_PATTERNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_total() {
        let table = PatternTable::default();
        assert_eq!(table.len(), MovementState::ALL.len());
        for state in MovementState::ALL {
            assert!(table.lookup(state).is_ok(), "{} missing", state);
        }
    }

    #[test]
    fn test_strafe_left_pattern() {
        let table = PatternTable::default();
        assert_eq!(
            table.lookup(MovementState::StrafeLeft).unwrap(),
            WheelAngles::new([45, 135, 45, 135, 45, 135])
        );
        assert_eq!(
            table.lookup(MovementState::StrafeRight).unwrap(),
            WheelAngles::new([135, 45, 135, 45, 135, 45])
        );
    }

    #[test]
    fn test_straight_states_are_centered() {
        let table = PatternTable::default();
        for state in [
            MovementState::Stop,
            MovementState::Forward,
            MovementState::Backward,
        ] {
            assert_eq!(table.lookup(state).unwrap(), WheelAngles::uniform(CENTER));
        }
    }

    #[test]
    fn test_spin_patterns_mirror_each_other() {
        let table = PatternTable::default();
        let left = table.lookup(MovementState::SpinLeft).unwrap();
        let right = table.lookup(MovementState::SpinRight).unwrap();
        for wheel in 0..WHEEL_COUNT {
            assert_eq!(left[wheel] - CENTER, CENTER - right[wheel]);
        }
    }

    #[test]
    fn test_missing_row_is_unknown_state() {
        let table = PatternTable::from_entries([(MovementState::Stop, WheelAngles::default())]);
        match table.lookup(MovementState::SpinLeft) {
            Err(SteeringError::UnknownState(name)) => assert_eq!(name, "SPIN_LEFT"),
            other => panic!("expected UnknownState, got {:?}", other),
        }
    }

    #[test]
    fn test_overrides_replace_single_rows() {
        let table = PatternTable::default()
            .with_overrides([(MovementState::Forward, WheelAngles::uniform(100))]);
        assert_eq!(table.len(), 9);
        assert_eq!(
            table.lookup(MovementState::Forward).unwrap(),
            WheelAngles::uniform(100)
        );
        assert_eq!(
            table.lookup(MovementState::Backward).unwrap(),
            WheelAngles::uniform(CENTER)
        );
    }

    #[test]
    fn test_state_names_parse() {
        assert_eq!(
            "STRAFE_LEFT".parse::<MovementState>().unwrap(),
            MovementState::StrafeLeft
        );
        assert_eq!(
            "spin_right".parse::<MovementState>().unwrap(),
            MovementState::SpinRight
        );
        assert!(matches!(
            "MOONWALK".parse::<MovementState>(),
            Err(SteeringError::UnknownState(_))
        ));
        for state in MovementState::ALL {
            assert_eq!(state.name().parse::<MovementState>().unwrap(), state);
        }
    }

    #[test]
    fn test_state_serializes_as_upper_snake() {
        let json = serde_json::to_string(&MovementState::DiagonalLeftForward).unwrap();
        assert_eq!(json, "\"DIAGONAL_LEFT_FORWARD\"");
        let angles = serde_json::to_string(&WheelAngles::uniform(90)).unwrap();
        assert_eq!(angles, "[90,90,90,90,90,90]");
    }
}

// Steering and drive runtime for a six-wheel rover
pub mod actuator;
pub mod config;
pub mod drive;
pub mod messages;
pub mod runtime;
pub mod steering;

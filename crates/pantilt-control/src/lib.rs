//! Feedback control for a two-axis pan/tilt platform.
//!
//! A noisy, intermittent pixel-offset signal goes in; bounded, axis-limited
//! motion comes out. Each axis runs its own [`PiController`] with anti-windup
//! and dead-band reset, and drives either a stepper (relative step counts)
//! or a servo (absolute angles) depending on [`ActuatorMode`].

pub mod actuator;
pub mod axis;
pub mod command;
pub mod error;
pub mod gimbal;
pub mod pi;

pub use actuator::{Actuator, LineActuator, TracingActuator};
pub use axis::{ActuatorMode, Axis, AxisConfig, Direction};
pub use command::{ControlCommand, PanDirective, TiltDirective};
pub use error::{ControlError, Result};
pub use gimbal::{Gimbal, GimbalConfig, GimbalMove};
pub use pi::{AxisCommand, AxisState, PiController};

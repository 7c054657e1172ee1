use std::fmt;

use serde::Serialize;

use crate::error::{ControlError, Result};

/// One of the two independent axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Pan,
    Tilt,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Pan => "pan",
            Axis::Tilt => "tilt",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the actuator consumes controller output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorMode {
    /// Relative integer step counts; zero means no command.
    Stepper,
    /// Absolute angle in degrees, written every cycle.
    Servo,
}

impl ActuatorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ActuatorMode::Stepper => "stepper",
            ActuatorMode::Servo => "servo",
        }
    }
}

/// Maps controller output (image coordinates: +x right, +y down) onto the
/// actuator's positive direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Actuator + follows image +.
    Normal,
    /// Actuator + opposes image + (servo tilt: +angle is up, image +y is down).
    Inverted,
}

impl Direction {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Direction::Normal => value,
            Direction::Inverted => -value,
        }
    }
}

/// Tuning and limits for a single axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisConfig {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Anti-windup clamp for the accumulated error (pixels).
    pub max_integral: f64,
    /// Error magnitude (pixels) below which the integral resets.
    pub deadband: f64,
    /// Per-cycle output clamp: steps (stepper) or degrees (servo).
    pub max_output: f64,
    /// Absolute position range: steps (stepper) or degrees (servo).
    pub min_position: f64,
    pub max_position: f64,
    /// Sign mapping from image to actuator coordinates.
    pub direction: Direction,
}

impl AxisConfig {
    /// Defaults for a hobby servo with a ±90° sweep.
    pub fn servo() -> Self {
        Self {
            kp: 0.04,
            ki: 0.002,
            max_integral: 500.0,
            deadband: 5.0,
            max_output: 5.0,
            min_position: -90.0,
            max_position: 90.0,
            direction: Direction::Normal,
        }
    }

    /// Defaults for a stepper driven in whole steps.
    pub fn stepper() -> Self {
        Self {
            kp: 0.1,
            ki: 0.005,
            max_integral: 500.0,
            deadband: 5.0,
            max_output: 20.0,
            min_position: -2000.0,
            max_position: 2000.0,
            direction: Direction::Normal,
        }
    }

    /// Defaults for `mode`.
    pub fn for_mode(mode: ActuatorMode) -> Self {
        match mode {
            ActuatorMode::Stepper => Self::stepper(),
            ActuatorMode::Servo => Self::servo(),
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// The position the axis returns to on shutdown: zero, or the nearest
    /// in-range value when zero lies outside the limits.
    pub fn home(&self) -> f64 {
        0.0f64.clamp(self.min_position, self.max_position)
    }

    /// Whole-step positions inside the limits, or `None` when no integer
    /// lies between them.
    pub fn step_range(&self) -> Option<(f64, f64)> {
        let (lo, hi) = (self.min_position.ceil(), self.max_position.floor());
        (lo <= hi).then_some((lo, hi))
    }

    /// Where the axis starts and re-centers to in `mode`. Steppers snap
    /// [`home`](Self::home) onto a whole step.
    pub fn rest_position(&self, mode: ActuatorMode) -> f64 {
        match (mode, self.step_range()) {
            (ActuatorMode::Stepper, Some((lo, hi))) => 0.0f64.clamp(lo, hi),
            _ => self.home(),
        }
    }

    /// [`validate`](Self::validate), plus the checks that depend on `mode`.
    pub fn validate_for(&self, axis: Axis, mode: ActuatorMode) -> Result<()> {
        self.validate(axis)?;
        if mode == ActuatorMode::Stepper && self.step_range().is_none() {
            return Err(ControlError::InvalidConfig {
                axis: axis.as_str(),
                reason: format!(
                    "stepper limits [{}, {}] contain no whole step",
                    self.min_position, self.max_position
                ),
            });
        }
        Ok(())
    }

    /// Reject values the controller cannot honor.
    pub fn validate(&self, axis: Axis) -> Result<()> {
        let fail = |reason: String| {
            Err(ControlError::InvalidConfig {
                axis: axis.as_str(),
                reason,
            })
        };

        let finite = [
            ("kp", self.kp),
            ("ki", self.ki),
            ("max_integral", self.max_integral),
            ("deadband", self.deadband),
            ("max_output", self.max_output),
            ("min_position", self.min_position),
            ("max_position", self.max_position),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return fail(format!("{name} must be finite (got {value})"));
            }
        }

        if self.max_integral < 0.0 {
            return fail(format!(
                "max_integral must be >= 0 (got {})",
                self.max_integral
            ));
        }
        if self.deadband < 0.0 {
            return fail(format!("deadband must be >= 0 (got {})", self.deadband));
        }
        if self.max_output <= 0.0 {
            return fail(format!("max_output must be > 0 (got {})", self.max_output));
        }
        if self.min_position > self.max_position {
            return fail(format!(
                "limits are reversed ({} > {})",
                self.min_position, self.max_position
            ));
        }
        Ok(())
    }
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self::servo()
    }
}

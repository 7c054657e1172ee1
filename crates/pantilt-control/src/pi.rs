use serde::Serialize;
use tracing::trace;

use crate::axis::{ActuatorMode, Axis, AxisConfig};

/// Mutable per-axis state, never shared between axes. Starts at the axis
/// rest position with nothing accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AxisState {
    /// Tracked absolute position (steps or degrees).
    pub position: f64,
    /// Accumulated pixel error, clamped to `±max_integral`.
    pub integral: f64,
}

/// What the actuator should do this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AxisCommand {
    /// Nothing to do.
    None,
    /// Move by a relative step count.
    Step(i32),
    /// Go to an absolute angle in degrees.
    Angle(f64),
}

/// Proportional-integral controller for one axis.
#[derive(Debug, Clone)]
pub struct PiController {
    axis: Axis,
    mode: ActuatorMode,
    config: AxisConfig,
    state: AxisState,
}

impl PiController {
    pub fn new(axis: Axis, mode: ActuatorMode, config: AxisConfig) -> Self {
        let state = AxisState {
            position: config.rest_position(mode),
            integral: 0.0,
        };
        Self {
            axis,
            mode,
            config,
            state,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn mode(&self) -> ActuatorMode {
        self.mode
    }

    pub fn config(&self) -> &AxisConfig {
        &self.config
    }

    pub fn state(&self) -> AxisState {
        self.state
    }

    /// Feed one pixel-error sample and get the resulting actuator command.
    ///
    /// Positive error (target right of / below center) yields positive output
    /// in image coordinates, which the axis [`Direction`](crate::Direction)
    /// maps onto the actuator.
    pub fn update(&mut self, error: i32) -> AxisCommand {
        let e = f64::from(error);
        let cfg = &self.config;

        self.state.integral =
            (self.state.integral + e).clamp(-cfg.max_integral, cfg.max_integral);
        if e.abs() < cfg.deadband {
            self.state.integral = 0.0;
        }

        let output = cfg.kp * e + cfg.ki * self.state.integral;
        let delta = cfg.direction.apply(output);

        trace!(
            axis = %self.axis,
            error,
            integral = self.state.integral,
            output,
            "pi update"
        );

        self.apply_delta(delta)
    }

    /// Move one full per-cycle step in actuator coordinates (`+1` or `-1`),
    /// bypassing the PI terms. Used for directive commands.
    pub fn nudge(&mut self, sign: i8) -> AxisCommand {
        let delta = f64::from(sign.signum()) * self.config.max_output;
        self.apply_delta(delta)
    }

    /// Forget accumulated error and return the axis to its home position.
    pub fn recenter(&mut self) -> AxisCommand {
        self.state.integral = 0.0;
        let home = self.config.rest_position(self.mode);
        match self.mode {
            ActuatorMode::Stepper => {
                let steps = (home - self.state.position).round() as i32;
                self.state.position = home;
                if steps == 0 {
                    AxisCommand::None
                } else {
                    AxisCommand::Step(steps)
                }
            }
            ActuatorMode::Servo => {
                self.state.position = home;
                AxisCommand::Angle(home)
            }
        }
    }

    fn apply_delta(&mut self, delta: f64) -> AxisCommand {
        let cfg = &self.config;
        match self.mode {
            ActuatorMode::Stepper => {
                let Some((lo, hi)) = cfg.step_range() else {
                    return AxisCommand::None;
                };
                let max_step = cfg.max_output.trunc();
                let steps = delta.trunc().clamp(-max_step, max_step);
                let target = (self.state.position + steps).clamp(lo, hi);
                let steps = (target - self.state.position) as i32;
                if steps == 0 {
                    return AxisCommand::None;
                }
                self.state.position += f64::from(steps);
                AxisCommand::Step(steps)
            }
            ActuatorMode::Servo => {
                let delta = delta.clamp(-cfg.max_output, cfg.max_output);
                self.state.position =
                    (self.state.position + delta).clamp(cfg.min_position, cfg.max_position);
                AxisCommand::Angle(self.state.position)
            }
        }
    }
}

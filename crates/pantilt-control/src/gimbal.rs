use serde::Serialize;
use tracing::{debug, info, warn};

use crate::actuator::Actuator;
use crate::axis::{ActuatorMode, Axis, AxisConfig, Direction};
use crate::command::ControlCommand;
use crate::error::Result;
use crate::pi::{AxisCommand, PiController};

/// Deployment-wide controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GimbalConfig {
    pub mode: ActuatorMode,
    pub pan: AxisConfig,
    pub tilt: AxisConfig,
}

impl GimbalConfig {
    /// Defaults for `mode`, with tilt inverted so that image +y ("target
    /// below center") drives the actuator toward its negative end.
    pub fn for_mode(mode: ActuatorMode) -> Self {
        Self {
            mode,
            pan: AxisConfig::for_mode(mode),
            tilt: AxisConfig::for_mode(mode).with_direction(Direction::Inverted),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.pan.validate_for(Axis::Pan, self.mode)?;
        self.tilt.validate_for(Axis::Tilt, self.mode)
    }
}

impl Default for GimbalConfig {
    fn default() -> Self {
        Self::for_mode(ActuatorMode::Servo)
    }
}

/// Commands issued for one control message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GimbalMove {
    pub pan: AxisCommand,
    pub tilt: AxisCommand,
}

/// Two independent PI axes bound to one actuator.
///
/// The actuator is optional: when it failed to initialize the gimbal still
/// tracks and reports, it just doesn't move anything. Dropping the gimbal
/// runs [`shutdown`](Self::shutdown) if it hasn't run yet.
pub struct Gimbal {
    mode: ActuatorMode,
    pan: PiController,
    tilt: PiController,
    actuator: Option<Box<dyn Actuator>>,
    shut_down: bool,
}

impl Gimbal {
    pub fn new(config: GimbalConfig, actuator: Option<Box<dyn Actuator>>) -> Result<Self> {
        config.validate()?;
        if actuator.is_none() {
            warn!("no actuator attached; commands will be computed but not applied");
        }
        Ok(Self {
            mode: config.mode,
            pan: PiController::new(Axis::Pan, config.mode, config.pan),
            tilt: PiController::new(Axis::Tilt, config.mode, config.tilt),
            actuator,
            shut_down: false,
        })
    }

    pub fn mode(&self) -> ActuatorMode {
        self.mode
    }

    pub fn pan(&self) -> &PiController {
        &self.pan
    }

    pub fn tilt(&self) -> &PiController {
        &self.tilt
    }

    pub fn has_actuator(&self) -> bool {
        self.actuator.is_some()
    }

    /// Run both controllers for one command and drive the actuator.
    ///
    /// Actuator failures are logged, never propagated: a flaky motor must
    /// not stop the tracking loop.
    pub fn apply(&mut self, command: &ControlCommand) -> GimbalMove {
        let step = match *command {
            ControlCommand::Error { err_x, err_y } => GimbalMove {
                pan: self.pan.update(err_x),
                tilt: self.tilt.update(err_y),
            },
            ControlCommand::Directive { pan, tilt } => GimbalMove {
                pan: nudge_or_hold(&mut self.pan, pan.sign()),
                tilt: nudge_or_hold(&mut self.tilt, tilt.sign()),
            },
        };

        debug!(?command, pan = ?step.pan, tilt = ?step.tilt, "gimbal step");
        self.drive(step);
        step
    }

    /// Re-center (servo mode) and release the actuator. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if self.mode == ActuatorMode::Servo {
            let step = GimbalMove {
                pan: self.pan.recenter(),
                tilt: self.tilt.recenter(),
            };
            info!("re-centering servos");
            self.drive(step);
        }

        if let Some(actuator) = self.actuator.as_mut() {
            if let Err(err) = actuator.release() {
                warn!(error = %err, "actuator release failed");
            }
        }
    }

    fn drive(&mut self, step: GimbalMove) {
        let Some(actuator) = self.actuator.as_mut() else {
            return;
        };
        for (axis, command) in [(Axis::Pan, step.pan), (Axis::Tilt, step.tilt)] {
            if let Err(err) = actuator.apply(axis, command) {
                warn!(%axis, error = %err, "actuator command failed");
            }
        }
    }
}

fn nudge_or_hold(controller: &mut PiController, sign: i8) -> AxisCommand {
    if sign == 0 {
        AxisCommand::None
    } else {
        controller.nudge(sign)
    }
}

impl Drop for Gimbal {
    fn drop(&mut self) {
        self.shutdown();
    }
}

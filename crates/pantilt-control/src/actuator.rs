use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::{debug, info};

use crate::axis::Axis;
use crate::error::Result;
use crate::pi::AxisCommand;

/// Physical axis driver.
///
/// Implementations move hardware; the controller only decides how far.
pub trait Actuator {
    /// Move `axis` by a relative number of steps.
    fn step(&mut self, axis: Axis, steps: i32) -> Result<()>;

    /// Move `axis` to an absolute angle in degrees.
    fn set_angle(&mut self, axis: Axis, degrees: f64) -> Result<()>;

    /// Release the hardware (de-energize coils, stop PWM). Called once on
    /// shutdown after any re-centering.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }

    /// Dispatch a controller command.
    fn apply(&mut self, axis: Axis, command: AxisCommand) -> Result<()> {
        match command {
            AxisCommand::None => Ok(()),
            AxisCommand::Step(steps) => self.step(axis, steps),
            AxisCommand::Angle(degrees) => self.set_angle(axis, degrees),
        }
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn step(&mut self, axis: Axis, steps: i32) -> Result<()> {
        (**self).step(axis, steps)
    }

    fn set_angle(&mut self, axis: Axis, degrees: f64) -> Result<()> {
        (**self).set_angle(axis, degrees)
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }
}

/// Actuator that only reports motion through `tracing`.
///
/// Unchanged servo angles are logged at debug level so a holding platform
/// doesn't flood the log.
#[derive(Debug, Default)]
pub struct TracingActuator {
    last_angle: [Option<f64>; 2],
}

impl TracingActuator {
    pub fn new() -> Self {
        Self::default()
    }
}

fn slot(axis: Axis) -> usize {
    match axis {
        Axis::Pan => 0,
        Axis::Tilt => 1,
    }
}

impl Actuator for TracingActuator {
    fn step(&mut self, axis: Axis, steps: i32) -> Result<()> {
        info!(%axis, steps, "step");
        Ok(())
    }

    fn set_angle(&mut self, axis: Axis, degrees: f64) -> Result<()> {
        let last = &mut self.last_angle[slot(axis)];
        if *last == Some(degrees) {
            debug!(%axis, degrees, "angle unchanged");
        } else {
            info!(%axis, degrees = format_args!("{degrees:.2}"), "angle");
            *last = Some(degrees);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        info!("actuators released");
        Ok(())
    }
}

/// Actuator speaking a line-oriented text protocol to a device or file,
/// e.g. a motor-controller board on a serial port:
///
/// ```text
/// pan step -12
/// tilt angle 3.50
/// release
/// ```
pub struct LineActuator<W> {
    out: W,
}

impl LineActuator<File> {
    /// Open an existing device node or file for writing.
    ///
    /// The path is never created: a missing device is an initialization
    /// failure the caller decides how to handle.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().write(true).open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "opened actuator device");
        Ok(Self::new(file))
    }
}

impl<W: Write> LineActuator<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) -> Result<()> {
        self.out.write_fmt(args)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Actuator for LineActuator<W> {
    fn step(&mut self, axis: Axis, steps: i32) -> Result<()> {
        self.line(format_args!("{axis} step {steps}"))
    }

    fn set_angle(&mut self, axis: Axis, degrees: f64) -> Result<()> {
        self.line(format_args!("{axis} angle {degrees:.2}"))
    }

    fn release(&mut self) -> Result<()> {
        self.line(format_args!("release"))
    }
}

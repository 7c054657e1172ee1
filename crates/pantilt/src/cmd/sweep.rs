use std::sync::atomic::Ordering;
use std::thread;

use pantilt_control::{Actuator, ActuatorMode, Axis, AxisConfig, GimbalConfig};
use serde::Serialize;
use tracing::{info, warn};

use crate::cmd::{install_stop_handler, parse_duration, SweepArgs};
use crate::exit::{control_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Debug, Serialize)]
struct SweepSummary {
    mode: ActuatorMode,
    cycles_completed: u32,
    moves: u64,
    interrupted: bool,
}

/// Positions visited by one cycle: center, +max, center, -max.
fn sweep_targets(axis: &AxisConfig, mode: ActuatorMode) -> [f64; 4] {
    let home = axis.rest_position(mode);
    [home, axis.max_position, home, axis.min_position]
}

/// Tracks where each axis is so stepper moves can be issued as deltas.
struct Sweep {
    mode: ActuatorMode,
    position: [f64; 2],
    moves: u64,
}

impl Sweep {
    fn new(mode: ActuatorMode) -> Self {
        Self {
            mode,
            position: [0.0; 2],
            moves: 0,
        }
    }

    fn move_to(&mut self, actuator: &mut dyn Actuator, pan: f64, tilt: f64) -> CliResult<()> {
        for (slot, axis, target) in [(0, Axis::Pan, pan), (1, Axis::Tilt, tilt)] {
            let result = match self.mode {
                ActuatorMode::Servo => actuator.set_angle(axis, target),
                ActuatorMode::Stepper => {
                    let steps = (target - self.position[slot]).round() as i32;
                    if steps == 0 {
                        continue;
                    }
                    actuator.step(axis, steps)
                }
            };
            result.map_err(|err| control_error("actuator failed", err))?;
            self.position[slot] = target;
            self.moves += 1;
        }
        Ok(())
    }
}

pub fn run(args: SweepArgs, format: OutputFormat) -> CliResult<i32> {
    let dwell = parse_duration(&args.dwell)?;
    let config: GimbalConfig = args.control.gimbal_config()?;
    let mut actuator = args
        .control
        .actuator()
        .ok_or_else(|| CliError::new(FAILURE, "actuator unavailable; nothing to sweep"))?;
    let stop = install_stop_handler()?;

    let pan_targets = sweep_targets(&config.pan, config.mode);
    let tilt_targets = sweep_targets(&config.tilt, config.mode);
    let mut sweep = Sweep::new(config.mode);
    let mut completed = 0;

    'cycles: for cycle in 0..args.cycles {
        for (&pan, &tilt) in pan_targets.iter().zip(tilt_targets.iter()) {
            if stop.load(Ordering::SeqCst) {
                warn!(cycle, "sweep interrupted");
                break 'cycles;
            }
            info!(cycle, pan, tilt, "sweep position");
            sweep.move_to(actuator.as_mut(), pan, tilt)?;
            thread::sleep(dwell);
        }
        completed += 1;
    }

    sweep.move_to(
        actuator.as_mut(),
        config.pan.rest_position(config.mode),
        config.tilt.rest_position(config.mode),
    )?;
    actuator
        .release()
        .map_err(|err| control_error("actuator release failed", err))?;

    print_record(
        &SweepSummary {
            mode: config.mode,
            cycles_completed: completed,
            moves: sweep.moves,
            interrupted: completed < args.cycles,
        },
        format,
    );
    Ok(SUCCESS)
}

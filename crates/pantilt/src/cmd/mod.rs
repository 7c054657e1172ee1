use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use pantilt_control::{
    Actuator, ActuatorMode, AxisConfig, Direction, Gimbal, GimbalConfig, LineActuator,
    TracingActuator,
};
use tracing::warn;

use crate::exit::{control_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod relay;
pub mod sensor;
pub mod sweep;
pub mod tuning;
pub mod version;
pub mod worker;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream frames to a detection service and track what it reports.
    Sensor(SensorArgs),
    /// Serve detections over stdin/stdout (spawned by `sensor` or `relay`).
    Worker(WorkerArgs),
    /// Accept a sensor over TCP and answer its frames with control commands.
    Relay(RelayArgs),
    /// Drive both axes through their full range and back to center.
    Sweep(SweepArgs),
    /// Print the effective controller configuration.
    Tuning(TuningArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Sensor(args) => sensor::run(args, format),
        Command::Worker(args) => worker::run(args),
        Command::Relay(args) => relay::run(args, format),
        Command::Sweep(args) => sweep::run(args, format),
        Command::Tuning(args) => tuning::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ModeArg {
    Stepper,
    Servo,
}

impl From<ModeArg> for ActuatorMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Stepper => ActuatorMode::Stepper,
            ModeArg::Servo => ActuatorMode::Servo,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum DirectionArg {
    Normal,
    Inverted,
}

impl From<DirectionArg> for Direction {
    fn from(direction: DirectionArg) -> Self {
        match direction {
            DirectionArg::Normal => Direction::Normal,
            DirectionArg::Inverted => Direction::Inverted,
        }
    }
}

/// Controller tuning shared by every command that drives the gimbal.
///
/// Unset gains and limits fall back to the defaults for `--mode`.
#[derive(Args, Debug, Clone)]
pub struct ControlArgs {
    /// Actuator type.
    #[arg(long, value_enum, default_value = "servo", env = "PANTILT_MODE")]
    pub mode: ModeArg,
    /// Proportional gain (both axes).
    #[arg(long, env = "PANTILT_KP")]
    pub kp: Option<f64>,
    /// Integral gain (both axes).
    #[arg(long, env = "PANTILT_KI")]
    pub ki: Option<f64>,
    /// Anti-windup clamp on the accumulated error, in pixels.
    #[arg(long, env = "PANTILT_MAX_INTEGRAL")]
    pub max_integral: Option<f64>,
    /// Errors smaller than this (pixels) reset the integral.
    #[arg(long, env = "PANTILT_DEADBAND_PX")]
    pub deadband_px: Option<f64>,
    /// Per-cycle output clamp: steps (stepper) or degrees (servo).
    #[arg(long, env = "PANTILT_MAX_OUTPUT")]
    pub max_output: Option<f64>,
    /// Pan position limits as MIN,MAX.
    #[arg(
        long,
        value_name = "MIN,MAX",
        value_parser = parse_limits,
        allow_hyphen_values = true,
        env = "PANTILT_PAN_LIMITS"
    )]
    pub pan_limits: Option<(f64, f64)>,
    /// Tilt position limits as MIN,MAX.
    #[arg(
        long,
        value_name = "MIN,MAX",
        value_parser = parse_limits,
        allow_hyphen_values = true,
        env = "PANTILT_TILT_LIMITS"
    )]
    pub tilt_limits: Option<(f64, f64)>,
    /// Maps image +y onto the tilt actuator.
    #[arg(
        long,
        value_enum,
        default_value = "inverted",
        env = "PANTILT_TILT_DIRECTION"
    )]
    pub tilt_direction: DirectionArg,
    /// Write actuator commands to this device (line protocol). Without it,
    /// motion is only logged.
    #[arg(long, value_name = "PATH", env = "PANTILT_ACTUATOR_DEVICE")]
    pub actuator_device: Option<PathBuf>,
}

impl ControlArgs {
    pub fn gimbal_config(&self) -> CliResult<GimbalConfig> {
        let mut config = GimbalConfig::for_mode(self.mode.into());
        self.apply_gains(&mut config.pan);
        self.apply_gains(&mut config.tilt);
        if let Some((min, max)) = self.pan_limits {
            config.pan.min_position = min;
            config.pan.max_position = max;
        }
        if let Some((min, max)) = self.tilt_limits {
            config.tilt.min_position = min;
            config.tilt.max_position = max;
        }
        config.tilt.direction = self.tilt_direction.into();

        config
            .validate()
            .map_err(|err| control_error("invalid tuning", err))?;
        Ok(config)
    }

    fn apply_gains(&self, axis: &mut AxisConfig) {
        if let Some(kp) = self.kp {
            axis.kp = kp;
        }
        if let Some(ki) = self.ki {
            axis.ki = ki;
        }
        if let Some(max_integral) = self.max_integral {
            axis.max_integral = max_integral;
        }
        if let Some(deadband) = self.deadband_px {
            axis.deadband = deadband;
        }
        if let Some(max_output) = self.max_output {
            axis.max_output = max_output;
        }
    }

    /// Open the configured actuator. A device that cannot be opened leaves
    /// the run motionless rather than failing it.
    pub fn actuator(&self) -> Option<Box<dyn Actuator>> {
        let Some(path) = &self.actuator_device else {
            return Some(Box::new(TracingActuator::new()));
        };
        match LineActuator::open(path) {
            Ok(device) => {
                let device: Box<dyn Actuator> = Box::new(device);
                Some(device)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "actuator unavailable");
                None
            }
        }
    }

    pub fn gimbal(&self) -> CliResult<Gimbal> {
        let config = self.gimbal_config()?;
        Gimbal::new(config, self.actuator()).map_err(|err| control_error("invalid tuning", err))
    }
}

#[derive(Args, Debug)]
pub struct SensorArgs {
    /// Detection service host.
    #[arg(long, default_value = "127.0.0.1", env = "PANTILT_SERVER_ADDRESS")]
    pub server_address: String,
    /// Detection service port.
    #[arg(long, default_value = "5005", env = "PANTILT_SERVER_PORT")]
    pub server_port: u16,
    /// Directory of .jpg/.jpeg frames to stream (replayed in name order).
    #[arg(long, value_name = "DIR", env = "PANTILT_FRAMES")]
    pub frames: PathBuf,
    /// Minimum time between frames (e.g. 33ms, 1s); 0 streams unpaced.
    #[arg(long, default_value = "33ms", env = "PANTILT_FRAME_INTERVAL")]
    pub frame_interval: String,
    /// Stop after one pass over the frame directory.
    #[arg(long)]
    pub once: bool,
    /// Spawn this detection worker and talk to it over stdio instead of
    /// connecting to the network.
    #[arg(long, value_name = "CMD", env = "PANTILT_LOCAL_DETECTOR")]
    pub local_detector: Option<String>,
    /// Reject inbound messages larger than this many bytes.
    #[arg(long, env = "PANTILT_MAX_MESSAGE_BYTES")]
    pub max_message_bytes: Option<usize>,
    /// How long a local detector has to report READY (e.g. 10s).
    #[arg(long, default_value = "10s")]
    pub handshake_timeout: String,
    #[command(flatten)]
    pub control: ControlArgs,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Run inference on every Nth frame.
    #[arg(long, default_value = "15", env = "PANTILT_DETECTION_CADENCE")]
    pub cadence: u32,
    /// JSON-lines file of detection lists to replay, one per inference.
    #[arg(long, value_name = "FILE", env = "PANTILT_REPLAY")]
    pub replay: Option<PathBuf>,
    /// Only report detections with this label (repeatable).
    #[arg(long = "label", value_name = "LABEL")]
    pub labels: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Address to accept sensors on.
    #[arg(long, default_value = "0.0.0.0:5005", env = "PANTILT_LISTEN")]
    pub listen: String,
    /// Detection worker command line, spawned once per sensor session.
    #[arg(long, value_name = "CMD", env = "PANTILT_WORKER")]
    pub worker: String,
    /// Bound on the worker's READY and on each detection request.
    #[arg(long, default_value = "10s")]
    pub request_timeout: String,
    /// Reject inbound frames larger than this many bytes.
    #[arg(long, env = "PANTILT_MAX_MESSAGE_BYTES")]
    pub max_message_bytes: Option<usize>,
    /// Exit after the first sensor session.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Number of center, max, center, min passes.
    #[arg(long, default_value = "1")]
    pub cycles: u32,
    /// Pause at each position (e.g. 500ms).
    #[arg(long, default_value = "500ms")]
    pub dwell: String,
    #[command(flatten)]
    pub control: ControlArgs,
}

#[derive(Args, Debug)]
pub struct TuningArgs {
    #[command(flatten)]
    pub control: ControlArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// A positive duration such as `150ms`, `2s` or `3` (seconds).
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let duration = parse_interval(input)?;
    if duration.is_zero() {
        return Err(CliError::usage("duration must be greater than zero"));
    }
    Ok(duration)
}

/// Like [`parse_duration`], but `0` is allowed and means "no delay".
pub fn parse_interval(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

fn parse_limits(input: &str) -> Result<(f64, f64), String> {
    let (min, max) = input
        .split_once(',')
        .ok_or_else(|| format!("expected MIN,MAX, got '{input}'"))?;
    let min: f64 = min
        .trim()
        .parse()
        .map_err(|_| format!("invalid minimum '{}'", min.trim()))?;
    let max: f64 = max
        .trim()
        .parse()
        .map_err(|_| format!("invalid maximum '{}'", max.trim()))?;
    if min > max {
        return Err(format!("minimum {min} is above maximum {max}"));
    }
    Ok((min, max))
}

/// Stop flag raised by Ctrl-C (SIGINT).
pub fn install_stop_handler() -> CliResult<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(stop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert!(parse_duration("0ms").is_err());
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn intervals_allow_zero() {
        assert_eq!(parse_interval("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_interval("0ms").unwrap(), Duration::ZERO);
        assert_eq!(parse_interval("33ms").unwrap(), Duration::from_millis(33));
        assert!(parse_interval("-1").is_err());
    }

    #[test]
    fn limits() {
        assert_eq!(parse_limits("-45,45").unwrap(), (-45.0, 45.0));
        assert_eq!(parse_limits(" -10.5 , 3 ").unwrap(), (-10.5, 3.0));
        assert!(parse_limits("45").is_err());
        assert!(parse_limits("10,-10").is_err());
    }
}

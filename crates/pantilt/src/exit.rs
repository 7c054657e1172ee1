use std::fmt;
use std::io;

use pantilt_control::ControlError;
use pantilt_detect::DetectError;
use pantilt_frame::FrameError;
use pantilt_sensor::SensorError;
use pantilt_transport::TransportError;

// sysexits-style codes, plus the `timeout(1)` convention for 124/125.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const NO_INPUT: i32 = 66;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => NO_INPUT,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::EmptyCommand => CliError::usage(format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn control_error(context: &str, err: ControlError) -> CliError {
    match err {
        ControlError::InvalidConfig { .. } => CliError::usage(format!("{context}: {err}")),
        ControlError::Malformed(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ControlError::Actuator(source) => io_error(context, source),
    }
}

pub fn detect_error(context: &str, err: DetectError) -> CliError {
    match err {
        DetectError::Transport(err) => transport_error(context, err),
        DetectError::Frame(err) => frame_error(context, err),
        DetectError::Io(err) => io_error(context, err),
        DetectError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        DetectError::InvalidCadence(_) => CliError::usage(format!("{context}: {err}")),
        DetectError::Json(_) | DetectError::HandshakeFailed(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        DetectError::Disconnected(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        DetectError::Detector(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn sensor_error(context: &str, err: SensorError) -> CliError {
    match err {
        SensorError::Transport(err) => transport_error(context, err),
        SensorError::Frame(err) => frame_error(context, err),
        SensorError::Detect(err) => detect_error(context, err),
        SensorError::Control(err) => control_error(context, err),
        SensorError::Capture { path, source } => {
            io_error(&format!("{context}: {}", path.display()), source)
        }
        SensorError::NoFrames(_) => CliError::new(NO_INPUT, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn refused_connect_is_plain_failure() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(sensor_error("connect", SensorError::Transport(err)).code, FAILURE);
    }

    #[test]
    fn handshake_timeout_maps_to_124() {
        let err = DetectError::Timeout(Duration::from_secs(1));
        assert_eq!(detect_error("handshake", err).code, TIMEOUT);
    }

    #[test]
    fn bad_tuning_is_usage() {
        let err = ControlError::InvalidConfig {
            axis: "pan",
            reason: "limits are reversed".to_string(),
        };
        let cli = control_error("config", err);
        assert_eq!(cli.code, USAGE);
        assert!(cli.message.contains("limits are reversed"));
    }

    #[test]
    fn missing_frames_is_no_input() {
        let err = SensorError::NoFrames("/tmp/empty".into());
        assert_eq!(sensor_error("capture", err).code, NO_INPUT);
    }
}

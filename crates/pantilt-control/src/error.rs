/// Errors raised by configuration, command decoding, or actuators.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Tuning or limit values are inconsistent.
    #[error("invalid {axis} axis config: {reason}")]
    InvalidConfig { axis: &'static str, reason: String },

    /// A control payload could not be decoded at all.
    #[error("malformed control payload: {0}")]
    Malformed(String),

    /// The actuator driver failed to apply a command.
    #[error("actuator error: {0}")]
    Actuator(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ControlError>;

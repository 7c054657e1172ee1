use serde_json::{Map, Value};

use crate::error::{ControlError, Result};

/// Symbolic pan instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PanDirective {
    #[default]
    Hold,
    Left,
    Right,
}

/// Symbolic tilt instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TiltDirective {
    #[default]
    Hold,
    Up,
    Down,
}

impl PanDirective {
    fn parse(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str).map(str::to_ascii_uppercase) {
            Some(s) if s == "LEFT" => Self::Left,
            Some(s) if s == "RIGHT" => Self::Right,
            _ => Self::Hold,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hold => "HOLD",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }

    /// Actuator-coordinate sign (`RIGHT` is positive).
    pub fn sign(self) -> i8 {
        match self {
            Self::Hold => 0,
            Self::Left => -1,
            Self::Right => 1,
        }
    }
}

impl TiltDirective {
    fn parse(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str).map(str::to_ascii_uppercase) {
            Some(s) if s == "UP" => Self::Up,
            Some(s) if s == "DOWN" => Self::Down,
            _ => Self::Hold,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hold => "HOLD",
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }

    /// Actuator-coordinate sign (`UP` is positive).
    pub fn sign(self) -> i8 {
        match self {
            Self::Hold => 0,
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

/// An inbound control message.
///
/// Both wire shapes are accepted:
/// - directives: `{"pan": "LEFT", "tilt": "HOLD"}`
/// - pixel offsets of the target from center: `{"err_x": 50, "err_y": -3}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Directive {
        pan: PanDirective,
        tilt: TiltDirective,
    },
    Error {
        err_x: i32,
        err_y: i32,
    },
}

impl ControlCommand {
    /// Error-pair command.
    pub fn error(err_x: i32, err_y: i32) -> Self {
        Self::Error { err_x, err_y }
    }

    /// Hold both axes.
    pub fn hold() -> Self {
        Self::Directive {
            pan: PanDirective::Hold,
            tilt: TiltDirective::Hold,
        }
    }

    /// Decode a JSON control payload.
    ///
    /// Only a payload that is not a JSON object fails. Unknown fields are
    /// ignored; a present-but-unusable `err_x`/`err_y` reads as zero, and an
    /// unrecognized directive reads as `HOLD`.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|err| ControlError::Malformed(err.to_string()))?;
        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(ControlError::Malformed(format!(
                    "expected a JSON object, got {}",
                    json_type(&other)
                )))
            }
        };
        Ok(Self::from_fields(&fields))
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        if fields.contains_key("err_x") || fields.contains_key("err_y") {
            return Self::Error {
                err_x: error_field(fields.get("err_x")),
                err_y: error_field(fields.get("err_y")),
            };
        }
        Self::Directive {
            pan: PanDirective::parse(fields.get("pan")),
            tilt: TiltDirective::parse(fields.get("tilt")),
        }
    }

    /// Encode for the wire.
    pub fn to_json(&self) -> Vec<u8> {
        let value = match *self {
            Self::Directive { pan, tilt } => serde_json::json!({
                "pan": pan.as_str(),
                "tilt": tilt.as_str(),
            }),
            Self::Error { err_x, err_y } => serde_json::json!({
                "err_x": err_x,
                "err_y": err_y,
            }),
        };
        value.to_string().into_bytes()
    }

    /// True when the command cannot cause motion.
    pub fn is_hold(&self) -> bool {
        matches!(
            self,
            Self::Directive {
                pan: PanDirective::Hold,
                tilt: TiltDirective::Hold
            }
        )
    }
}

/// Missing, null, non-numeric → 0. Floats truncate, out-of-range saturates.
fn error_field(value: Option<&Value>) -> i32 {
    match value {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
            } else if let Some(f) = n.as_f64() {
                // `as` saturates and maps NaN to 0.
                f as i32
            } else {
                0
            }
        }
        _ => 0,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

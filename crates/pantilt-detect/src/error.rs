use std::time::Duration;

/// Errors that can occur on the detection link.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// Transport-level error (spawn, connect).
    #[error("transport error: {0}")]
    Transport(#[from] pantilt_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pantilt_frame::FrameError),

    /// The worker did not announce itself correctly.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The worker went away.
    #[error("worker disconnected: {0}")]
    Disconnected(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cadence must be at least one frame.
    #[error("detection cadence must be >= 1 (got {0})")]
    InvalidCadence(u32),

    /// The detector itself failed on a frame.
    #[error("detector failed: {0}")]
    Detector(String),

    /// An I/O error outside framing (e.g. reading a replay script).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, DetectError>;

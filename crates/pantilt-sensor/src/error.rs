use std::path::PathBuf;

/// Errors that can occur before or while streaming.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// Transport-level error (connect, spawn).
    #[error("transport error: {0}")]
    Transport(#[from] pantilt_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pantilt_frame::FrameError),

    /// Detection worker error (handshake).
    #[error("detection error: {0}")]
    Detect(#[from] pantilt_detect::DetectError),

    /// Controller configuration error.
    #[error("control error: {0}")]
    Control(#[from] pantilt_control::ControlError),

    /// The capture source could not be opened or read.
    #[error("capture error at {path}: {source}")]
    Capture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The capture directory holds no usable images.
    #[error("no .jpg/.jpeg frames in {0}")]
    NoFrames(PathBuf),
}

pub type Result<T> = std::result::Result<T, SensorError>;

//! Detection bridge: talk to an object-detection worker over a framed
//! duplex stream.
//!
//! The worker announces itself with a `READY` message, then answers every
//! frame it receives with a JSON list of detections. Inference only runs
//! every `cadence` frames; the frames in between get the previous answer.

pub mod bridge;
pub mod detection;
pub mod error;
pub mod handshake;
pub mod remote;
pub mod replay;
pub mod worker;

pub use bridge::{BridgeConfig, DetectionBridge, Detector};
pub use detection::{decode_detections, encode_detections, Detection};
pub use error::{DetectError, Result};
pub use handshake::{await_ready, send_ready, READY};
pub use remote::RemoteDetector;
pub use replay::ReplayDetector;
pub use worker::{serve, WorkerStats};

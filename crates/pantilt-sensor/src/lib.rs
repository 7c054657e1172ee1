//! Sensor node: capture frames, stream them to the detection side, and turn
//! whatever comes back into pan/tilt motion.
//!
//! One thread, one connection. The only place the loop ever waits is the
//! optional frame pacing in the capture source; the socket is always
//! checked with a zero timeout.

pub mod capture;
pub mod dispatch;
pub mod error;
pub mod link;

pub use capture::{DirectorySource, FrameSource};
pub use dispatch::{InboundRoute, LoopState, Outcome, SensorLoop, SensorReport, SensorStats};
pub use error::{Result, SensorError};
pub use link::{open_link, LinkConfig, LinkTarget};

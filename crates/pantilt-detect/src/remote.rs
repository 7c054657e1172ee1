use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use pantilt_frame::{Channel, FrameError};
use pantilt_transport::{ChildPipe, DuplexStream, Readiness};
use tracing::{debug, info};

use crate::bridge::Detector;
use crate::detection::{decode_detections, Detection};
use crate::error::{DetectError, Result};
use crate::handshake::{await_ready, recv_within};

/// Default bound on the handshake and on each request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client side of the detection protocol.
///
/// Each [`detect`](Detector::detect) call sends one frame and blocks until
/// the worker's detection list arrives or `timeout` elapses.
pub struct RemoteDetector<T> {
    channel: Channel<T>,
    timeout: Duration,
}

impl RemoteDetector<DuplexStream> {
    /// Spawn a worker process and wait for its `READY`.
    pub fn spawn(command_line: &str, timeout: Duration) -> Result<Self> {
        let pipe = ChildPipe::spawn(command_line)?;
        info!(pid = pipe.id(), program = pipe.program(), "spawned detection worker");
        Self::connect(Channel::new(DuplexStream::from_child(pipe)), timeout)
    }
}

impl<T: Read + Write + Readiness> RemoteDetector<T> {
    /// Take over a channel whose peer has not yet sent `READY`.
    pub fn connect(mut channel: Channel<T>, timeout: Duration) -> Result<Self> {
        await_ready(&mut channel, timeout)?;
        Ok(Self { channel, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn into_channel(self) -> Channel<T> {
        self.channel
    }
}

impl<T: Read + Write + Readiness> Detector for RemoteDetector<T> {
    fn detect(&mut self, frame: &[u8]) -> Result<Vec<Detection>> {
        match self.channel.send_within(frame, self.timeout) {
            Ok(()) => {}
            Err(FrameError::Io(err)) if err.kind() == ErrorKind::TimedOut => {
                return Err(DetectError::Timeout(self.timeout));
            }
            Err(err) => return Err(err.into()),
        }
        let reply = recv_within(&mut self.channel, self.timeout, "detection request")?;
        let detections = decode_detections(&reply)?;
        debug!(
            frame_bytes = frame.len(),
            detections = detections.len(),
            "worker replied"
        );
        Ok(detections)
    }
}

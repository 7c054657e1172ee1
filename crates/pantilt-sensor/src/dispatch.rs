use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pantilt_control::{ControlCommand, Gimbal};
use pantilt_detect::decode_detections;
use pantilt_frame::{Channel, Fill, FrameError, SendOutcome};
use pantilt_transport::Readiness;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::capture::FrameSource;

/// What inbound messages carry on this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundRoute {
    /// JSON control commands (`pan`/`tilt` or `err_x`/`err_y`).
    Commands,
    /// JSON detection lists; the first detection becomes an error command.
    Detections,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Connecting,
    Streaming,
    Closing,
    Faulted,
}

/// Why streaming ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// The stop flag was raised.
    Stopped,
    /// The peer closed the connection.
    PeerClosed,
    /// The frame source ran out.
    SourceEnded,
    /// Framing or I/O broke; the link cannot be trusted any more.
    Faulted(String),
}

impl Outcome {
    pub fn final_state(&self) -> LoopState {
        match self {
            Self::Faulted(_) => LoopState::Faulted,
            _ => LoopState::Closing,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SensorStats {
    pub frames_captured: u64,
    pub frames_sent: u64,
    /// Sends that left a tail for the next cycle (counted in `frames_sent`).
    pub frames_partial: u64,
    pub frames_dropped: u64,
    pub messages_received: u64,
    pub messages_malformed: u64,
    pub commands_applied: u64,
}

/// How a run ended, plus counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReport {
    pub outcome: Outcome,
    pub state: LoopState,
    pub stats: SensorStats,
}

/// The sensor's cooperative dispatch loop.
///
/// Each cycle captures one frame, offers it to the link without waiting,
/// then checks the link with a zero timeout and dispatches every complete
/// inbound message. The loop owns capture, link and gimbal; all three are
/// released when [`run`](Self::run) returns, servos re-centered first.
pub struct SensorLoop<S, T> {
    source: S,
    channel: Channel<T>,
    gimbal: Gimbal,
    route: InboundRoute,
    stop: Arc<AtomicBool>,
    stats: SensorStats,
}

impl<S, T> SensorLoop<S, T>
where
    S: FrameSource,
    T: Read + Write + Readiness,
{
    /// `channel` must already be connected and non-blocking.
    pub fn new(
        source: S,
        channel: Channel<T>,
        gimbal: Gimbal,
        route: InboundRoute,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            channel,
            gimbal,
            route,
            stop,
            stats: SensorStats::default(),
        }
    }

    /// Stream until stopped, disconnected, exhausted or faulted.
    pub fn run(mut self) -> SensorReport {
        info!(route = ?self.route, mode = %self.gimbal.mode().as_str(), "streaming");
        let outcome = self.stream();
        self.close(outcome)
    }

    fn stream(&mut self) -> Outcome {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return Outcome::Stopped;
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Outcome::SourceEnded,
                Err(err) => return Outcome::Faulted(err.to_string()),
            };
            self.stats.frames_captured += 1;

            let peer_gone = match self.send_frame(&frame) {
                Ok(()) => false,
                Err(err) if is_disconnect(&err) => true,
                Err(err) => return Outcome::Faulted(err.to_string()),
            };

            if peer_gone {
                // Whatever the peer sent before hanging up is still applied.
                return match self.drain_to_eof() {
                    Ok(()) => Outcome::PeerClosed,
                    Err(err) => Outcome::Faulted(err.to_string()),
                };
            }

            match self.receive() {
                Ok(true) => {}
                Ok(false) => return Outcome::PeerClosed,
                Err(err) if is_disconnect(&err) => return Outcome::PeerClosed,
                Err(err) => return Outcome::Faulted(err.to_string()),
            }
        }
    }

    fn send_frame(&mut self, frame: &Bytes) -> Result<(), FrameError> {
        match self.channel.try_send(frame)? {
            SendOutcome::Sent => self.stats.frames_sent += 1,
            SendOutcome::Partial => {
                self.stats.frames_sent += 1;
                self.stats.frames_partial += 1;
            }
            SendOutcome::Dropped => {
                self.stats.frames_dropped += 1;
                trace!(frame_bytes = frame.len(), "send buffer full, frame dropped");
            }
        }
        Ok(())
    }

    /// One zero-timeout check and at most one read. `Ok(false)` means the
    /// peer closed its side.
    fn receive(&mut self) -> Result<bool, FrameError> {
        if !self.channel.poll_readable(Duration::ZERO)? {
            return Ok(true);
        }
        match self.channel.fill()? {
            Fill::Data(n) => {
                trace!(bytes = n, "read from link");
                self.dispatch_buffered()?;
                Ok(true)
            }
            Fill::Idle => Ok(true),
            Fill::Closed => {
                self.dispatch_buffered()?;
                Ok(false)
            }
        }
    }

    fn drain_to_eof(&mut self) -> Result<(), FrameError> {
        loop {
            match self.channel.fill() {
                Ok(Fill::Data(_)) => self.dispatch_buffered()?,
                Ok(Fill::Idle) | Ok(Fill::Closed) => break,
                Err(err) if is_disconnect(&err) => break,
                Err(err) => return Err(err),
            }
        }
        self.dispatch_buffered()
    }

    fn dispatch_buffered(&mut self) -> Result<(), FrameError> {
        while let Some(message) = self.channel.try_recv()? {
            self.stats.messages_received += 1;
            self.dispatch(&message);
        }
        Ok(())
    }

    fn dispatch(&mut self, payload: &[u8]) {
        let command = match self.route {
            InboundRoute::Commands => match ControlCommand::parse(payload) {
                Ok(command) => command,
                Err(err) => {
                    self.stats.messages_malformed += 1;
                    warn!(
                        error = %err,
                        payload_bytes = payload.len(),
                        "discarding control message"
                    );
                    return;
                }
            },
            InboundRoute::Detections => match decode_detections(payload) {
                Ok(detections) => match detections.first() {
                    Some(target) => {
                        debug!(
                            label = %target.label,
                            err_x = target.err_x,
                            err_y = target.err_y,
                            "tracking"
                        );
                        ControlCommand::error(target.err_x, target.err_y)
                    }
                    None => {
                        trace!("no detection, holding");
                        return;
                    }
                },
                Err(err) => {
                    self.stats.messages_malformed += 1;
                    warn!(
                        error = %err,
                        payload_bytes = payload.len(),
                        "discarding detection message"
                    );
                    return;
                }
            },
        };

        self.gimbal.apply(&command);
        self.stats.commands_applied += 1;
    }

    fn close(mut self, outcome: Outcome) -> SensorReport {
        let state = outcome.final_state();
        match &outcome {
            Outcome::Faulted(reason) => warn!(%reason, "link faulted"),
            other => info!(outcome = ?other, "closing"),
        }

        self.gimbal.shutdown();
        if let Err(err) = self.channel.flush() {
            debug!(error = %err, "flush on close failed");
        }

        let stats = self.stats;
        info!(
            frames_captured = stats.frames_captured,
            frames_sent = stats.frames_sent,
            frames_dropped = stats.frames_dropped,
            messages_received = stats.messages_received,
            commands_applied = stats.commands_applied,
            "sensor stopped"
        );
        SensorReport {
            outcome,
            state,
            stats,
        }
    }
}

fn is_disconnect(err: &FrameError) -> bool {
    match err {
        FrameError::ConnectionClosed => true,
        FrameError::Io(io) => matches!(
            io.kind(),
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}

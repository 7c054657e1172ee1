use std::time::Duration;

use pantilt_detect::await_ready;
use pantilt_frame::{Channel, MAX_WIRE_PAYLOAD};
use pantilt_transport::{tcp, ChildPipe, DuplexStream};
use tracing::info;

use crate::dispatch::InboundRoute;
use crate::error::Result;

/// Where the sensor sends its frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// A remote detection service; it answers with control commands.
    Tcp { host: String, port: u16 },
    /// A detection worker spawned locally and spoken to over its stdio; it
    /// answers with detection lists.
    LocalDetector { command: String },
}

impl LinkTarget {
    /// What inbound messages on this link carry.
    pub fn route(&self) -> InboundRoute {
        match self {
            Self::Tcp { .. } => InboundRoute::Commands,
            Self::LocalDetector { .. } => InboundRoute::Detections,
        }
    }
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub target: LinkTarget,
    /// Largest inbound message accepted; a longer length prefix faults the
    /// link.
    pub max_message_bytes: usize,
    /// How long a local worker has to send `READY`.
    pub handshake_timeout: Duration,
}

impl LinkConfig {
    pub fn new(target: LinkTarget) -> Self {
        Self {
            target,
            max_message_bytes: MAX_WIRE_PAYLOAD,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Establish the link and put it in non-blocking mode.
///
/// This is the whole of the `Connecting` state: a failure here is final and
/// never retried.
pub fn open_link(config: &LinkConfig) -> Result<Channel<DuplexStream>> {
    let channel = match &config.target {
        LinkTarget::Tcp { host, port } => {
            let stream = tcp::connect(host, *port)?;
            info!(peer = %stream.peer_label(), "connected to detection service");
            Channel::with_max_payload(stream, config.max_message_bytes)
        }
        LinkTarget::LocalDetector { command } => {
            let pipe = ChildPipe::spawn(command)?;
            info!(pid = pipe.id(), program = pipe.program(), "spawned local detector");
            let mut channel = Channel::with_max_payload(
                DuplexStream::from_child(pipe),
                config.max_message_bytes,
            );
            await_ready(&mut channel, config.handshake_timeout)?;
            channel
        }
    };

    channel.get_ref().set_nonblocking(true)?;
    Ok(channel)
}

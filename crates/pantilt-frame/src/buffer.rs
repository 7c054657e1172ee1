use bytes::{Bytes, BytesMut};

use crate::codec::{decode, MAX_WIRE_PAYLOAD};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Per-connection receive buffer.
///
/// Bytes are appended with [`feed`](Self::feed) in whatever chunks the
/// transport delivers; complete messages are pulled out with
/// [`try_extract`](Self::try_extract). After every extraction the buffer
/// holds either nothing or the prefix of a message still in flight.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    max_payload: usize,
}

impl FrameBuffer {
    /// Buffer accepting any payload the length field can express.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_WIRE_PAYLOAD)
    }

    /// Buffer that rejects length prefixes above `max_payload`.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_payload,
        }
    }

    /// Append received bytes.
    pub fn feed(&mut self, received: &[u8]) {
        self.buf.extend_from_slice(received);
    }

    /// Pull the next complete message, if one is fully buffered.
    ///
    /// Call in a loop after each `feed`: one read may carry several messages.
    /// Fails only when a length prefix exceeds the configured maximum, which
    /// means the stream can no longer be trusted.
    pub fn try_extract(&mut self) -> Result<Option<Bytes>> {
        decode(&mut self.buf, self.max_payload)
    }

    /// Number of buffered, not yet extracted bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Configured payload ceiling.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Drop everything buffered (used when a connection is reset).
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

//! Length-prefixed message framing for the pan/tilt link.
//!
//! Every message on the wire is:
//! - A 4-byte big-endian unsigned payload length
//! - The payload itself
//!
//! Video frames, control commands, detection lists and the worker handshake
//! all share this format. Callers never see a partially received message.

pub mod buffer;
pub mod channel;
pub mod codec;
pub mod error;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
pub use buffer::FrameBuffer;
pub use channel::{Channel, Fill, SendOutcome};
pub use codec::{encode, encode_into, peek_length, MAX_WIRE_PAYLOAD, PREFIX_SIZE};
pub use error::{FrameError, Result};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Length prefix: 4-byte big-endian unsigned.
pub const PREFIX_SIZE: usize = 4;

/// Largest payload the length field can describe.
pub const MAX_WIRE_PAYLOAD: usize = u32::MAX as usize;

/// Encode a payload into a freshly allocated wire message.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────┐
/// │ Length (4B BE)   │ Payload          │
/// │ unsigned         │ (Length bytes)   │
/// └──────────────────┴──────────────────┘
/// ```
pub fn encode(payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    encode_into(payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Append one framed message to `dst`.
pub fn encode_into(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_WIRE_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_WIRE_PAYLOAD,
        });
    }
    dst.reserve(PREFIX_SIZE + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Read the length prefix without consuming anything.
///
/// Returns `None` while fewer than [`PREFIX_SIZE`] bytes are available.
pub fn peek_length(src: &[u8]) -> Option<usize> {
    let prefix: [u8; PREFIX_SIZE] = src.get(..PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

/// Decode one message from the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete message yet, in
/// which case `src` is left untouched. On success exactly
/// `PREFIX_SIZE + length` bytes are consumed.
pub fn decode(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    let Some(payload_len) = peek_length(src) else {
        return Ok(None); // Need more data
    };

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < PREFIX_SIZE + payload_len {
        return Ok(None); // Need more data
    }

    src.advance(PREFIX_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

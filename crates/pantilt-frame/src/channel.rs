use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use pantilt_transport::Readiness;
use tracing::trace;

use crate::buffer::FrameBuffer;
use crate::codec::encode_into;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Result of a best-effort, non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The whole message reached the transport.
    Sent,
    /// Part of the message was accepted; the rest goes out first on the
    /// next send so the stream stays framed.
    Partial,
    /// The transport accepted nothing and the message was discarded.
    Dropped,
}

/// Result of one non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// This many bytes were appended to the receive buffer.
    Data(usize),
    /// Nothing available right now.
    Idle,
    /// The peer closed its side (zero-byte read).
    Closed,
}

/// A framed duplex channel over any `Read + Write` stream.
///
/// Owns the stream, the [`FrameBuffer`] for inbound bytes, and the outbound
/// tail of a partially written message.
#[derive(Debug)]
pub struct Channel<T> {
    inner: T,
    rx: FrameBuffer,
    tx: BytesMut,
}

impl<T: Read + Write> Channel<T> {
    /// Create a channel accepting any payload size the wire can express.
    pub fn new(inner: T) -> Self {
        Self::with_rx_buffer(inner, FrameBuffer::new())
    }

    /// Create a channel rejecting inbound messages above `max_payload`.
    pub fn with_max_payload(inner: T, max_payload: usize) -> Self {
        Self::with_rx_buffer(inner, FrameBuffer::with_max_payload(max_payload))
    }

    fn with_rx_buffer(inner: T, rx: FrameBuffer) -> Self {
        Self {
            inner,
            rx,
            tx: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode and send a payload, blocking until it is fully written.
    ///
    /// Meant for blocking streams. On a non-blocking stream a full send
    /// buffer fails with `WouldBlock` and the unwritten tail stays queued;
    /// use [`send_within`](Self::send_within) there instead.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        encode_into(payload, &mut self.tx)?;
        while !self.tx.is_empty() {
            self.write_some()?;
        }
        self.flush()
    }

    /// One `write` of the queued bytes, retrying on `Interrupted`.
    fn write_some(&mut self) -> Result<()> {
        loop {
            match self.inner.write(&self.tx) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.tx.advance(n);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Encode and send a payload without ever waiting on the transport.
    ///
    /// A full send buffer drops the message. A message that was partially
    /// accepted is completed ahead of the next one; while such a tail is
    /// still pending, new messages are dropped.
    pub fn try_send(&mut self, payload: &[u8]) -> Result<SendOutcome> {
        if !self.tx.is_empty() {
            self.write_pending()?;
            if !self.tx.is_empty() {
                return Ok(SendOutcome::Dropped);
            }
        }

        encode_into(payload, &mut self.tx)?;
        let total = self.tx.len();
        let written = self.write_pending()?;

        if written == 0 {
            self.tx.clear();
            return Ok(SendOutcome::Dropped);
        }
        if written < total {
            trace!(written, total, "partial write, tail pending");
            return Ok(SendOutcome::Partial);
        }
        Ok(SendOutcome::Sent)
    }

    /// Bytes of a partially written message still waiting for the transport.
    pub fn pending_tx(&self) -> usize {
        self.tx.len()
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn recv(&mut self) -> Result<Bytes> {
        loop {
            if let Some(message) = self.rx.try_extract()? {
                return Ok(message);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.rx.feed(&chunk[..read]);
        }
    }

    /// Perform one read and append whatever arrived to the receive buffer.
    ///
    /// On a non-blocking stream this never waits: no data maps to
    /// [`Fill::Idle`].
    pub fn fill(&mut self) -> Result<Fill> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match self.inner.read(&mut chunk) {
            Ok(0) => Ok(Fill::Closed),
            Ok(n) => {
                self.rx.feed(&chunk[..n]);
                Ok(Fill::Data(n))
            }
            Err(err)
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::Interrupted =>
            {
                Ok(Fill::Idle)
            }
            Err(err) => Err(FrameError::Io(err)),
        }
    }

    /// Pull the next fully buffered message without touching the stream.
    pub fn try_recv(&mut self) -> Result<Option<Bytes>> {
        self.rx.try_extract()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn write_pending(&mut self) -> Result<usize> {
        let mut written = 0usize;
        while !self.tx.is_empty() {
            match self.inner.write(&self.tx) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.tx.advance(n);
                    written += n;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        if self.tx.is_empty() {
            match self.inner.flush() {
                Ok(()) => {}
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(written)
    }

    /// Inbound bytes buffered but not yet extracted.
    pub fn buffered_rx(&self) -> usize {
        self.rx.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the channel and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Readiness> Channel<T> {
    /// Readiness check on the underlying stream; `Duration::ZERO` polls.
    pub fn poll_readable(&self, timeout: Duration) -> Result<bool> {
        Ok(self.inner.poll_readable(timeout)?)
    }
}

impl<T: Read + Write + Readiness> Channel<T> {
    /// Send a payload on a blocking or non-blocking stream, sleeping in
    /// `poll` while the send buffer is full.
    ///
    /// Fails with `ErrorKind::TimedOut` once `timeout` passes; whatever was
    /// not written stays queued ahead of the next message.
    pub fn send_within(&mut self, payload: &[u8], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        encode_into(payload, &mut self.tx)?;

        while !self.tx.is_empty() {
            match self.write_some() {
                Ok(()) => {}
                Err(FrameError::Io(err)) if err.kind() == ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(FrameError::Io(ErrorKind::TimedOut.into()));
                    }
                    self.inner.poll_writable(deadline - now)?;
                }
                Err(err) => return Err(err),
            }
        }
        self.flush()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{encode, PREFIX_SIZE};

    /// Scripted duplex stream: reads come from `input`, writes land in
    /// `output` subject to a per-call and total byte budget.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
        write_budget: usize,
        would_block_reads: bool,
    }

    impl ScriptedStream {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
                write_budget: usize::MAX,
                would_block_reads: false,
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.would_block_reads {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.write_budget == 0 {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            let n = buf.len().min(self.write_budget);
            self.write_budget -= n;
            self.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn send_then_recv_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut tx = Channel::new(left);
        let mut rx = Channel::new(right);

        tx.send(b"ping").unwrap();
        tx.send(b"").unwrap();
        tx.send(b"pong").unwrap();

        assert_eq!(rx.recv().unwrap().as_ref(), b"ping");
        assert_eq!(rx.recv().unwrap().as_ref(), b"");
        assert_eq!(rx.recv().unwrap().as_ref(), b"pong");
    }

    #[test]
    fn recv_reports_closed_on_eof() {
        let mut channel = Channel::new(ScriptedStream::new(Vec::new()));
        assert!(matches!(
            channel.recv().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn recv_mid_message_eof_is_closed() {
        let wire = encode(b"truncated").unwrap();
        let stream = ScriptedStream::new(wire[..PREFIX_SIZE + 2].to_vec());
        let mut channel = Channel::new(stream);
        assert!(matches!(
            channel.recv().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn try_send_full_buffer_drops_message() {
        let mut stream = ScriptedStream::new(Vec::new());
        stream.write_budget = 0;
        let mut channel = Channel::new(stream);

        assert_eq!(channel.try_send(b"frame").unwrap(), SendOutcome::Dropped);
        assert_eq!(channel.pending_tx(), 0);
        assert!(channel.get_ref().output.is_empty());
    }

    #[test]
    fn try_send_partial_completes_before_next_message() {
        let mut stream = ScriptedStream::new(Vec::new());
        stream.write_budget = PREFIX_SIZE + 2;
        let mut channel = Channel::new(stream);

        assert_eq!(channel.try_send(b"first").unwrap(), SendOutcome::Partial);
        assert_eq!(channel.pending_tx(), 3);

        // Still congested: the tail stays queued and the new frame is dropped.
        assert_eq!(channel.try_send(b"skipped").unwrap(), SendOutcome::Dropped);

        channel.get_mut().write_budget = usize::MAX;
        assert_eq!(channel.try_send(b"second").unwrap(), SendOutcome::Sent);

        let mut reader = crate::buffer::FrameBuffer::new();
        reader.feed(&channel.get_ref().output);
        assert_eq!(reader.try_extract().unwrap().unwrap().as_ref(), b"first");
        assert_eq!(reader.try_extract().unwrap().unwrap().as_ref(), b"second");
        assert!(reader.is_empty());
    }

    #[test]
    fn fill_idle_on_would_block() {
        let mut stream = ScriptedStream::new(Vec::new());
        stream.would_block_reads = true;
        let mut channel = Channel::new(stream);

        assert_eq!(channel.fill().unwrap(), Fill::Idle);
        assert_eq!(channel.buffered_rx(), 0);
    }

    #[test]
    fn fill_then_drain_multiple_messages() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode(b"a").unwrap());
        wire.extend_from_slice(&encode(b"bb").unwrap());
        let mut channel = Channel::new(ScriptedStream::new(wire));

        assert_eq!(channel.fill().unwrap(), Fill::Data(PREFIX_SIZE * 2 + 3));
        assert_eq!(channel.try_recv().unwrap().unwrap().as_ref(), b"a");
        assert_eq!(channel.try_recv().unwrap().unwrap().as_ref(), b"bb");
        assert!(channel.try_recv().unwrap().is_none());
        assert_eq!(channel.fill().unwrap(), Fill::Closed);
    }

    #[test]
    fn oversized_inbound_message_is_an_error() {
        let wire = encode(&[1u8; 64]).unwrap();
        let mut channel = Channel::with_max_payload(ScriptedStream::new(wire.to_vec()), 8);
        channel.fill().unwrap();
        assert!(matches!(
            channel.try_recv().unwrap_err(),
            FrameError::PayloadTooLarge { .. }
        ));
    }

    #[test]
    fn poll_readable_on_duplex_stream() {
        let (left, right) = pantilt_transport::DuplexStream::pair().unwrap();
        let mut tx = Channel::new(left);
        let rx = Channel::new(right);

        assert!(!rx.poll_readable(Duration::ZERO).unwrap());
        tx.send(b"x").unwrap();
        assert!(rx.poll_readable(Duration::from_millis(200)).unwrap());
    }

    fn stalled_sender() -> (
        Channel<pantilt_transport::DuplexStream>,
        pantilt_transport::DuplexStream,
    ) {
        let (left, right) = pantilt_transport::DuplexStream::pair().unwrap();
        left.set_nonblocking(true).unwrap();
        let mut tx = Channel::new(left);
        let chunk = vec![7u8; 64 * 1024];
        for _ in 0..10_000 {
            if tx.try_send(&chunk).unwrap() == SendOutcome::Dropped {
                return (tx, right);
            }
        }
        panic!("unread socket buffer never filled");
    }

    #[test]
    fn send_on_full_nonblocking_stream_fails_fast() {
        let (mut tx, _peer) = stalled_sender();
        let err = tx.send(b"more").unwrap_err();
        assert!(
            matches!(err, FrameError::Io(ref io) if io.kind() == ErrorKind::WouldBlock),
            "{err:?}"
        );
    }

    #[test]
    fn send_within_times_out_on_stalled_peer() {
        let (mut tx, _peer) = stalled_sender();
        let started = std::time::Instant::now();
        let err = tx.send_within(b"more", Duration::from_millis(50)).unwrap_err();
        assert!(
            matches!(err, FrameError::Io(ref io) if io.kind() == ErrorKind::TimedOut),
            "{err:?}"
        );
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn send_within_completes_once_peer_drains() {
        let (mut tx, peer) = stalled_sender();
        let reader = std::thread::spawn(move || {
            let mut rx = Channel::new(peer);
            loop {
                if rx.recv().unwrap().as_ref() == b"tail" {
                    break;
                }
            }
        });

        tx.send_within(b"tail", Duration::from_secs(5)).unwrap();
        reader.join().unwrap();
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut channel = Channel::new(ScriptedStream::new(Vec::new()));
        let _ = channel.get_ref();
        let _ = channel.get_mut();
        let _inner = channel.into_inner();
    }
}

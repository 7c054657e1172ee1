use std::io::{Read, Write};
use std::time::{Duration, Instant};

use bytes::Bytes;
use pantilt_frame::{Channel, Fill, FrameError};
use pantilt_transport::Readiness;
use tracing::debug;

use crate::error::{DetectError, Result};

/// Sentinel payload a detection worker sends once before serving frames.
pub const READY: &[u8] = b"READY";

/// Announce readiness (worker side).
pub fn send_ready<T: Read + Write>(channel: &mut Channel<T>) -> Result<()> {
    channel.send(READY)?;
    debug!("sent READY");
    Ok(())
}

/// Wait for the worker's `READY` message.
///
/// Any other first message fails the handshake. The wait is bounded by
/// `timeout` and works on blocking and non-blocking streams alike.
pub fn await_ready<T>(channel: &mut Channel<T>, timeout: Duration) -> Result<()>
where
    T: Read + Write + Readiness,
{
    let message = recv_within(channel, timeout, "handshake")?;
    if message.as_ref() != READY {
        return Err(DetectError::HandshakeFailed(format!(
            "expected READY, got {} byte message",
            message.len()
        )));
    }
    debug!("worker is ready");
    Ok(())
}

/// Receive one message, giving up after `timeout`.
pub(crate) fn recv_within<T>(
    channel: &mut Channel<T>,
    timeout: Duration,
    during: &str,
) -> Result<Bytes>
where
    T: Read + Write + Readiness,
{
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(message) = channel.try_recv()? {
            return Ok(message);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(DetectError::Timeout(timeout));
        }
        if !channel.poll_readable(deadline - now)? {
            continue;
        }

        match channel.fill() {
            Ok(Fill::Data(_)) | Ok(Fill::Idle) => {}
            Ok(Fill::Closed) | Err(FrameError::ConnectionClosed) => {
                return Err(DetectError::Disconnected(format!(
                    "connection closed during {during}"
                )));
            }
            Err(err) => return Err(DetectError::Frame(err)),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;

    use pantilt_transport::DuplexStream;

    use super::*;

    fn pair() -> (Channel<DuplexStream>, Channel<DuplexStream>) {
        let (a, b) = UnixStream::pair().unwrap();
        (
            Channel::new(DuplexStream::from_unix(a)),
            Channel::new(DuplexStream::from_unix(b)),
        )
    }

    #[test]
    fn ready_round_trip() {
        let (mut worker, mut sensor) = pair();
        send_ready(&mut worker).unwrap();
        await_ready(&mut sensor, Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn ready_split_across_reads() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut raw = a;
        let mut sensor = Channel::new(DuplexStream::from_unix(b));

        let writer = std::thread::spawn(move || {
            raw.write_all(&[0, 0, 0, 5, b'R', b'E']).unwrap();
            std::thread::sleep(Duration::from_millis(30));
            raw.write_all(b"ADY").unwrap();
            raw
        });

        await_ready(&mut sensor, Duration::from_secs(2)).unwrap();
        drop(writer.join().unwrap());
    }

    #[test]
    fn wrong_first_message_fails() {
        let (mut worker, mut sensor) = pair();
        worker.send(b"[]").unwrap();
        let err = await_ready(&mut sensor, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, DetectError::HandshakeFailed(_)));
    }

    #[test]
    fn silent_worker_times_out() {
        let (_worker, mut sensor) = pair();
        let err = await_ready(&mut sensor, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, DetectError::Timeout(_)));
    }

    #[test]
    fn closed_worker_disconnects() {
        let (worker, mut sensor) = pair();
        drop(worker);
        let err = await_ready(&mut sensor, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, DetectError::Disconnected(_)));
    }
}

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use pantilt_frame::{Channel, FrameError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bridge::{DetectionBridge, Detector};
use crate::detection::encode_detections;
use crate::error::Result;
use crate::handshake::send_ready;

/// Counters reported when a worker session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub frames: u64,
    pub inferences: u64,
    pub detector_errors: u64,
}

/// Run the worker side of the detection protocol until the peer hangs up
/// or `stop` is set.
///
/// Sends `READY`, then answers every inbound frame with the bridge's current
/// detection list. A failing detector does not end the session: the frame
/// is answered from the cache.
pub fn serve<T, D>(
    channel: &mut Channel<T>,
    bridge: &mut DetectionBridge<D>,
    stop: &AtomicBool,
) -> Result<WorkerStats>
where
    T: Read + Write,
    D: Detector,
{
    send_ready(channel)?;
    let mut stats = WorkerStats::default();

    while !stop.load(Ordering::SeqCst) {
        let frame = match channel.recv() {
            Ok(frame) => frame,
            Err(err) if peer_gone(&err) => {
                debug!("peer closed the stream");
                break;
            }
            Err(err) => return Err(err.into()),
        };

        let reply = match bridge.process(&frame) {
            Ok(detections) => encode_detections(detections)?,
            Err(err) => {
                stats.detector_errors += 1;
                warn!(
                    frame = bridge.frame_count(),
                    error = %err,
                    "inference failed, replying from cache"
                );
                encode_detections(bridge.cached())?
            }
        };

        match channel.send(&reply) {
            Ok(()) => {}
            Err(err) if peer_gone(&err) => break,
            Err(err) => return Err(err.into()),
        }
        stats.frames = bridge.frame_count();
    }

    stats.inferences = bridge.inferences();
    info!(
        frames = stats.frames,
        inferences = stats.inferences,
        detector_errors = stats.detector_errors,
        "worker session ended"
    );
    Ok(stats)
}

fn peer_gone(err: &FrameError) -> bool {
    match err {
        FrameError::ConnectionClosed => true,
        FrameError::Io(io) => matches!(
            io.kind(),
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Duration;

    use pantilt_transport::DuplexStream;

    use super::*;
    use crate::bridge::BridgeConfig;
    use crate::detection::{decode_detections, Detection};
    use crate::error::DetectError;
    use crate::handshake::await_ready;
    use crate::replay::ReplayDetector;

    struct Flaky;

    impl Detector for Flaky {
        fn detect(&mut self, _frame: &[u8]) -> Result<Vec<Detection>> {
            Err(DetectError::Detector("no model".to_string()))
        }
    }

    fn spawn_worker<D: Detector + Send + 'static>(
        detector: D,
        cadence: u32,
    ) -> (Channel<DuplexStream>, thread::JoinHandle<WorkerStats>) {
        let (a, b) = UnixStream::pair().unwrap();
        let handle = thread::spawn(move || {
            let mut channel = Channel::new(DuplexStream::from_unix(a));
            let mut bridge = DetectionBridge::new(
                detector,
                BridgeConfig {
                    cadence,
                    labels: Vec::new(),
                },
            )
            .unwrap();
            serve(&mut channel, &mut bridge, &AtomicBool::new(false)).unwrap()
        });
        let mut client = Channel::new(DuplexStream::from_unix(b));
        await_ready(&mut client, Duration::from_secs(2)).unwrap();
        (client, handle)
    }

    #[test]
    fn serves_with_cadence_and_ends_on_eof() {
        let replay = ReplayDetector::new(vec![vec![Detection::new("cat", 10, 20)], vec![]]);
        let (mut client, handle) = spawn_worker(replay, 2);

        let mut replies = Vec::new();
        for _ in 0..5 {
            client.send(b"frame").unwrap();
            replies.push(decode_detections(&client.recv().unwrap()).unwrap());
        }
        drop(client);

        assert!(replies[0].is_empty());
        assert_eq!(replies[1], vec![Detection::new("cat", 10, 20)]);
        assert_eq!(replies[2], vec![Detection::new("cat", 10, 20)]);
        assert!(replies[3].is_empty());
        assert!(replies[4].is_empty());

        let stats = handle.join().unwrap();
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.inferences, 2);
        assert_eq!(stats.detector_errors, 0);
    }

    #[test]
    fn detector_errors_reply_from_cache() {
        let (mut client, handle) = spawn_worker(Flaky, 1);
        client.send(b"frame").unwrap();
        assert!(decode_detections(&client.recv().unwrap()).unwrap().is_empty());
        drop(client);

        let stats = handle.join().unwrap();
        assert_eq!(stats.detector_errors, 1);
        assert_eq!(stats.inferences, 0);
    }

    #[test]
    fn stop_flag_ends_before_reading() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut channel = Channel::new(DuplexStream::from_unix(a));
        let mut bridge =
            DetectionBridge::new(ReplayDetector::default(), BridgeConfig::default()).unwrap();
        let stats = serve(&mut channel, &mut bridge, &AtomicBool::new(true)).unwrap();
        assert_eq!(stats, WorkerStats::default());
    }
}

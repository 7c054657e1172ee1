use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use pantilt_control::ControlCommand;
use pantilt_detect::{Detector, RemoteDetector};
use pantilt_frame::{Channel, FrameError, MAX_WIRE_PAYLOAD};
use pantilt_transport::{DuplexStream, TcpEndpoint};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, RelayArgs};
use crate::exit::{detect_error, frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Debug, Serialize)]
struct RelaySession {
    peer: String,
    frames: u64,
    commands: u64,
}

/// Accept sensors one at a time. Each session gets a fresh worker; every
/// frame goes to it and the first detection in each reply is sent back as
/// an `{"err_x","err_y"}` command. A reply with no detection sends nothing.
pub fn run(args: RelayArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.request_timeout)?;
    let max_payload = args.max_message_bytes.unwrap_or(MAX_WIRE_PAYLOAD);

    let endpoint = TcpEndpoint::bind(args.listen.as_str())
        .map_err(|err| transport_error("bind failed", err))?;
    info!(addr = %endpoint.local_addr(), worker = %args.worker, "relay listening");

    loop {
        let (stream, peer) = endpoint
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        info!(%peer, "sensor connected");

        match relay_session(stream, peer, &args.worker, timeout, max_payload) {
            Ok(session) => {
                info!(
                    peer = %session.peer,
                    frames = session.frames,
                    commands = session.commands,
                    "sensor session ended"
                );
                print_record(&session, format);
            }
            // One bad sensor or worker must not take the listener down.
            Err(err) if !args.once => {
                warn!(%peer, code = err.code, error = %err, "sensor session failed");
            }
            Err(err) => return Err(err),
        }

        if args.once {
            return Ok(SUCCESS);
        }
    }
}

fn relay_session(
    stream: DuplexStream,
    peer: SocketAddr,
    worker: &str,
    timeout: Duration,
    max_payload: usize,
) -> CliResult<RelaySession> {
    let mut sensor = Channel::with_max_payload(stream, max_payload);
    let mut detector =
        RemoteDetector::spawn(worker, timeout).map_err(|err| detect_error("worker failed", err))?;

    let mut session = RelaySession {
        peer: peer.to_string(),
        frames: 0,
        commands: 0,
    };

    loop {
        let frame = match sensor.recv() {
            Ok(frame) => frame,
            Err(err) if sensor_gone(&err) => break,
            Err(err) => return Err(frame_error("receive failed", err)),
        };
        session.frames += 1;

        let detections = detector
            .detect(&frame)
            .map_err(|err| detect_error("detection failed", err))?;
        let Some(target) = detections.first() else {
            continue;
        };

        let command = ControlCommand::error(target.err_x, target.err_y);
        debug!(label = %target.label, ?command, "sending command");
        match sensor.send(&command.to_json()) {
            Ok(()) => session.commands += 1,
            Err(err) if sensor_gone(&err) => break,
            Err(err) => return Err(frame_error("send failed", err)),
        }
    }

    Ok(session)
}

fn sensor_gone(err: &FrameError) -> bool {
    match err {
        FrameError::ConnectionClosed => true,
        FrameError::Io(io) => matches!(
            io.kind(),
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
        ),
        FrameError::PayloadTooLarge { .. } => false,
    }
}

use pantilt_frame::MAX_WIRE_PAYLOAD;
use pantilt_sensor::{
    open_link, DirectorySource, LinkConfig, LinkTarget, LoopState, Outcome, SensorLoop,
};
use tracing::info;

use crate::cmd::{install_stop_handler, parse_duration, parse_interval, SensorArgs};
use crate::exit::{sensor_error, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_record, OutputFormat};

pub fn run(args: SensorArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_interval(&args.frame_interval)?;
    let handshake_timeout = parse_duration(&args.handshake_timeout)?;

    // Capture first: without frames there is nothing to stream.
    let mut source = DirectorySource::open(&args.frames)
        .map_err(|err| sensor_error("capture failed", err))?
        .with_interval(interval);
    if args.once {
        source = source.once();
    }

    let gimbal = args.control.gimbal()?;
    let stop = install_stop_handler()?;

    let target = match args.local_detector {
        Some(command) => LinkTarget::LocalDetector { command },
        None => LinkTarget::Tcp {
            host: args.server_address,
            port: args.server_port,
        },
    };
    let config = LinkConfig {
        max_message_bytes: args.max_message_bytes.unwrap_or(MAX_WIRE_PAYLOAD),
        handshake_timeout,
        ..LinkConfig::new(target)
    };

    info!(state = ?LoopState::Connecting, target = ?config.target, "sensor starting");
    let route = config.target.route();
    let channel = open_link(&config).map_err(|err| sensor_error("connect failed", err))?;

    let report = SensorLoop::new(source, channel, gimbal, route, stop).run();
    print_record(&report, format);

    match report.outcome {
        Outcome::Faulted(_) => Ok(TRANSPORT_ERROR),
        _ => Ok(SUCCESS),
    }
}

use pantilt_detect::{serve, BridgeConfig, DetectionBridge, ReplayDetector};
use pantilt_frame::Channel;
use pantilt_transport::DuplexStream;
use tracing::info;

use crate::cmd::{install_stop_handler, WorkerArgs};
use crate::exit::{detect_error, CliResult, SUCCESS};

/// Serve detections on stdin/stdout. Nothing else may be printed to stdout
/// here; stats go to the log.
pub fn run(args: WorkerArgs) -> CliResult<i32> {
    let detector = match &args.replay {
        Some(path) => {
            ReplayDetector::load(path).map_err(|err| detect_error("replay script", err))?
        }
        None => {
            info!("no replay script; every inference reports nothing");
            ReplayDetector::default()
        }
    };

    let config = BridgeConfig {
        cadence: args.cadence,
        labels: args.labels,
    };
    let mut bridge =
        DetectionBridge::new(detector, config).map_err(|err| detect_error("worker", err))?;

    let stop = install_stop_handler()?;
    let mut channel = Channel::new(DuplexStream::stdio());

    info!(cadence = args.cadence, "worker serving on stdio");
    serve(&mut channel, &mut bridge, &stop).map_err(|err| detect_error("worker", err))?;
    Ok(SUCCESS)
}

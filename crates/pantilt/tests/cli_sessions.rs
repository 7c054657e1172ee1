#![cfg(all(unix, feature = "cli"))]

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use pantilt_detect::{await_ready, decode_detections, Detection};
use pantilt_frame::Channel;
use pantilt_transport::{tcp, ChildPipe, DuplexStream};

const BIN: &str = env!("CARGO_BIN_EXE_pantilt");

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "pantilt-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn write_replay(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("replay.jsonl");
    std::fs::write(&path, "[{\"label\":\"cat\",\"err_x\":50,\"err_y\":-3}]\n[]\n")
        .expect("replay script should be writable");
    path
}

fn worker_command(replay: &std::path::Path, cadence: u32) -> String {
    format!(
        "{BIN} --log-level error worker --cadence {cadence} --replay {}",
        replay.display()
    )
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("ephemeral port should be available")
}

#[test]
fn worker_speaks_framed_protocol_on_stdio() {
    let dir = unique_temp_dir("worker");
    let replay = write_replay(&dir);

    let pipe = ChildPipe::spawn(&worker_command(&replay, 2)).expect("worker should start");
    let mut channel = Channel::new(DuplexStream::from_child(pipe));
    await_ready(&mut channel, Duration::from_secs(5)).expect("worker should say READY");

    let mut replies = Vec::new();
    for _ in 0..4 {
        channel.send(b"\xFF\xD8fake-jpeg").expect("frame should send");
        let reply = channel.recv().expect("worker should reply");
        replies.push(decode_detections(&reply).expect("reply should be a detection list"));
    }

    assert!(replies[0].is_empty());
    assert_eq!(replies[1], vec![Detection::new("cat", 50, -3)]);
    assert_eq!(replies[2], vec![Detection::new("cat", 50, -3)]);
    assert!(replies[3].is_empty());

    drop(channel);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn worker_rejects_zero_cadence() {
    let output = Command::new(BIN)
        .args(["--log-level", "error", "worker", "--cadence", "0"])
        .stdin(Stdio::null())
        .output()
        .expect("worker should run");

    assert_eq!(output.status.code(), Some(64));
    assert!(output.stdout.is_empty(), "stdout is reserved for frames");
}

#[test]
fn sensor_with_local_detector_streams_and_exits() {
    let dir = unique_temp_dir("sensor-local");
    let frames = dir.join("frames");
    std::fs::create_dir_all(&frames).unwrap();
    for name in ["a.jpg", "b.jpg", "c.jpeg"] {
        std::fs::write(frames.join(name), b"\xFF\xD8frame").unwrap();
    }
    let replay = write_replay(&dir);

    let output = Command::new(BIN)
        .args(["--log-level", "error", "--format", "json", "sensor", "--once"])
        .arg("--frames")
        .arg(&frames)
        .arg("--frame-interval")
        .arg("0")
        .arg("--local-detector")
        .arg(worker_command(&replay, 1))
        .output()
        .expect("sensor should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["outcome"]["reason"], "source_ended");
    assert_eq!(report["state"], "closing");
    assert_eq!(report["stats"]["frames_captured"], 3);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn sensor_reports_refused_connection() {
    let dir = unique_temp_dir("sensor-refused");
    std::fs::write(dir.join("a.jpg"), b"frame").unwrap();

    let output = Command::new(BIN)
        .args(["--log-level", "error", "sensor", "--server-address", "127.0.0.1"])
        .arg("--server-port")
        .arg(free_port().to_string())
        .arg("--frames")
        .arg(&dir)
        .output()
        .expect("sensor should run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect failed"), "{stderr}");

    let _ = std::fs::remove_dir_all(&dir);
}

fn connect_with_retry(port: u16) -> DuplexStream {
    let start = Instant::now();
    loop {
        match tcp::connect("127.0.0.1", port) {
            Ok(stream) => return stream,
            Err(_) if start.elapsed() < Duration::from_secs(5) => {
                thread::sleep(Duration::from_millis(25));
            }
            Err(err) => panic!("relay never came up: {err}"),
        }
    }
}

#[test]
fn relay_keeps_serving_after_a_failed_session() {
    let dir = unique_temp_dir("relay-recover");
    let replay = write_replay(&dir);
    let port = free_port();

    let mut relay = Command::new(BIN)
        .args(["--log-level", "error", "relay", "--max-message-bytes", "64"])
        .arg("--listen")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--worker")
        .arg(worker_command(&replay, 1))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("relay should start");

    let mut oversized = Channel::new(connect_with_retry(port));
    oversized.send(&[0u8; 1024]).unwrap();
    assert!(oversized.recv().is_err(), "relay should drop the session");
    drop(oversized);

    let mut sensor = Channel::new(connect_with_retry(port));
    sensor.send(b"frame-1").unwrap();
    let command: serde_json::Value = serde_json::from_slice(&sensor.recv().unwrap()).unwrap();
    assert_eq!(command, serde_json::json!({"err_x": 50, "err_y": -3}));
    assert_eq!(relay.try_wait().unwrap(), None, "relay should still be running");

    drop(sensor);
    relay.kill().unwrap();
    let _ = relay.wait();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn relay_answers_frames_with_error_commands() {
    let dir = unique_temp_dir("relay");
    let replay = write_replay(&dir);
    let port = free_port();

    let mut relay = Command::new(BIN)
        .args(["--log-level", "error", "--format", "json", "relay", "--once"])
        .arg("--listen")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--worker")
        .arg(worker_command(&replay, 1))
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("relay should start");

    let mut sensor = Channel::new(connect_with_retry(port));

    sensor.send(b"frame-1").unwrap();
    let command: serde_json::Value = serde_json::from_slice(&sensor.recv().unwrap()).unwrap();
    assert_eq!(command, serde_json::json!({"err_x": 50, "err_y": -3}));

    // Second inference replays `[]`: no command. The third wraps around.
    sensor.send(b"frame-2").unwrap();
    sensor.send(b"frame-3").unwrap();
    let command: serde_json::Value = serde_json::from_slice(&sensor.recv().unwrap()).unwrap();
    assert_eq!(command["err_x"], 50);

    drop(sensor);
    let output = relay.wait_with_output().expect("relay should exit");
    assert!(output.status.success());
    let session: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(session["frames"], 3);
    assert_eq!(session["commands"], 2);

    let _ = std::fs::remove_dir_all(&dir);
}

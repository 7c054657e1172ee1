use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{Result, SensorError};

/// Source of encoded frames.
pub trait FrameSource {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Bytes>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Bytes>> {
        (**self).next_frame()
    }
}

/// Replays `*.jpg`/`*.jpeg` files from a directory in file-name order.
///
/// Stands in for a camera: each file is sent as-is, and with an interval set
/// frames are released no faster than that rate.
#[derive(Debug)]
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
    interval: Option<Duration>,
    last_release: Option<Instant>,
}

impl DirectorySource {
    /// Scan `dir` for frames. Fails when the directory is unreadable or
    /// contains no images.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let entries = fs::read_dir(&dir).map_err(|source| SensorError::Capture {
            path: dir.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SensorError::Capture {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && is_jpeg(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(SensorError::NoFrames(dir));
        }
        files.sort();

        info!(dir = %dir.display(), frames = files.len(), "opened frame directory");
        Ok(Self {
            dir,
            files,
            next: 0,
            looping: true,
            interval: None,
            last_release: None,
        })
    }

    /// Release at most one frame per `interval`.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Stop after one pass instead of starting over.
    pub fn once(mut self) -> Self {
        self.looping = false;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last_release) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_release = Some(Instant::now());
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.next >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.next = 0;
        }

        let path = &self.files[self.next];
        let data = fs::read(path).map_err(|source| SensorError::Capture {
            path: path.clone(),
            source,
        })?;
        debug!(file = %path.display(), frame_bytes = data.len(), "captured frame");
        self.next += 1;

        self.pace();
        Ok(Some(Bytes::from(data)))
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_dir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("pantilt-capture-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn replays_images_in_name_order_and_loops() {
        let dir = frame_dir("order");
        fs::write(dir.join("b.jpg"), b"second").unwrap();
        fs::write(dir.join("a.JPEG"), b"first").unwrap();
        fs::write(dir.join("notes.txt"), b"skip me").unwrap();

        let mut source = DirectorySource::open(&dir).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.next_frame().unwrap().unwrap().as_ref(), b"first");
        assert_eq!(source.next_frame().unwrap().unwrap().as_ref(), b"second");
        assert_eq!(source.next_frame().unwrap().unwrap().as_ref(), b"first");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn once_stops_after_a_pass() {
        let dir = frame_dir("once");
        fs::write(dir.join("only.jpg"), b"x").unwrap();

        let mut source = DirectorySource::open(&dir).unwrap().once();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn interval_paces_frames() {
        let dir = frame_dir("pace");
        fs::write(dir.join("f.jpg"), b"x").unwrap();

        let mut source = DirectorySource::open(&dir)
            .unwrap()
            .with_interval(Duration::from_millis(20));
        let start = Instant::now();
        for _ in 0..3 {
            source.next_frame().unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(40));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = frame_dir("empty");
        let err = DirectorySource::open(&dir).unwrap_err();
        assert!(matches!(err, SensorError::NoFrames(_)));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_directory_is_a_capture_error() {
        let err = DirectorySource::open("/nonexistent/pantilt/frames").unwrap_err();
        assert!(matches!(err, SensorError::Capture { .. }));
    }
}

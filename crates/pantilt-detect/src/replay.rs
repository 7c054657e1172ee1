use std::fs;
use std::path::Path;

use tracing::info;

use crate::bridge::Detector;
use crate::detection::{decode_detections, Detection};
use crate::error::{DetectError, Result};

/// Detector that replays a fixed script of results, one per inference,
/// wrapping around at the end.
///
/// Scripts are JSON lines: each non-blank line is a detection list such as
/// `[{"label":"cat","err_x":40,"err_y":-12}]` or `[]`.
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    script: Vec<Vec<Detection>>,
    next: usize,
}

impl ReplayDetector {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self { script, next: 0 }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let detector = Self::parse(&text)?;
        info!(
            path = %path.display(),
            entries = detector.script.len(),
            "loaded replay script"
        );
        Ok(detector)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut script = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry = decode_detections(line.as_bytes()).map_err(|err| {
                DetectError::Detector(format!("replay script line {}: {err}", index + 1))
            })?;
            script.push(entry);
        }
        Ok(Self::new(script))
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, _frame: &[u8]) -> Result<Vec<Detection>> {
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let entry = self.script[self.next].clone();
        self.next = (self.next + 1) % self.script.len();
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_script() {
        let mut replay = ReplayDetector::parse(
            "[{\"label\":\"cat\",\"err_x\":1,\"err_y\":2}]\n\n[]\n",
        )
        .unwrap();
        assert_eq!(replay.len(), 2);

        assert_eq!(replay.detect(b"").unwrap(), vec![Detection::new("cat", 1, 2)]);
        assert!(replay.detect(b"").unwrap().is_empty());
        assert_eq!(replay.detect(b"").unwrap(), vec![Detection::new("cat", 1, 2)]);
    }

    #[test]
    fn empty_script_detects_nothing() {
        let mut replay = ReplayDetector::default();
        assert!(replay.is_empty());
        assert!(replay.detect(b"frame").unwrap().is_empty());
    }

    #[test]
    fn bad_line_names_its_position() {
        let err = ReplayDetector::parse("[]\n{oops}\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = ReplayDetector::load("/nonexistent/pantilt/replay.jsonl").unwrap_err();
        assert!(matches!(err, DetectError::Io(_)));
    }
}

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::detection::Detection;
use crate::error::{DetectError, Result};

/// Anything that can turn an encoded frame into detections.
pub trait Detector {
    fn detect(&mut self, frame: &[u8]) -> Result<Vec<Detection>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &[u8]) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }
}

/// Inference cadence and label filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Run inference on every `cadence`-th frame (1 = every frame).
    pub cadence: u32,
    /// Keep only detections with these labels; empty keeps everything.
    pub labels: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cadence: 15,
            labels: Vec::new(),
        }
    }
}

/// Rate-limits a [`Detector`] and carries its last answer forward.
///
/// Frames are counted from 1; inference runs when the count is a multiple of
/// the cadence. All other frames get the cached result, unchanged, including
/// an empty one.
pub struct DetectionBridge<D> {
    detector: D,
    cadence: u64,
    labels: HashSet<String>,
    frame_count: u64,
    inferences: u64,
    last: Vec<Detection>,
}

impl<D: Detector> DetectionBridge<D> {
    pub fn new(detector: D, config: BridgeConfig) -> Result<Self> {
        if config.cadence == 0 {
            return Err(DetectError::InvalidCadence(config.cadence));
        }
        Ok(Self {
            detector,
            cadence: u64::from(config.cadence),
            labels: config.labels.into_iter().collect(),
            frame_count: 0,
            inferences: 0,
            last: Vec::new(),
        })
    }

    /// Count one frame and return the current detections for it.
    ///
    /// When inference fails the cache is left as it was and the error is
    /// returned; [`cached`](Self::cached) still answers for this frame.
    pub fn process(&mut self, frame: &[u8]) -> Result<&[Detection]> {
        self.frame_count += 1;

        if self.frame_count % self.cadence != 0 {
            trace!(frame = self.frame_count, "reusing cached detections");
            return Ok(&self.last);
        }

        let mut found = self.detector.detect(frame)?;
        if !self.labels.is_empty() {
            found.retain(|d| self.labels.contains(&d.label));
        }
        self.inferences += 1;
        debug!(
            frame = self.frame_count,
            detections = found.len(),
            "inference complete"
        );
        self.last = found;
        Ok(&self.last)
    }

    /// Last result without counting a frame.
    pub fn cached(&self) -> &[Detection] {
        &self.last
    }

    /// The detection that drives the controller.
    pub fn primary(&self) -> Option<&Detection> {
        self.last.first()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn inferences(&self) -> u64 {
        self.inferences
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns a distinct detection on each call and records frame sizes.
    #[derive(Default)]
    struct CountingDetector {
        calls: Vec<usize>,
        empty_on_call: Option<usize>,
        fail: bool,
    }

    impl Detector for CountingDetector {
        fn detect(&mut self, frame: &[u8]) -> Result<Vec<Detection>> {
            if self.fail {
                return Err(DetectError::Detector("model crashed".to_string()));
            }
            self.calls.push(frame.len());
            let n = self.calls.len();
            if self.empty_on_call == Some(n) {
                return Ok(Vec::new());
            }
            Ok(vec![
                Detection::new("cat", n as i32, -(n as i32)),
                Detection::new("dog", 0, 0),
            ])
        }
    }

    fn bridge(cadence: u32) -> DetectionBridge<CountingDetector> {
        DetectionBridge::new(
            CountingDetector::default(),
            BridgeConfig {
                cadence,
                ..BridgeConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn cadence_fifteen_runs_on_multiples_only() {
        let mut bridge = bridge(15);
        let mut ran_on = Vec::new();
        for frame in 1..=50u64 {
            let before = bridge.inferences();
            let payload = vec![0u8; frame as usize];
            bridge.process(&payload).unwrap();
            if bridge.inferences() > before {
                ran_on.push(frame);
            }
        }
        assert_eq!(ran_on, vec![15, 30, 45]);
        assert_eq!(bridge.detector_mut().calls, vec![15, 30, 45]);
    }

    #[test]
    fn frames_between_reuse_result_verbatim() {
        let mut bridge = bridge(3);
        assert!(bridge.process(b"1").unwrap().is_empty());
        assert!(bridge.process(b"2").unwrap().is_empty());

        let fresh = bridge.process(b"3").unwrap().to_vec();
        assert_eq!(fresh[0], Detection::new("cat", 1, -1));
        assert_eq!(bridge.process(b"4").unwrap(), fresh.as_slice());
        assert_eq!(bridge.process(b"5").unwrap(), fresh.as_slice());
        assert_eq!(bridge.primary(), Some(&Detection::new("cat", 1, -1)));
    }

    #[test]
    fn empty_result_is_carried_forward_too() {
        let mut bridge = DetectionBridge::new(
            CountingDetector {
                empty_on_call: Some(2),
                ..CountingDetector::default()
            },
            BridgeConfig {
                cadence: 2,
                labels: Vec::new(),
            },
        )
        .unwrap();

        bridge.process(b"a").unwrap();
        assert_eq!(bridge.process(b"b").unwrap().len(), 2);
        bridge.process(b"c").unwrap();
        assert!(bridge.process(b"d").unwrap().is_empty());
        assert!(bridge.process(b"e").unwrap().is_empty());
        assert!(bridge.primary().is_none());
    }

    #[test]
    fn label_allowlist_filters_before_caching() {
        let mut bridge = DetectionBridge::new(
            CountingDetector::default(),
            BridgeConfig {
                cadence: 1,
                labels: vec!["dog".to_string()],
            },
        )
        .unwrap();

        let found = bridge.process(b"frame").unwrap();
        assert_eq!(found, &[Detection::new("dog", 0, 0)]);
    }

    #[test]
    fn detector_failure_keeps_cache() {
        let mut bridge = bridge(1);
        bridge.process(b"ok").unwrap();
        let cached = bridge.cached().to_vec();

        bridge.detector_mut().fail = true;
        assert!(matches!(
            bridge.process(b"boom"),
            Err(DetectError::Detector(_))
        ));
        assert_eq!(bridge.cached(), cached.as_slice());
        assert_eq!(bridge.frame_count(), 2);
    }

    #[test]
    fn zero_cadence_rejected() {
        let err = DetectionBridge::new(
            CountingDetector::default(),
            BridgeConfig {
                cadence: 0,
                labels: Vec::new(),
            },
        )
        .err()
        .unwrap();
        assert!(matches!(err, DetectError::InvalidCadence(0)));
    }
}

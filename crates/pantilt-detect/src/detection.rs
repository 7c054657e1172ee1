use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One detected object.
///
/// `err_x`/`err_y` are the pixel offset of the object's center from the
/// image center: +x is right of center, +y is below center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub err_x: i32,
    #[serde(default)]
    pub err_y: i32,
}

impl Detection {
    pub fn new(label: impl Into<String>, err_x: i32, err_y: i32) -> Self {
        Self {
            label: label.into(),
            err_x,
            err_y,
        }
    }
}

/// Serialize a detection list for the wire (`[]` when nothing was found).
pub fn encode_detections(detections: &[Detection]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(detections)?)
}

/// Parse a detection list received from a worker.
pub fn decode_detections(payload: &[u8]) -> Result<Vec<Detection>> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectError;

    #[test]
    fn encodes_expected_field_names() {
        let bytes = encode_detections(&[Detection::new("cat", 12, -7)]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"[{"label":"cat","err_x":12,"err_y":-7}]"#
        );
    }

    #[test]
    fn empty_list_encodes_as_empty_array() {
        assert_eq!(encode_detections(&[]).unwrap(), b"[]");
        assert!(decode_detections(b"[]").unwrap().is_empty());
    }

    #[test]
    fn decode_ignores_extra_fields_and_defaults_missing() {
        let decoded =
            decode_detections(br#"[{"label":"dog","err_x":3,"box":[1,2,3,4]},{"err_y":9}]"#)
                .unwrap();
        assert_eq!(
            decoded,
            vec![Detection::new("dog", 3, 0), Detection::new("", 0, 9)]
        );
    }

    #[test]
    fn decode_rejects_non_list() {
        let err = decode_detections(br#"{"label":"cat"}"#).unwrap_err();
        assert!(matches!(err, DetectError::Json(_)));
    }
}

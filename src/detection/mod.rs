//! Detection capability.
//!
//! The relay core hands each uploaded frame to a [`DetectionCapability`] and
//! publishes whatever comes back. Implementations never fail: a frame they
//! cannot decode is returned unchanged with an empty summary.
//!
//! The backend is chosen once, at construction, by [`build_detector`]; call
//! sites never branch on which one is active.
//!
//! Implementations are shared across concurrent upload tasks and must guard
//! any cross-frame state themselves.

pub mod motion;
pub mod passthrough;
pub mod summary;

use bytes::Bytes;
use std::sync::Arc;

use crate::config::{DetectionConfig, DetectorBackend};

pub use motion::{MotionDetector, MotionSettings};
pub use passthrough::PassthroughDetector;
pub use summary::{BoundingBox, Detection, DetectionCategory, DetectionSummary, SummaryReport};

/// Output of one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFrame {
    /// The input bytes, unchanged
    pub raw: Bytes,
    /// Frame with detections drawn, re-encoded as JPEG; `raw` when the
    /// input could not be decoded
    pub annotated: Bytes,
    /// [`SummaryReport`] as JSON
    pub detection_json: String,
}

impl ProcessedFrame {
    /// The frame unchanged, with an empty summary.
    pub fn passthrough(raw: Bytes) -> Self {
        Self {
            annotated: raw.clone(),
            raw,
            detection_json: DetectionSummary::new().to_json(),
        }
    }
}

/// Given raw image bytes, return the raw bytes, an annotated copy and a
/// detection summary.
pub trait DetectionCapability: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Analyse one frame. Never fails; undecodable input comes back as-is.
    fn process(&self, raw: Bytes) -> ProcessedFrame;
}

/// Construct the configured backend.
pub fn build_detector(config: &DetectionConfig) -> Arc<dyn DetectionCapability> {
    match config.backend {
        DetectorBackend::Motion => Arc::new(MotionDetector::new(MotionSettings::from(config))),
        DetectorBackend::Passthrough => Arc::new(PassthroughDetector),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_configured_backend() {
        let mut config = DetectionConfig::default();
        assert_eq!(build_detector(&config).name(), "motion");

        config.backend = DetectorBackend::Passthrough;
        assert_eq!(build_detector(&config).name(), "passthrough");
    }
}

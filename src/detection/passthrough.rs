//! Detector used when image analysis is disabled.

use bytes::Bytes;

use super::{DetectionCapability, ProcessedFrame};

/// Echoes every frame back with an empty detection summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughDetector;

impl DetectionCapability for PassthroughDetector {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn process(&self, raw: Bytes) -> ProcessedFrame {
        ProcessedFrame::passthrough(raw)
    }
}

//! Detection results and their JSON summary.
//!
//! The summary document has the shape
//! `{timestamp, processing_ms, count, summary: {category: count}, detections: [...]}`
//! and is treated as opaque by the relay core.

use chrono::Utc;
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What kind of detector produced a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionCategory {
    /// Frame-differencing change region
    Motion,
    /// Face detector hit
    Face,
    /// Object classifier hit
    Object,
    /// Tracked target
    Tracking,
}

impl DetectionCategory {
    /// Lowercase name, as used in the JSON summary.
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionCategory::Motion => "motion",
            DetectionCategory::Face => "face",
            DetectionCategory::Object => "object",
            DetectionCategory::Tracking => "tracking",
        }
    }

    /// Box color used on the annotated frame.
    pub fn color(self) -> Rgb<u8> {
        match self {
            DetectionCategory::Motion => Rgb([0, 255, 0]),
            DetectionCategory::Face => Rgb([0, 0, 255]),
            DetectionCategory::Object => Rgb([255, 165, 0]),
            DetectionCategory::Tracking => Rgb([0, 255, 255]),
        }
    }
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub w: u32,
    /// Height in pixels
    pub h: u32,
}

impl BoundingBox {
    /// True when the pixel lies inside the box.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.w as i32 && y < self.y + self.h as i32
    }
}

/// One detected region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Human-readable label
    pub label: String,
    /// Kind of detector that produced this box
    pub category: DetectionCategory,
    /// Region in pixel coordinates
    pub bbox: BoundingBox,
    /// Score in 0..=1
    pub confidence: f64,
}

impl Detection {
    /// Build a detection; `confidence` is clamped to 0..=1 and rounded to three decimals.
    pub fn new(
        label: impl Into<String>,
        category: DetectionCategory,
        bbox: BoundingBox,
        confidence: f64,
    ) -> Self {
        Self {
            label: label.into(),
            category,
            bbox,
            confidence: round_to(confidence.clamp(0.0, 1.0), 3),
        }
    }
}

/// Aggregated detections for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSummary {
    /// Seconds since epoch when processing started
    pub timestamp: f64,
    /// Time spent in the detector
    pub processing_ms: f64,
    /// Individual detections
    pub detections: Vec<Detection>,
}

/// Serialized form of [`DetectionSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Seconds since epoch when processing started
    pub timestamp: f64,
    /// Processing time, rounded to 0.1 ms
    pub processing_ms: f64,
    /// Total number of detections
    pub count: usize,
    /// Detections per category
    pub summary: BTreeMap<DetectionCategory, usize>,
    /// Individual detections
    pub detections: Vec<Detection>,
}

impl Default for DetectionSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionSummary {
    /// Empty summary stamped with the current time.
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
            processing_ms: 0.0,
            detections: Vec::new(),
        }
    }

    /// Add one detection.
    pub fn push(&mut self, detection: Detection) {
        self.detections.push(detection);
    }

    /// Number of detections per category.
    pub fn counts(&self) -> BTreeMap<DetectionCategory, usize> {
        let mut counts = BTreeMap::new();
        for detection in &self.detections {
            *counts.entry(detection.category).or_insert(0) += 1;
        }
        counts
    }

    /// Serializable view with per-category counts.
    pub fn report(&self) -> SummaryReport {
        SummaryReport {
            timestamp: self.timestamp,
            processing_ms: round_to(self.processing_ms, 1),
            count: self.detections.len(),
            summary: self.counts(),
            detections: self.detections.clone(),
        }
    }

    /// The report as a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.report()).unwrap_or_else(|_| "{}".to_string())
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motion_at(x: i32, y: i32) -> Detection {
        Detection::new(
            "motion",
            DetectionCategory::Motion,
            BoundingBox { x, y, w: 10, h: 20 },
            1.0,
        )
    }

    #[test]
    fn empty_summary_json_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&DetectionSummary::new().to_json()).unwrap();

        assert!(json["timestamp"].as_f64().unwrap() > 0.0);
        assert_eq!(json["processing_ms"], 0.0);
        assert_eq!(json["count"], 0);
        assert!(json["summary"].as_object().unwrap().is_empty());
        assert!(json["detections"].as_array().unwrap().is_empty());
    }

    #[test]
    fn summary_counts_per_category() {
        let mut summary = DetectionSummary::new();
        summary.push(motion_at(0, 0));
        summary.push(motion_at(50, 50));
        summary.push(Detection::new(
            "face",
            DetectionCategory::Face,
            BoundingBox { x: 1, y: 2, w: 3, h: 4 },
            0.9,
        ));
        summary.processing_ms = 12.345;

        let json: serde_json::Value = serde_json::from_str(&summary.to_json()).unwrap();
        assert_eq!(json["count"], 3);
        assert_eq!(json["summary"]["motion"], 2);
        assert_eq!(json["summary"]["face"], 1);
        assert_eq!(json["processing_ms"], 12.3);

        let face = &json["detections"][2];
        assert_eq!(face["label"], "face");
        assert_eq!(face["category"], "face");
        assert_eq!(face["bbox"]["x"], 1);
        assert_eq!(face["bbox"]["h"], 4);
        assert_eq!(face["confidence"], 0.9);
    }

    #[test]
    fn confidence_is_rounded_and_clamped() {
        let bbox = BoundingBox { x: 0, y: 0, w: 1, h: 1 };
        assert_eq!(
            Detection::new("x", DetectionCategory::Object, bbox, 0.123456).confidence,
            0.123
        );
        assert_eq!(
            Detection::new("x", DetectionCategory::Object, bbox, 1.7).confidence,
            1.0
        );
    }

    #[test]
    fn bbox_contains() {
        let bbox = BoundingBox { x: 10, y: 10, w: 5, h: 5 };
        assert!(bbox.contains(10, 10));
        assert!(bbox.contains(14, 14));
        assert!(!bbox.contains(15, 10));
        assert!(!bbox.contains(9, 12));
    }
}

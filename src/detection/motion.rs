//! Frame-differencing motion detector.
//!
//! Each frame is compared against the previous one seen by this detector
//! instance (across all devices, in arrival order):
//!
//! 1. absolute grayscale difference, thresholded to a binary mask
//! 2. dilation to join nearby changed pixels
//! 3. external contours of the mask; contours enclosing at least
//!    `min_area` pixels become `motion` detections
//!
//! The first frame, and any frame whose size differs from its predecessor,
//! only primes the previous-frame state.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::morphology::dilate;
use imageproc::rect::Rect;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

use super::summary::{BoundingBox, Detection, DetectionCategory, DetectionSummary};
use super::{DetectionCapability, ProcessedFrame};
use crate::config::DetectionConfig;

const BOX_THICKNESS: i32 = 2;

/// Tuning for [`MotionDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSettings {
    /// Per-pixel grayscale difference counted as change
    pub threshold: u8,
    /// Dilation radius applied to the change mask
    pub dilate_radius: u8,
    /// Minimum contour area in pixels
    pub min_area: f64,
    /// Quality of the re-encoded annotated frame
    pub jpeg_quality: u8,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

impl From<&DetectionConfig> for MotionSettings {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            threshold: config.motion_threshold,
            dilate_radius: config.dilate_radius,
            min_area: config.min_area,
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        }
    }
}

/// Compares each frame with the one before it and boxes the regions that changed.
pub struct MotionDetector {
    settings: MotionSettings,
    previous: Mutex<Option<GrayImage>>,
}

impl MotionDetector {
    /// Detector with no previous frame.
    pub fn new(settings: MotionSettings) -> Self {
        Self {
            settings,
            previous: Mutex::new(None),
        }
    }

    /// Swap `gray` in as the previous frame and return the changed regions.
    fn advance(&self, gray: GrayImage) -> Vec<BoundingBox> {
        let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);

        let regions = match previous.as_ref() {
            Some(prev) if prev.dimensions() == gray.dimensions() => self.regions(prev, &gray),
            Some(_) => {
                debug!("Frame size changed, resetting motion baseline");
                Vec::new()
            }
            None => Vec::new(),
        };

        *previous = Some(gray);
        regions
    }

    fn regions(&self, previous: &GrayImage, current: &GrayImage) -> Vec<BoundingBox> {
        let threshold = self.settings.threshold;
        let mask = GrayImage::from_fn(current.width(), current.height(), |x, y| {
            let before = previous.get_pixel(x, y)[0];
            let after = current.get_pixel(x, y)[0];
            if before.abs_diff(after) > threshold {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });

        let mask = if self.settings.dilate_radius > 0 {
            dilate(&mask, Norm::LInf, self.settings.dilate_radius)
        } else {
            mask
        };

        find_contours::<i32>(&mask)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter(|c| contour_area(c) >= self.settings.min_area)
            .filter_map(bounding_box)
            .collect()
    }

    fn encode(&self, image: &RgbImage) -> Option<Bytes> {
        let mut buffer = Vec::new();
        match JpegEncoder::new_with_quality(&mut buffer, self.settings.jpeg_quality)
            .encode_image(image)
        {
            Ok(()) => Some(Bytes::from(buffer)),
            Err(err) => {
                warn!(error = %err, "JPEG encode of annotated frame failed");
                None
            }
        }
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new(MotionSettings::default())
    }
}

impl DetectionCapability for MotionDetector {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn process(&self, raw: Bytes) -> ProcessedFrame {
        let started = Instant::now();

        let frame = match image::load_from_memory(&raw) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, bytes = raw.len(), "JPEG decode failed, passing frame through");
                return ProcessedFrame::passthrough(raw);
            }
        };

        let mut summary = DetectionSummary::new();
        for bbox in self.advance(frame.to_luma8()) {
            summary.push(Detection::new("motion", DetectionCategory::Motion, bbox, 1.0));
        }

        let mut canvas = frame.to_rgb8();
        for detection in &summary.detections {
            draw_box(&mut canvas, &detection.bbox, detection.category);
        }
        let annotated = self.encode(&canvas).unwrap_or_else(|| raw.clone());

        summary.processing_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            detections = summary.detections.len(),
            processing_ms = summary.processing_ms,
            "Motion detection complete"
        );

        ProcessedFrame {
            raw,
            annotated,
            detection_json: summary.to_json(),
        }
    }
}

/// Polygon area of a contour (shoelace formula).
fn contour_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }

    let mut twice_area = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    twice_area.abs() as f64 / 2.0
}

fn bounding_box(contour: &Contour<i32>) -> Option<BoundingBox> {
    let min_x = contour.points.iter().map(|p| p.x).min()?;
    let max_x = contour.points.iter().map(|p| p.x).max()?;
    let min_y = contour.points.iter().map(|p| p.y).min()?;
    let max_y = contour.points.iter().map(|p| p.y).max()?;

    Some(BoundingBox {
        x: min_x,
        y: min_y,
        w: (max_x - min_x + 1) as u32,
        h: (max_y - min_y + 1) as u32,
    })
}

fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, category: DetectionCategory) {
    let color = category.color();
    for offset in 0..BOX_THICKNESS {
        let rect = Rect::at(bbox.x - offset, bbox.y - offset)
            .of_size(bbox.w + (offset * 2) as u32, bbox.h + (offset * 2) as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

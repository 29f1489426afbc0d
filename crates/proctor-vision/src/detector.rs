//! Face-region detection
//!
//! The analyzer treats region detection as a black box behind
//! [`RegionDetector`]: given a grayscale frame it returns zero or more
//! face bounding boxes. The shipped [`CascadeDetector`] runs an ONNX
//! model when one is configured and otherwise falls back to a
//! deterministic multi-scale texture scan, so the pipeline works on
//! hosts without a model file.

use crate::config::DetectorConfig;
use crate::VisionError;
use ndarray::Array4;
use ort::{GraphOptimizationLevel, Session};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Face bounding box in original-resolution pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    /// Region center point
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    fn overlaps(&self, other: &FaceRegion) -> bool {
        let x_overlap = self.x < other.x + other.width && other.x < self.x + self.width;
        let y_overlap = self.y < other.y + other.height && other.y < self.y + self.height;
        x_overlap && y_overlap
    }
}

/// Region detection seam
pub trait RegionDetector: Send + Sync {
    /// Detect face regions in a grayscale frame
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceRegion>, VisionError>;
}

/// Model input side length (square)
const MODEL_INPUT_PX: usize = 128;

/// Minimum pixel variance for a window to qualify as facial texture
const TEXTURE_VARIANCE_MIN: f64 = 350.0;

/// Mean-luma band accepted by the fallback scan
const LUMA_BAND: (f64, f64) = (40.0, 220.0);

/// Cascade face detector with heuristic fallback
pub struct CascadeDetector {
    config: DetectorConfig,
    session: Option<Session>,
}

impl CascadeDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, VisionError> {
        let session = if let Some(path) = &config.model_path {
            info!("Loading face detection model from {}", path);
            let session = Session::builder()
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|b| b.commit_from_file(path));
            match session {
                Ok(s) => Some(s),
                Err(e) => {
                    error!("Failed to load face model: {}", e);
                    return Err(VisionError::ModelLoad(e.to_string()));
                }
            }
        } else {
            warn!("No face model configured; using multi-scale texture scan");
            None
        };

        Ok(Self {
            config: config.clone(),
            session,
        })
    }

    /// Run the ONNX model over a resized grayscale tensor and decode
    /// `[score, cx, cy, w, h]` rows (normalized coordinates).
    fn detect_model(
        &self,
        session: &Session,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, VisionError> {
        let img = image::GrayImage::from_raw(width, height, gray.to_vec()).ok_or_else(|| {
            VisionError::ImageProcessing("grayscale buffer does not match dimensions".into())
        })?;
        let resized = image::imageops::resize(
            &img,
            MODEL_INPUT_PX as u32,
            MODEL_INPUT_PX as u32,
            image::imageops::FilterType::Triangle,
        );

        let mut input = Array4::<f32>::zeros((1, 1, MODEL_INPUT_PX, MODEL_INPUT_PX));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = (pixel[0] as f32 / 127.5) - 1.0;
        }

        let outputs = session
            .run(ort::inputs![input].map_err(|e| VisionError::Inference(e.to_string()))?)
            .map_err(|e| VisionError::Inference(e.to_string()))?;

        let (_, value) = outputs
            .iter()
            .next()
            .ok_or_else(|| VisionError::Inference("model returned no outputs".into()))?;
        let tensor = value
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Inference(e.to_string()))?;
        let flat: Vec<f32> = tensor.iter().copied().collect();

        let mut regions = Vec::new();
        for row in flat.chunks_exact(5) {
            let (score, cx, cy, w, h) = (row[0], row[1], row[2], row[3], row[4]);
            if score < self.config.min_confidence {
                continue;
            }
            let rw = (w * width as f32).round().max(0.0) as u32;
            let rh = (h * height as f32).round().max(0.0) as u32;
            if rw < self.config.min_region_px || rh < self.config.min_region_px {
                continue;
            }
            let rx = ((cx * width as f32) - rw as f32 / 2.0).max(0.0) as u32;
            let ry = ((cy * height as f32) - rh as f32 / 2.0).max(0.0) as u32;
            regions.push(FaceRegion {
                x: rx.min(width.saturating_sub(1)),
                y: ry.min(height.saturating_sub(1)),
                width: rw.min(width),
                height: rh.min(height),
            });
        }

        Ok(merge_candidates(regions, 1))
    }

    /// Multi-scale sliding-window scan over an integral image. A window
    /// qualifies when its luma sits in a plausible band and its variance
    /// indicates texture rather than flat background; overlapping hits
    /// across scales vote for a merged region.
    fn detect_fallback(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceRegion> {
        let max_side = width.min(height);
        if max_side < self.config.min_region_px || gray.len() != (width * height) as usize {
            return Vec::new();
        }

        let integral = IntegralImage::new(gray, width, height);
        let mut candidates = Vec::new();

        // Window side never below 8px, so the scale loop always advances
        let mut side = self.config.min_region_px.max(8) as f32;
        while side as u32 <= max_side {
            let s = side as u32;
            let step = (s / 4).max(8);
            let mut y = 0;
            while y + s <= height {
                let mut x = 0;
                while x + s <= width {
                    let (mean, variance) = integral.window_stats(x, y, s, s);
                    if variance >= TEXTURE_VARIANCE_MIN && mean >= LUMA_BAND.0 && mean <= LUMA_BAND.1
                    {
                        candidates.push(FaceRegion {
                            x,
                            y,
                            width: s,
                            height: s,
                        });
                    }
                    x += step;
                }
                y += step;
            }
            side *= self.config.scale_factor.max(1.01);
        }

        merge_candidates(candidates, self.config.min_neighbors as usize)
    }
}

impl RegionDetector for CascadeDetector {
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceRegion>, VisionError> {
        if let Some(session) = &self.session {
            self.detect_model(session, gray, width, height)
        } else {
            Ok(self.detect_fallback(gray, width, height))
        }
    }
}

/// Greedily cluster overlapping candidates; clusters with fewer than
/// `min_neighbors` supporting hits are discarded as noise.
fn merge_candidates(candidates: Vec<FaceRegion>, min_neighbors: usize) -> Vec<FaceRegion> {
    let mut clusters: Vec<(FaceRegion, usize)> = Vec::new();

    for candidate in candidates {
        match clusters.iter_mut().find(|(r, _)| r.overlaps(&candidate)) {
            Some((region, hits)) => {
                // Running average keeps the cluster anchored to its support
                let n = *hits as f32;
                region.x = ((region.x as f32 * n + candidate.x as f32) / (n + 1.0)) as u32;
                region.y = ((region.y as f32 * n + candidate.y as f32) / (n + 1.0)) as u32;
                region.width =
                    ((region.width as f32 * n + candidate.width as f32) / (n + 1.0)) as u32;
                region.height =
                    ((region.height as f32 * n + candidate.height as f32) / (n + 1.0)) as u32;
                *hits += 1;
            }
            None => clusters.push((candidate, 1)),
        }
    }

    clusters
        .into_iter()
        .filter(|(_, hits)| *hits >= min_neighbors.max(1))
        .map(|(region, _)| region)
        .collect()
}

/// Summed-area tables for O(1) window mean/variance
struct IntegralImage {
    width: usize,
    sum: Vec<u64>,
    sum_sq: Vec<u64>,
}

impl IntegralImage {
    fn new(gray: &[u8], width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sum_sq = vec![0u64; stride * (h + 1)];

        for y in 0..h {
            for x in 0..w {
                let v = gray[y * w + x] as u64;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = v + sum[idx - 1] + sum[idx - stride] - sum[idx - stride - 1];
                sum_sq[idx] =
                    v * v + sum_sq[idx - 1] + sum_sq[idx - stride] - sum_sq[idx - stride - 1];
            }
        }

        Self {
            width: w,
            sum,
            sum_sq,
        }
    }

    fn window_stats(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let stride = self.width + 1;
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);

        let area = (w as f64) * (h as f64);
        let total = (self.sum[y1 * stride + x1] + self.sum[y0 * stride + x0]) as f64
            - (self.sum[y0 * stride + x1] + self.sum[y1 * stride + x0]) as f64;
        let total_sq = (self.sum_sq[y1 * stride + x1] + self.sum_sq[y0 * stride + x0]) as f64
            - (self.sum_sq[y0 * stride + x1] + self.sum_sq[y1 * stride + x0]) as f64;

        let mean = total / area;
        let variance = (total_sq / area) - mean * mean;
        (mean, variance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(width: u32, height: u32, luma: u8) -> Vec<u8> {
        vec![luma; (width * height) as usize]
    }

    /// 8px checkerboard block pasted into a flat background
    fn frame_with_textured_block(
        width: u32,
        height: u32,
        bx: u32,
        by: u32,
        side: u32,
    ) -> Vec<u8> {
        let mut gray = flat_frame(width, height, 128);
        for y in by..by + side {
            for x in bx..bx + side {
                let cell = ((x - bx) / 8 + (y - by) / 8) % 2;
                gray[(y * width + x) as usize] = if cell == 0 { 255 } else { 0 };
            }
        }
        gray
    }

    #[test]
    fn test_integral_window_stats() {
        // 2x2 frame: values 10, 20, 30, 40
        let integral = IntegralImage::new(&[10, 20, 30, 40], 2, 2);

        let (mean, variance) = integral.window_stats(0, 0, 2, 2);
        assert!((mean - 25.0).abs() < 1e-9);
        assert!((variance - 125.0).abs() < 1e-9);

        let (mean, variance) = integral.window_stats(1, 1, 1, 1);
        assert!((mean - 40.0).abs() < 1e-9);
        assert!(variance.abs() < 1e-9);
    }

    #[test]
    fn test_flat_frame_yields_no_regions() {
        let detector = CascadeDetector::new(&DetectorConfig::default()).unwrap();
        let gray = flat_frame(256, 256, 128);

        let regions = detector.detect(&gray, 256, 256).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_textured_block_is_detected() {
        let detector = CascadeDetector::new(&DetectorConfig::default()).unwrap();
        let gray = frame_with_textured_block(256, 256, 96, 96, 64);

        let regions = detector.detect(&gray, 256, 256).unwrap();
        assert!(!regions.is_empty());
        assert!(regions
            .iter()
            .any(|r| r.x + r.width > 96 && r.x < 160 && r.y + r.height > 96 && r.y < 160));
    }

    #[test]
    fn test_undersized_frame_yields_no_regions() {
        let detector = CascadeDetector::new(&DetectorConfig::default()).unwrap();
        let gray = flat_frame(16, 16, 128);

        let regions = detector.detect(&gray, 16, 16).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_merge_requires_neighbor_support() {
        let lonely = vec![FaceRegion {
            x: 0,
            y: 0,
            width: 30,
            height: 30,
        }];
        assert!(merge_candidates(lonely, 5).is_empty());

        let supported: Vec<FaceRegion> = (0..6)
            .map(|i| FaceRegion {
                x: i,
                y: i,
                width: 30,
                height: 30,
            })
            .collect();
        assert_eq!(merge_candidates(supported, 5).len(), 1);
    }
}

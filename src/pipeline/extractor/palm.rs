use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::common::{LetterboxInfo, PALM_INPUT_SIZE, letterbox_frame};
use crate::types::Frame;

const PALM_KEYPOINTS: usize = 7;
// SSD layout of the 192×192 MediaPipe palm model: (stride, anchors per cell).
const ANCHOR_LAYERS: &[(u32, usize)] = &[(8, 2), (16, 6)];

#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 32,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: generate_anchors(PALM_INPUT_SIZE),
            cfg,
        })
    }

    /// Palm regions in frame pixels, best score first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = letterbox_frame(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let raw = RawPalmOutput {
            boxes: boxes
                .as_slice()
                .ok_or_else(|| anyhow!("palm boxes not contiguous"))?,
            box_shape: boxes.shape(),
            scores: scores
                .as_slice()
                .ok_or_else(|| anyhow!("palm scores not contiguous"))?,
            score_shape: scores.shape(),
        };

        decode_palms(&raw, &self.anchors, &letterbox, &self.cfg)
    }
}

/// Unit-square anchor centres, in the order the model emits them.
pub fn generate_anchors(input_size: u32) -> Vec<[f32; 2]> {
    let mut anchors = Vec::new();
    for &(stride, per_cell) in ANCHOR_LAYERS {
        let cells = input_size.div_ceil(stride);
        for y in 0..cells {
            for x in 0..cells {
                let center = [
                    (x as f32 + 0.5) / cells as f32,
                    (y as f32 + 0.5) / cells as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}

struct RawPalmOutput<'a> {
    boxes: &'a [f32],
    box_shape: &'a [usize],
    scores: &'a [f32],
    score_shape: &'a [usize],
}

fn trailing_dims(shape: &[usize], what: &str) -> Result<(usize, usize)> {
    match shape {
        [.., anchors, features] => Ok((*anchors, *features)),
        _ => Err(anyhow!("unexpected palm {what} shape {shape:?}")),
    }
}

fn decode_palms(
    raw: &RawPalmOutput<'_>,
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    let (box_anchors, features) = trailing_dims(raw.box_shape, "box")?;
    let (score_anchors, score_features) = trailing_dims(raw.score_shape, "score")?;
    if features < 4 + PALM_KEYPOINTS * 2 {
        return Err(anyhow!("palm box feature dimension too small: {features}"));
    }
    if box_anchors != score_anchors {
        return Err(anyhow!(
            "anchor dimension mismatch between boxes ({box_anchors}) and scores ({score_anchors})"
        ));
    }

    let input = PALM_INPUT_SIZE as f32;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let bias = (letterbox.pad_x / letterbox.scale, letterbox.pad_y / letterbox.scale);
    let to_frame = |ux: f32, uy: f32| (ux * scale - bias.0, uy * scale - bias.1);
    let max = (
        letterbox.orig_w.saturating_sub(1) as f32,
        letterbox.orig_h.saturating_sub(1) as f32,
    );

    let mut candidates = Vec::new();
    for (idx, anchor) in anchors.iter().enumerate().take(box_anchors) {
        let Some(&logit) = raw.scores.get(idx * score_features) else {
            break;
        };
        let score = sigmoid(logit);
        if score < cfg.score_threshold {
            continue;
        }
        let Some(row) = raw.boxes.get(idx * features..idx * features + features) else {
            break;
        };

        let cx = row[0] / input + anchor[0];
        let cy = row[1] / input + anchor[1];
        let (hw, hh) = (row[2] / input / 2.0, row[3] / input / 2.0);
        let (x1, y1) = to_frame(cx - hw, cy - hh);
        let (x2, y2) = to_frame(cx + hw, cy + hh);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        let keypoints = (0..PALM_KEYPOINTS)
            .map(|k| {
                let kx = row[4 + k * 2] / input + anchor[0];
                let ky = row[5 + k * 2] / input + anchor[1];
                to_frame(kx, ky)
            })
            .collect();

        candidates.push(PalmRegion {
            bbox: [
                x1.clamp(0.0, max.0),
                y1.clamp(0.0, max.1),
                x2.clamp(0.0, max.0),
                y2.clamp(0.0, max.1),
            ],
            keypoints,
            score,
        });
    }

    Ok(non_max_suppression(candidates, cfg.nms_threshold, cfg.top_k))
}

fn non_max_suppression(
    mut candidates: Vec<PalmRegion>,
    threshold: f32,
    top_k: usize,
) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if kept.len() >= top_k {
            break;
        }
        if kept.iter().all(|k| iou(&k.bbox, &candidate.bbox) < threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Square crop (centre, side, rotation) that should contain the whole hand.
pub fn crop_from_palm(region: &PalmRegion) -> ((f32, f32), f32, f32) {
    let center = if region.keypoints.is_empty() {
        (
            (region.bbox[0] + region.bbox[2]) * 0.5,
            (region.bbox[1] + region.bbox[3]) * 0.5,
        )
    } else {
        let n = region.keypoints.len() as f32;
        let (sx, sy) = region
            .keypoints
            .iter()
            .fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        (sx / n, sy / n)
    };

    let box_side = (region.bbox[2] - region.bbox[0])
        .abs()
        .max((region.bbox[3] - region.bbox[1]).abs());
    let keypoint_span = region
        .keypoints
        .iter()
        .fold(None, |acc: Option<[f32; 4]>, &(x, y)| {
            Some(match acc {
                None => [x, x, y, y],
                Some([x0, x1, y0, y1]) => [x0.min(x), x1.max(x), y0.min(y), y1.max(y)],
            })
        })
        .map(|[x0, x1, y0, y1]| (x1 - x0).max(y1 - y0))
        .unwrap_or(0.0);
    // Generous margin so finger tips stay inside the crop.
    let side = box_side.max(keypoint_span).max(80.0) * 2.4;

    (center, side, estimate_orientation(region))
}

/// Principal axis of the palm keypoints, rotated so the palm points up.
pub fn estimate_orientation(region: &PalmRegion) -> f32 {
    let points = &region.keypoints;
    if points.len() < 2 {
        return 0.0;
    }

    let n = points.len() as f32;
    let (mx, my) = points
        .iter()
        .fold((0.0, 0.0), |acc, (x, y)| (acc.0 + x / n, acc.1 + y / n));
    let (mut cxx, mut cxy, mut cyy) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in points {
        let (dx, dy) = (x - mx, y - my);
        cxx += dx * dx / n;
        cxy += dx * dy / n;
        cyy += dy * dy / n;
    }

    let half_trace = (cxx + cyy) * 0.5;
    let det = cxx * cyy - cxy * cxy;
    let lambda = (half_trace + (half_trace * half_trace - det).max(0.0).sqrt()).max(1e-6);
    let (vx, vy) = if cxy.abs() > 1e-6 {
        (lambda - cyy, cxy)
    } else if cxx >= cyy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };

    vy.atan2(vx) - PI * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(bbox: [f32; 4], score: f32) -> PalmRegion {
        PalmRegion {
            bbox,
            keypoints: Vec::new(),
            score,
        }
    }

    #[test]
    fn anchors_match_palm_model_layout() {
        let anchors = generate_anchors(PALM_INPUT_SIZE);
        assert_eq!(anchors.len(), 24 * 24 * 2 + 12 * 12 * 6);
        assert_eq!(anchors[0], [0.5 / 24.0, 0.5 / 24.0]);
        assert_eq!(anchors[1], anchors[0]);
        assert_eq!(anchors[24 * 24 * 2], [0.5 / 12.0, 0.5 / 12.0]);
    }

    #[test]
    fn nms_keeps_best_of_overlapping_boxes() {
        let kept = non_max_suppression(
            vec![
                region([0.0, 0.0, 10.0, 10.0], 0.6),
                region([1.0, 1.0, 11.0, 11.0], 0.9),
                region([50.0, 50.0, 60.0, 60.0], 0.7),
            ],
            0.3,
            8,
        );
        let scores: Vec<f32> = kept.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn decodes_single_confident_anchor() {
        let anchors = generate_anchors(PALM_INPUT_SIZE);
        let n = anchors.len();
        let features = 18;
        let mut boxes = vec![0.0f32; n * features];
        let mut scores = vec![-10.0f32; n];
        let hit = 300;
        boxes[hit * features + 2] = 48.0;
        boxes[hit * features + 3] = 48.0;
        scores[hit] = 4.0;

        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 192,
            orig_h: 192,
        };
        let raw = RawPalmOutput {
            boxes: &boxes,
            box_shape: &[1, n, features],
            scores: &scores,
            score_shape: &[1, n, 1],
        };
        let palms = decode_palms(&raw, &anchors, &letterbox, &PalmDetectorConfig::default())
            .unwrap();

        assert_eq!(palms.len(), 1);
        let [x1, _, x2, _] = palms[0].bbox;
        assert!((x2 - x1 - 48.0).abs() < 1e-3);
        assert_eq!(palms[0].keypoints.len(), PALM_KEYPOINTS);
    }

    #[test]
    fn crop_is_never_smaller_than_minimum() {
        let small = region([10.0, 10.0, 20.0, 20.0], 0.9);
        let (center, side, angle) = crop_from_palm(&small);
        assert_eq!(center, (15.0, 15.0));
        assert!((side - 80.0 * 2.4).abs() < 1e-3);
        assert_eq!(angle, 0.0);
    }
}

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    Extraction, LandmarkExtractor,
    common::{self, CropTransform, HANDPOSE_INPUT_SIZE},
    palm::{PalmDetector, PalmDetectorConfig, PalmRegion, crop_from_palm},
};
use crate::{
    config::ModelPaths,
    pipeline::skeleton,
    types::{Frame, LandmarkVector, MAX_HANDS},
};

#[derive(Clone, Debug)]
pub struct OrtHandExtractorConfig {
    pub max_hands: usize,
    pub min_detection_confidence: f32,
    pub palm: PalmDetectorConfig,
}

impl Default for OrtHandExtractorConfig {
    fn default() -> Self {
        Self {
            max_hands: MAX_HANDS,
            min_detection_confidence: 0.5,
            palm: PalmDetectorConfig::default(),
        }
    }
}

/// Palm detector + hand landmark estimator on ONNX Runtime.
pub struct OrtHandExtractor {
    handpose: Session,
    palm_detector: PalmDetector,
    cfg: OrtHandExtractorConfig,
}

struct DetectedHand {
    landmarks: Vec<[f32; 3]>,
    transform: CropTransform,
}

impl OrtHandExtractor {
    pub fn new(models: &ModelPaths, cfg: OrtHandExtractorConfig) -> Result<Self> {
        let handpose = load_session(&models.handpose_estimator)?;
        let palm_detector = PalmDetector::new(&models.palm_detector, cfg.palm.clone())?;
        log::info!(
            "handpose ORT backend ready using {} and palm detector {}",
            models.handpose_estimator.display(),
            models.palm_detector.display()
        );

        Ok(Self {
            handpose,
            palm_detector,
            cfg,
        })
    }

    fn estimate_hand(&mut self, frame: &Frame, palm: &PalmRegion) -> Result<Option<DetectedHand>> {
        let (center, side, angle) = crop_from_palm(palm);
        let (input, transform) =
            common::rotated_crop(frame, center, side, angle, HANDPOSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flattened)?;

        let confidence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };

        if (confidence * palm.score).clamp(0.0, 1.0) < self.cfg.min_detection_confidence {
            return Ok(None);
        }

        Ok(Some(DetectedHand {
            landmarks,
            transform,
        }))
    }
}

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))
}

impl LandmarkExtractor for OrtHandExtractor {
    fn extract(&mut self, mut frame: Frame) -> Result<Extraction> {
        let palms = self.palm_detector.detect(&frame)?;
        if palms.is_empty() {
            return Ok(Extraction::none(frame));
        }

        let mut hands = Vec::new();
        for palm in palms.iter().take(self.cfg.max_hands) {
            match self.estimate_hand(&frame, palm) {
                Ok(Some(hand)) => hands.push(hand),
                Ok(None) => {}
                Err(err) => log::warn!("handpose inference failed: {err:?}"),
            }
        }

        // Overlays go on only after every crop has been sampled.
        let mut landmarks = LandmarkVector::empty();
        for hand in &hands {
            let normalized: Vec<[f32; 3]> = hand
                .landmarks
                .iter()
                .map(|&p| hand.transform.normalize(p))
                .collect();
            landmarks.extend_hand(&normalized);

            let projected: Vec<(f32, f32)> = hand
                .landmarks
                .iter()
                .map(|&[x, y, _]| hand.transform.project(x, y))
                .collect();
            skeleton::draw_hand(&mut frame, &projected);
        }

        Ok(Extraction { frame, landmarks })
    }
}

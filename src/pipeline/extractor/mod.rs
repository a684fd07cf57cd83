mod common;
mod ort;
mod palm;

use anyhow::Result;

use crate::types::{Frame, LandmarkVector};

pub use self::ort::{OrtHandExtractor, OrtHandExtractorConfig};

/// Result of running hand detection on one frame.
#[derive(Clone, Debug)]
pub struct Extraction {
    /// The input frame with hand overlays drawn for the preview.
    pub frame: Frame,
    /// Empty when no hand was found, otherwise 63 values per hand.
    pub landmarks: LandmarkVector,
}

impl Extraction {
    pub fn none(frame: Frame) -> Self {
        Self {
            frame,
            landmarks: LandmarkVector::empty(),
        }
    }
}

pub trait LandmarkExtractor {
    fn extract(&mut self, frame: Frame) -> Result<Extraction>;
}

impl<E: LandmarkExtractor + ?Sized> LandmarkExtractor for Box<E> {
    fn extract(&mut self, frame: Frame) -> Result<Extraction> {
        (**self).extract(frame)
    }
}

use std::path::PathBuf;

/// Landmarks produced per hand: 21 keypoints × (x, y, z).
pub const LANDMARKS_PER_HAND: usize = 63;
pub const MAX_HANDS: usize = 2;
pub const FRAMES_PER_RECORDING: usize = 30;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
        }
    }

    /// Opaque black frame, mostly useful for scripted sources.
    pub fn blank(width: u32, height: u32) -> Self {
        let mut rgba = vec![0u8; width as usize * height as usize * 4];
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self::new(rgba, width, height)
    }
}

/// Flattened (x, y, z) triples for every hand detected in one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkVector(Vec<f32>);

impl LandmarkVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn hand_count(&self) -> usize {
        self.0.len() / LANDMARKS_PER_HAND
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn extend_hand(&mut self, hand: &[[f32; 3]]) {
        for point in hand {
            self.0.extend_from_slice(point);
        }
    }
}

/// One finished recording: exactly [`FRAMES_PER_RECORDING`] non-empty vectors.
#[derive(Clone, Debug)]
pub struct LandmarkSequence {
    frames: Vec<LandmarkVector>,
}

impl LandmarkSequence {
    /// Returns `None` unless the buffer is a complete recording.
    pub fn from_frames(frames: Vec<LandmarkVector>) -> Option<Self> {
        if frames.len() != FRAMES_PER_RECORDING || frames.iter().any(LandmarkVector::is_empty) {
            return None;
        }
        Some(Self { frames })
    }

    pub fn frames(&self) -> &[LandmarkVector] {
        &self.frames
    }

    /// Widest row; narrower rows are zero-padded to this when persisted.
    pub fn row_width(&self) -> usize {
        self.frames.iter().map(LandmarkVector::len).max().unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorCommand {
    Start,
    Cancel,
    Continue,
    Stop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureStatus {
    Waiting { label: String, index: u32 },
    Recording { label: String, index: u32, captured: usize, total: usize },
    AwaitingConfirmation { label: String, saved: bool },
    Finished,
}

impl CaptureStatus {
    pub fn headline(&self) -> String {
        match self {
            CaptureStatus::Waiting { .. } => "Press SPACE to record".to_string(),
            CaptureStatus::Recording {
                captured, total, ..
            } => format!("Recording: frame {captured}/{total}"),
            CaptureStatus::AwaitingConfirmation { .. } => {
                "Continue with the next recording? (s/n)".to_string()
            }
            CaptureStatus::Finished => "Collection finished".to_string(),
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            CaptureStatus::Waiting { label, index }
            | CaptureStatus::Recording { label, index, .. } => {
                Some(format!("'{label}' recording #{index} · Q to cancel"))
            }
            CaptureStatus::AwaitingConfirmation { label, saved } => Some(if *saved {
                format!("'{label}': recording saved")
            } else {
                format!("'{label}': recording not saved")
            }),
            CaptureStatus::Finished => None,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, CaptureStatus::Recording { .. })
    }
}

#[derive(Clone, Debug)]
pub struct PreviewUpdate {
    pub frame: Option<Frame>,
    pub status: CaptureStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Saved(PathBuf),
    Cancelled,
    CameraFailed,
    Stalled,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Saved(_))
    }
}

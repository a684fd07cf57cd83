#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod extractor;
#[cfg(feature = "camera-nokhwa")]
pub mod rgba_converter;
pub mod skeleton;

use anyhow::Result;
#[cfg(not(feature = "camera-nokhwa"))]
use anyhow::anyhow;

use crate::types::Frame;

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{NokhwaCamera, describe_cameras};
pub use extractor::{Extraction, LandmarkExtractor, OrtHandExtractor};

/// A live stream of frames. Implementations release their device on drop.
pub trait FrameSource {
    /// Next captured frame; an error ends the recording session.
    fn read(&mut self) -> Result<Frame>;
}

#[cfg(feature = "camera-nokhwa")]
pub fn open_camera(index: u32) -> Result<NokhwaCamera> {
    NokhwaCamera::open(index)
}

/// Stand-in device type for builds without a camera backend.
#[cfg(not(feature = "camera-nokhwa"))]
pub enum NoCamera {}

#[cfg(not(feature = "camera-nokhwa"))]
impl FrameSource for NoCamera {
    fn read(&mut self) -> Result<Frame> {
        match *self {}
    }
}

#[cfg(not(feature = "camera-nokhwa"))]
pub fn open_camera(index: u32) -> Result<NoCamera> {
    Err(anyhow!(
        "camera {index} unavailable: built without the camera-nokhwa feature"
    ))
}

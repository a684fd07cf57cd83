use anyhow::{Result, anyhow};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType,
    },
};

use super::{FrameSource, rgba_converter};
use crate::types::Frame;

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 3] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

pub fn describe_cameras() -> Result<Vec<String>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras.iter().map(format_camera_label).collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    format!("{} ({})", info.human_name(), info.index())
}

/// Exclusive handle on a capture device; the stream is closed on drop.
pub struct NokhwaCamera {
    camera: Camera,
}

impl NokhwaCamera {
    pub fn open(index: u32) -> Result<Self> {
        let index = CameraIndex::Index(index);
        let mut last_err: Option<anyhow::Error> = None;

        for requested in requested_formats() {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => {
                        log::debug!(
                            "camera {index} streaming {}",
                            camera.camera_format()
                        );
                        return Ok(Self { camera });
                    }
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow!("failed to open camera {index} with any supported format")))
    }
}

impl FrameSource for NokhwaCamera {
    fn read(&mut self) -> Result<Frame> {
        let buffer = self.camera.frame()?;
        rgba_converter::convert_camera_frame(&buffer)
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            log::warn!("failed to release camera: {err:?}");
        }
    }
}

//! Capture device acquisition and the frame source abstraction.
//!
//! Sessions depend on [`DeviceProvider`]/[`FrameSource`] rather than a concrete
//! camera backend, so tests can script frame delivery. The production
//! implementation wraps nokhwa.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::{query, Camera};

use crate::config::CameraSection;
use crate::errors::ScanError;
use crate::types::Frame;

/// A stream of frames from one opened capture device.
///
/// Owned by the capture thread; `next_frame` blocks until the device produces
/// a frame or fails.
pub trait FrameSource: Send {
    fn device_id(&self) -> &str;
    fn start(&mut self) -> Result<(), ScanError>;
    fn next_frame(&mut self) -> Result<Frame, ScanError>;
    fn stop(&mut self);
}

/// Opens the default capture device and its input stream.
pub trait DeviceProvider: Send + Sync {
    fn open_default(&self, camera: &CameraSection) -> Result<Box<dyn FrameSource>, ScanError>;
}

/// Production provider backed by nokhwa.
#[derive(Debug, Default)]
pub struct NokhwaDeviceProvider;

impl DeviceProvider for NokhwaDeviceProvider {
    fn open_default(&self, camera: &CameraSection) -> Result<Box<dyn FrameSource>, ScanError> {
        let index = match camera.device_index {
            Some(index) => CameraIndex::Index(index),
            None => {
                let devices = query(ApiBackend::Auto).map_err(|e| {
                    ScanError::DeviceUnavailable(format!("Failed to query capture devices: {}", e))
                })?;
                let first = devices.first().ok_or_else(|| {
                    ScanError::DeviceUnavailable("No video capture device present".to_string())
                })?;
                log::info!("Selected default capture device: {}", first.human_name());
                first.index().clone()
            }
        };

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
        let device_id = index.to_string();
        let camera = Camera::new(index, requested).map_err(|e| {
            ScanError::DeviceUnavailable(format!(
                "Failed to open capture device {}: {}",
                device_id, e
            ))
        })?;

        Ok(Box::new(NokhwaFrameSource {
            camera,
            device_id,
            sequence: 0,
        }))
    }
}

/// nokhwa-backed frame source, decoding every frame to RGB8.
pub struct NokhwaFrameSource {
    camera: Camera,
    device_id: String,
    sequence: u64,
}

impl FrameSource for NokhwaFrameSource {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn start(&mut self) -> Result<(), ScanError> {
        self.camera.open_stream().map_err(|e| {
            ScanError::DeviceUnavailable(format!("Failed to start camera stream: {}", e))
        })
    }

    fn next_frame(&mut self) -> Result<Frame, ScanError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| ScanError::DeviceUnavailable(format!("Failed to capture frame: {}", e)))?;

        let decoded = buffer.decode_image::<RgbFormat>().map_err(|e| {
            ScanError::DeviceUnavailable(format!("Failed to decode frame buffer: {}", e))
        })?;

        self.sequence += 1;
        let (width, height) = (decoded.width(), decoded.height());
        let frame = Frame::new(decoded.into_raw(), width, height, self.device_id.clone())
            .with_sequence(self.sequence);

        Ok(frame)
    }

    fn stop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::debug!("Failed to stop camera stream: {}", e);
        }
    }
}

impl Drop for NokhwaFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// The capture thread is the sole owner after open; nokhwa's camera handle is
// moved there once and never shared.
unsafe impl Send for NokhwaFrameSource {}

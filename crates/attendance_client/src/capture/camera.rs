//! crates/attendance_client/src/capture/camera.rs
//!
//! The device seam of the capture loop: a camera that can be opened into a
//! video stream, and the raw frames that stream hands out.

use async_trait::async_trait;

use super::CaptureError;

/// Which physical camera to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    /// The rear camera, pointed away from the operator.
    #[default]
    Environment,
    User,
}

/// One RGBA8 frame, row-major, four bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(CaptureError::Device(format!(
                "frame of {width}x{height} needs {expected} bytes, got {}",
                rgba.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// Builds an opaque frame from one luma byte per pixel.
    pub fn from_luma(width: u32, height: u32, luma: &[u8]) -> Result<Self, CaptureError> {
        let rgba = luma.iter().flat_map(|&l| [l, l, l, 255]).collect();
        Self::new(width, height, rgba)
    }

    /// BT.601 luma, one byte per pixel.
    pub fn to_luma(&self) -> Vec<u8> {
        self.rgba
            .chunks_exact(4)
            .map(|px| {
                let y = 299 * u32::from(px[0]) + 587 * u32::from(px[1]) + 114 * u32::from(px[2]);
                (y / 1000) as u8
            })
            .collect()
    }
}

#[async_trait]
pub trait Camera: Send + Sync {
    /// Requests access to a camera and starts streaming from it.
    async fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>, CaptureError>;
}

pub trait VideoStream: Send {
    /// The most recent frame, or `None` while the stream does not have enough
    /// data buffered yet.
    fn current_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Stops every track of the stream. Must be safe to call more than once.
    fn stop(&mut self);
}

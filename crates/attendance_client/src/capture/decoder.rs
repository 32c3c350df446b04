//! crates/attendance_client/src/capture/decoder.rs

use super::camera::Frame;

/// One decoding pass over a frame.
pub trait QrDecoder: Send + Sync {
    /// The payload of the first readable QR code in the frame, if any.
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// `QrDecoder` backed by the `rqrr` grid detector. Only dark-on-light codes
/// are attempted; inverted codes are not searched for.
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        let width = frame.width as usize;
        let height = frame.height as usize;
        if width == 0 || height == 0 {
            return None;
        }
        let luma = frame.to_luma();
        let mut image =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| luma[y * width + x]);
        image
            .detect_grids()
            .into_iter()
            .filter_map(|grid| grid.decode().ok())
            .map(|(_meta, content)| content.trim().to_string())
            .find(|content| !content.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_frames_decode_to_nothing() {
        let frame = Frame::from_luma(64, 64, &[255; 64 * 64]).unwrap();
        assert_eq!(RqrrDecoder.decode(&frame), None);

        let empty = Frame::new(0, 0, Vec::new()).unwrap();
        assert_eq!(RqrrDecoder.decode(&empty), None);
    }
}

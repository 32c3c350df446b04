//! Scripted camera and decoder doubles shared by the scanner and desk tests.

use super::{Camera, CaptureError, Facing, Frame, QrDecoder, VideoStream};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Frames whose first luma byte is 0 carry the payload in their width.
pub(crate) struct MarkerDecoder {
    pub(crate) calls: Arc<AtomicUsize>,
}

impl MarkerDecoder {
    pub(crate) fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl QrDecoder for MarkerDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (frame.to_luma().first() == Some(&0)).then(|| format!("STU{}", frame.width))
    }
}

pub(crate) struct ScriptedStream {
    frames: VecDeque<Result<Option<Frame>, CaptureError>>,
    stopped: Arc<AtomicBool>,
}

impl VideoStream for ScriptedStream {
    fn current_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.frames.pop_front().unwrap_or(Ok(None))
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct FakeCamera {
    outcome: Mutex<Option<Result<ScriptedStream, CaptureError>>>,
    pub(crate) requested: Mutex<Option<Facing>>,
}

impl FakeCamera {
    pub(crate) fn streaming(
        frames: Vec<Result<Option<Frame>, CaptureError>>,
        stopped: Arc<AtomicBool>,
    ) -> Self {
        Self {
            outcome: Mutex::new(Some(Ok(ScriptedStream {
                frames: frames.into(),
                stopped,
            }))),
            requested: Mutex::new(None),
        }
    }

    pub(crate) fn failing(error: CaptureError) -> Self {
        Self {
            outcome: Mutex::new(Some(Err(error))),
            requested: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Camera for FakeCamera {
    async fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>, CaptureError> {
        *self.requested.lock().unwrap() = Some(facing);
        match self.outcome.lock().unwrap().take() {
            Some(Ok(stream)) => Ok(Box::new(stream)),
            Some(Err(e)) => Err(e),
            None => Err(CaptureError::NoCamera),
        }
    }
}

pub(crate) fn blank(width: u32) -> Frame {
    Frame::from_luma(width, 1, &vec![255; width as usize]).unwrap()
}

pub(crate) fn marked(width: u32) -> Frame {
    let mut luma = vec![255; width as usize];
    luma[0] = 0;
    Frame::from_luma(width, 1, &luma).unwrap()
}

//! crates/attendance_client/src/capture/mod.rs
//!
//! The QR capture loop. A scan session opens the camera, then on every frame
//! tick grabs the current frame and runs one decoding pass over it. The first
//! payload found ends the session; the caller starts a new session to scan
//! again. The session is cancelled through a `CancellationToken`, and the
//! camera stream is stopped on every exit path.

pub mod camera;
pub mod decoder;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use camera::{Camera, Facing, Frame, VideoStream};
pub use decoder::{QrDecoder, RqrrDecoder};

/// Roughly one decoding attempt per display refresh.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Shorter intervals are raised to this; the ticker cannot run at zero.
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Camera permission was denied")]
    PermissionDenied,
    #[error("No camera is available")]
    NoCamera,
    #[error("The camera stream ended")]
    StreamEnded,
    #[error("Camera error: {0}")]
    Device(String),
}

impl CaptureError {
    /// Text suitable for showing to the operator.
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::PermissionDenied | CaptureError::NoCamera => {
                "Unable to access camera. Please ensure you have granted permissions.".to_string()
            }
            CaptureError::StreamEnded => "The camera stopped unexpectedly.".to_string(),
            CaptureError::Device(message) => format!("Camera error: {message}"),
        }
    }
}

/// The observable state of the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    RequestingCamera,
    Streaming,
    Decoding,
    Recognized(String),
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub facing: Facing,
    pub frame_interval: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            facing: Facing::Environment,
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

pub struct Scanner {
    camera: Arc<dyn Camera>,
    decoder: Arc<dyn QrDecoder>,
    config: ScanConfig,
    state: watch::Sender<ScanState>,
}

impl Scanner {
    pub fn new(camera: Arc<dyn Camera>, decoder: Arc<dyn QrDecoder>) -> Self {
        Self::with_config(camera, decoder, ScanConfig::default())
    }

    pub fn with_config(
        camera: Arc<dyn Camera>,
        decoder: Arc<dyn QrDecoder>,
        mut config: ScanConfig,
    ) -> Self {
        config.frame_interval = config.frame_interval.max(MIN_FRAME_INTERVAL);
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            camera,
            decoder,
            config,
            state,
        }
    }

    /// Follows state changes, for rendering the scanner overlay.
    pub fn subscribe(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ScanState {
        self.state.borrow().clone()
    }

    pub fn config(&self) -> ScanConfig {
        self.config
    }

    fn set_state(&self, state: ScanState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    /// Runs one scan session.
    ///
    /// Returns `Ok(Some(payload))` for a recognized code, `Ok(None)` when
    /// `cancel` fires first, and the camera error when the camera cannot be
    /// opened or fails mid-stream. Errors are not retried.
    pub async fn scan(&self, cancel: CancellationToken) -> Result<Option<String>, CaptureError> {
        self.set_state(ScanState::RequestingCamera);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.set_state(ScanState::Cancelled);
                return Ok(None);
            }
            opened = self.camera.open(self.config.facing) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Camera unavailable: {}", e);
                self.set_state(ScanState::Failed(e.user_message()));
                return Err(e);
            }
        };

        self.set_state(ScanState::Streaming);
        let result = self.decode_frames(stream.as_mut(), &cancel).await;
        stream.stop();

        match &result {
            Ok(Some(payload)) => {
                info!("QR code recognized");
                self.set_state(ScanState::Recognized(payload.clone()));
            }
            Ok(None) => self.set_state(ScanState::Cancelled),
            Err(e) => {
                warn!("Scan stopped: {}", e);
                self.set_state(ScanState::Failed(e.user_message()));
            }
        }
        result
    }

    async fn decode_frames(
        &self,
        stream: &mut dyn VideoStream,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, CaptureError> {
        let mut ticker = tokio::time::interval(self.config.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                _ = ticker.tick() => {}
            }

            let Some(frame) = stream.current_frame()? else {
                continue;
            };
            self.set_state(ScanState::Decoding);
            if let Some(payload) = self.decoder.decode(&frame) {
                return Ok(Some(payload));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{blank, marked, FakeCamera, MarkerDecoder};
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn fast() -> ScanConfig {
        ScanConfig {
            facing: Facing::Environment,
            frame_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn first_payload_ends_the_session_and_stops_the_camera() {
        let stopped = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let camera = Arc::new(FakeCamera::streaming(
            vec![Ok(None), Ok(Some(blank(3))), Ok(Some(marked(7))), Ok(Some(marked(9)))],
            stopped.clone(),
        ));
        let scanner = Scanner::with_config(
            camera.clone(),
            Arc::new(MarkerDecoder {
                calls: calls.clone(),
            }),
            fast(),
        );

        let result = scanner.scan(CancellationToken::new()).await;

        assert_eq!(result, Ok(Some("STU7".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(scanner.state(), ScanState::Recognized("STU7".to_string()));
        assert_eq!(*camera.requested.lock().unwrap(), Some(Facing::Environment));
    }

    #[tokio::test]
    async fn cancellation_stops_tracks_and_decoding() {
        let stopped = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let scanner = Scanner::with_config(
            Arc::new(FakeCamera::streaming(Vec::new(), stopped.clone())),
            Arc::new(MarkerDecoder {
                calls: calls.clone(),
            }),
            fast(),
        );
        let cancel = CancellationToken::new();
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        };

        let (result, ()) = tokio::join!(scanner.scan(cancel.clone()), canceller);

        assert_eq!(result, Ok(None));
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(scanner.state(), ScanState::Cancelled);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_opens_the_camera() {
        let camera = Arc::new(FakeCamera::failing(CaptureError::NoCamera));
        let scanner = Scanner::with_config(
            camera.clone(),
            Arc::new(MarkerDecoder {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            fast(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(scanner.scan(cancel).await, Ok(None));
        assert_eq!(*camera.requested.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn permission_denial_is_reported_and_not_retried() {
        let camera = Arc::new(FakeCamera::failing(CaptureError::PermissionDenied));
        let scanner = Scanner::with_config(
            camera,
            Arc::new(MarkerDecoder {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            fast(),
        );
        let mut states = scanner.subscribe();

        let result = scanner.scan(CancellationToken::new()).await;

        assert_eq!(result, Err(CaptureError::PermissionDenied));
        assert!(states.has_changed().unwrap());
        assert_eq!(
            *states.borrow_and_update(),
            ScanState::Failed(
                "Unable to access camera. Please ensure you have granted permissions.".to_string()
            )
        );
    }

    #[tokio::test]
    async fn stream_failure_mid_scan_still_stops_the_camera() {
        let stopped = Arc::new(AtomicBool::new(false));
        let scanner = Scanner::with_config(
            Arc::new(FakeCamera::streaming(
                vec![Ok(Some(blank(2))), Err(CaptureError::StreamEnded)],
                stopped.clone(),
            )),
            Arc::new(MarkerDecoder {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            fast(),
        );

        assert_eq!(
            scanner.scan(CancellationToken::new()).await,
            Err(CaptureError::StreamEnded)
        );
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn zero_frame_interval_is_raised_to_the_minimum() {
        let stopped = Arc::new(AtomicBool::new(false));
        let scanner = Scanner::with_config(
            Arc::new(FakeCamera::streaming(
                vec![Ok(Some(marked(4)))],
                stopped.clone(),
            )),
            Arc::new(MarkerDecoder {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            ScanConfig {
                facing: Facing::Environment,
                frame_interval: Duration::ZERO,
            },
        );
        assert_eq!(scanner.config().frame_interval, MIN_FRAME_INTERVAL);

        assert_eq!(
            scanner.scan(CancellationToken::new()).await,
            Ok(Some("STU4".to_string()))
        );
        assert!(stopped.load(Ordering::SeqCst));
    }
}

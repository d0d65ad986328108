use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const DEFAULT_MAX_DIMENSION: u32 = 2048;
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 60_000;

/// Camera capability.
///
/// Lifecycle contract: once `Open` succeeds, the shell holds a live device
/// stream until it receives `StopStream`. The core is responsible for
/// issuing `StopStream` on every exit path from the capture view —
/// cancel, successful capture, error, reset.
#[derive(Clone)]
pub struct Camera<E> {
    context: CapabilityContext<CameraOperation, E>,
}

impl<Ev> Capability<Ev> for Camera<Ev> {
    type Operation = CameraOperation;
    type MappedSelf<MappedEv> = Camera<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Camera::new(self.context.map_event(f))
    }
}

impl<E> Camera<E>
where
    E: 'static,
{
    pub fn new(context: CapabilityContext<CameraOperation, E>) -> Self {
        Self { context }
    }

    /// Ask the shell to open the rear camera preview.
    pub fn open<F>(&self, config: CaptureConfig, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        let config = config.validated();
        self.request(CameraOperation::Open { config }, callback);
    }

    /// Capture a still frame from the open preview.
    pub fn capture<F>(&self, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::Capture, callback);
    }

    /// Release the device stream. Safe to issue when no stream is open;
    /// the shell answers `Stopped` either way.
    pub fn stop_stream<F>(&self, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        self.request(CameraOperation::StopStream, callback);
    }

    fn request<F>(&self, operation: CameraOperation, callback: F)
    where
        F: FnOnce(CameraResult) -> E + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let response = context.request_from_shell(operation).await;
            context.update_app(callback(response));
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraOperation {
    Open { config: CaptureConfig },
    Capture,
    StopStream,
}

impl Operation for CameraOperation {
    type Output = CameraResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraFacing {
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub facing: CameraFacing,
    pub jpeg_quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            facing: CameraFacing::Back,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_width: DEFAULT_MAX_DIMENSION,
            max_height: DEFAULT_MAX_DIMENSION,
            timeout_ms: DEFAULT_CAPTURE_TIMEOUT_MS,
        }
    }
}

impl CaptureConfig {
    pub fn with_facing(mut self, facing: CameraFacing) -> Self {
        self.facing = facing;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.min(100);
        self
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = width.max(1);
        self.max_height = height.max(1);
        self
    }

    pub fn validated(mut self) -> Self {
        self.jpeg_quality = self.jpeg_quality.min(100);
        self.max_width = self.max_width.max(1);
        self.max_height = self.max_height.max(1);
        self.timeout_ms = self.timeout_ms.clamp(1_000, 300_000);
        self
    }
}

/// A captured frame as handed over by the shell.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPhoto {
    pub mime_type: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for CapturedPhoto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedPhoto")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraOutput {
    Opened,
    Photo(CapturedPhoto),
    Cancelled,
    Stopped,
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("capture failed: {reason}")]
    CaptureFailed { reason: String },
    #[error("capture timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl CameraError {
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

pub type CameraResult = Result<CameraOutput, CameraError>;

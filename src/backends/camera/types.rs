// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the camera device layer

//! Shared types for camera backends

use super::sdk::{PropertyId, SdkError};
use image::{DynamicImage, RgbImage, imageops};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// RGB8 pixel buffer
///
/// Used both for decoded photos and for live view frames. Double buffers
/// exchange frames by swapping, so the default (empty) frame is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB8 pixels, `width * height * 3` bytes
    pub data: Vec<u8>,
    /// When the frame was produced
    pub captured_at: Instant,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
            captured_at: Instant::now(),
        }
    }
}

impl Frame {
    /// Create a frame from packed RGB8 data
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at: Instant::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode an encoded image (JPEG, PNG, ...) into RGB8 pixels
    pub fn decode(encoded: &[u8]) -> Result<Self, image::ImageError> {
        let decoded = image::load_from_memory(encoded)?;
        Ok(Self::from_rgb_image(decoded.into_rgb8()))
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    /// View this frame as an `image` buffer (copies the pixels)
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Rotate in place; frames with inconsistent dimensions are left untouched
    pub fn rotate(&mut self, orientation: Orientation) {
        let expected = self.width as usize * self.height as usize * 3;
        if orientation == Orientation::None || self.is_empty() || self.data.len() != expected {
            return;
        }
        let captured_at = self.captured_at;
        let Some(image) = RgbImage::from_raw(self.width, self.height, std::mem::take(&mut self.data))
        else {
            return;
        };
        let rotated = match orientation {
            Orientation::None => image,
            Orientation::Rotate90 => imageops::rotate90(&image),
            Orientation::Rotate180 => imageops::rotate180(&image),
            Orientation::Rotate270 => imageops::rotate270(&image),
        };
        *self = Self::from_rgb_image(rotated);
        self.captured_at = captured_at;
    }

    /// Encode into a `DynamicImage` for saving
    pub fn to_dynamic_image(&self) -> Option<DynamicImage> {
        self.to_rgb_image().map(DynamicImage::ImageRgb8)
    }
}

/// Rotation applied to photos and live view frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// No rotation
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl Orientation {
    /// Create rotation from an integer degree value (normalised to 0-360)
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Orientation::Rotate90,
            180 => Orientation::Rotate180,
            270 => Orientation::Rotate270,
            _ => Orientation::None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Orientation::None => 0,
            Orientation::Rotate90 => 90,
            Orientation::Rotate180 => 180,
            Orientation::Rotate270 => 270,
        }
    }
}

/// Which exposure parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    Iso,
    Aperture,
    ShutterSpeed,
}

impl ParameterKind {
    pub const ALL: [ParameterKind; 3] = [
        ParameterKind::Iso,
        ParameterKind::Aperture,
        ParameterKind::ShutterSpeed,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ParameterKind::Iso => "ISO",
            ParameterKind::Aperture => "Aperture",
            ParameterKind::ShutterSpeed => "Shutter speed",
        }
    }
}

/// Semantic value of an exposure parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameter {
    /// ISO sensitivity, 0 means automatic
    Iso(u32),
    /// f-number
    Aperture(f32),
    /// Exposure time in seconds, 0 means bulb
    ShutterSpeed(f32),
}

impl Parameter {
    pub fn kind(&self) -> ParameterKind {
        match self {
            Parameter::Iso(_) => ParameterKind::Iso,
            Parameter::Aperture(_) => ParameterKind::Aperture,
            Parameter::ShutterSpeed(_) => ParameterKind::ShutterSpeed,
        }
    }

    pub fn as_iso(&self) -> Option<u32> {
        match self {
            Parameter::Iso(iso) => Some(*iso),
            _ => None,
        }
    }

    pub fn as_aperture(&self) -> Option<f32> {
        match self {
            Parameter::Aperture(aperture) => Some(*aperture),
            _ => None,
        }
    }

    pub fn as_shutter_speed(&self) -> Option<f32> {
        match self {
            Parameter::ShutterSpeed(seconds) => Some(*seconds),
            _ => None,
        }
    }
}

/// Snapshot of the cached exposure settings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraSettings {
    pub iso: u32,
    pub aperture: f32,
    pub shutter_speed: f32,
}

impl CameraSettings {
    pub fn get(&self, kind: ParameterKind) -> Parameter {
        match kind {
            ParameterKind::Iso => Parameter::Iso(self.iso),
            ParameterKind::Aperture => Parameter::Aperture(self.aperture),
            ParameterKind::ShutterSpeed => Parameter::ShutterSpeed(self.shutter_speed),
        }
    }

    pub fn set(&mut self, value: Parameter) {
        match value {
            Parameter::Iso(iso) => self.iso = iso,
            Parameter::Aperture(aperture) => self.aperture = aperture,
            Parameter::ShutterSpeed(seconds) => self.shutter_speed = seconds,
        }
    }
}

/// Lifecycle of the most recent capture request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureStatus {
    #[default]
    NoCaptureTriggered,
    WaitingForPhotoDownload,
    CaptureFailed,
    CaptureSucceeded,
}

/// Lens metadata stored in a photo
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhotoMetadata {
    pub focal_length: f32,
    pub focal_length_min: f32,
    pub focal_length_max: f32,
}

/// A downloaded and decoded photo
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    /// Bytes exactly as transferred from the camera
    pub encoded: Arc<[u8]>,
    /// Decoded RGB8 pixels
    pub pixels: Frame,
    /// Best-effort lens metadata
    pub metadata: Option<PhotoMetadata>,
    /// File name on the camera, when known
    pub file_name: Option<String>,
}

/// Why a capture did not produce a photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// A capture was already waiting for its download
    Busy,
    /// The shutter command was rejected
    Command(SdkError),
    /// The camera reported a capture failure after the shutter fired
    Hardware(SdkError),
    /// Downloading the file failed
    Transfer(SdkError),
    /// The downloaded bytes could not be decoded
    Decode(String),
    /// No file arrived within the capture timeout
    Timeout,
    /// The device was closed while the capture was outstanding
    Closed,
    /// The device went away without resolving the capture
    Abandoned,
    /// Network transport failure (remote cameras)
    Transport(String),
}

impl CaptureError {
    /// Underlying hardware code, if any
    pub fn sdk_error(&self) -> Option<SdkError> {
        match self {
            CaptureError::Busy => Some(SdkError::DEVICE_BUSY),
            CaptureError::Command(code)
            | CaptureError::Hardware(code)
            | CaptureError::Transfer(code) => Some(*code),
            _ => None,
        }
    }
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::Busy => write!(f, "Camera is busy with a previous capture"),
            CaptureError::Command(code) => write!(f, "Take picture command failed: {}", code),
            CaptureError::Hardware(code) => write!(f, "Camera reported capture error: {}", code),
            CaptureError::Transfer(code) => write!(f, "Photo download failed: {}", code),
            CaptureError::Decode(msg) => write!(f, "Photo decode failed: {}", msg),
            CaptureError::Timeout => write!(f, "Timed out waiting for photo"),
            CaptureError::Closed => write!(f, "Device closed before photo arrived"),
            CaptureError::Abandoned => write!(f, "Capture abandoned by device"),
            CaptureError::Transport(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Result of one capture request
pub type PhotoCaptureResult = Result<CapturedPhoto, CaptureError>;

/// Battery state as reported by the camera
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatteryLevel {
    #[default]
    Unknown,
    /// Running from an external power supply
    ExternalPower,
    Percent(u32),
}

/// Identity and owner metadata of a device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub description: String,
    pub port: String,
    pub maker_name: String,
    pub owner_name: String,
    pub artist: String,
    pub copyright: String,
    pub battery_level: BatteryLevel,
    /// Battery health from 0.25 (worst) to 1.0 (best)
    pub battery_quality: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LensInfo {
    pub attached: bool,
    pub name: String,
}

/// Notification raised by a device on its owning thread
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A lens was attached or removed
    LensChanged(LensInfo),
    /// A property was re-read from hardware
    PropertyChanged(PropertyId),
    /// The set of valid values of a property changed
    OptionsChanged(PropertyId),
    /// A photo arrived that no capture request was waiting for
    UnrequestedPhoto(CapturedPhoto),
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Failed to initialize backend
    InitializationFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// A hardware call failed
    Sdk(SdkError),
    /// The value has no hardware encoding
    UnsupportedValue(String),
    /// Device session is not open
    NotConnected,
    /// Live view has not been enabled
    LiveViewDisabled,
    /// The owning thread is gone
    Disconnected,
    /// Blocking request issued from the owning thread itself
    WouldDeadlock,
    /// Backend crashed or became unresponsive
    Crashed(String),
    /// Network transport failure
    Transport(String),
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::Sdk(code) => write!(f, "Camera SDK error: {}", code),
            BackendError::UnsupportedValue(msg) => write!(f, "Unsupported value: {}", msg),
            BackendError::NotConnected => write!(f, "Camera session is not open"),
            BackendError::LiveViewDisabled => write!(f, "Live view is not enabled"),
            BackendError::Disconnected => write!(f, "Camera thread is no longer running"),
            BackendError::WouldDeadlock => {
                write!(f, "Blocking request issued from the camera's own thread")
            }
            BackendError::Crashed(msg) => write!(f, "Backend crashed: {}", msg),
            BackendError::Transport(msg) => write!(f, "Transport error: {}", msg),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<SdkError> for BackendError {
    fn from(err: SdkError) -> Self {
        BackendError::Sdk(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rotate_swaps_dimensions() {
        let mut frame = Frame::new(2, 1, vec![255, 0, 0, 0, 0, 255]);
        frame.rotate(Orientation::Rotate90);
        assert_eq!((frame.width, frame.height), (1, 2));
        assert_eq!(frame.data, vec![255, 0, 0, 0, 0, 255]);

        let mut frame = Frame::new(2, 1, vec![255, 0, 0, 0, 0, 255]);
        frame.rotate(Orientation::Rotate180);
        assert_eq!(frame.data, vec![0, 0, 255, 255, 0, 0]);
    }

    #[test]
    fn test_frame_to_dynamic_image() {
        let frame = Frame::new(2, 1, vec![255, 0, 0, 0, 0, 255]);
        let image = frame.to_dynamic_image().unwrap();
        assert_eq!((image.width(), image.height()), (2, 1));
        assert_eq!(image.to_rgb8().into_raw(), frame.data);

        // Pixel count does not match the dimensions
        let truncated = Frame::new(2, 2, vec![0; 6]);
        assert!(truncated.to_dynamic_image().is_none());
    }

    #[test]
    fn test_orientation_from_degrees() {
        assert_eq!(Orientation::from_degrees(-90), Orientation::Rotate270);
        assert_eq!(Orientation::from_degrees(450), Orientation::Rotate90);
        assert_eq!(Orientation::from_degrees(45), Orientation::None);
    }

    #[test]
    fn test_capture_error_codes() {
        assert_eq!(CaptureError::Busy.sdk_error(), Some(SdkError::DEVICE_BUSY));
        assert_eq!(
            CaptureError::Transfer(SdkError::COMM_DISCONNECTED).sdk_error(),
            Some(SdkError::COMM_DISCONNECTED)
        );
        assert_eq!(CaptureError::Timeout.sdk_error(), None);
    }

    #[test]
    fn test_settings_get_set() {
        let mut settings = CameraSettings::default();
        settings.set(Parameter::Iso(400));
        settings.set(Parameter::ShutterSpeed(0.5));
        assert_eq!(settings.get(ParameterKind::Iso), Parameter::Iso(400));
        assert_eq!(settings.shutter_speed, 0.5);
        assert_eq!(settings.aperture, 0.0);
    }
}

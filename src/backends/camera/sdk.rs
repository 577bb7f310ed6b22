// SPDX-License-Identifier: GPL-3.0-only

//! Hardware SDK boundary
//!
//! Everything the device layer needs from a vendor camera SDK is expressed
//! here as traits and plain value types. A binding to a real SDK implements
//! [`CameraSdk`] and [`SdkCamera`]; the crate ships a simulated implementation
//! in [`super::simulated`].
//!
//! The SDK invokes [`SdkEventHandler`] callbacks from inside
//! [`SdkCamera::pump_events`] or from a thread of its own, so handlers must be
//! `Send + Sync` and must never touch the camera directly.

use std::fmt;
use std::sync::Arc;

/// Numeric error code reported by the hardware SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SdkError(pub u32);

impl SdkError {
    pub const INTERNAL_ERROR: Self = Self(0x0000_0002);
    pub const NOT_SUPPORTED: Self = Self(0x0000_0007);
    pub const PROPERTIES_UNAVAILABLE: Self = Self(0x0000_0050);
    pub const DEVICE_NOT_FOUND: Self = Self(0x0000_0080);
    pub const DEVICE_BUSY: Self = Self(0x0000_0081);
    pub const COMM_DISCONNECTED: Self = Self(0x0000_00C1);
    pub const SESSION_NOT_OPEN: Self = Self(0x0000_2003);
    pub const TAKE_PICTURE_AF_NG: Self = Self(0x0000_8D01);
    pub const OBJECT_NOT_READY: Self = Self(0x0000_A102);

    /// Raw numeric code
    pub fn code(&self) -> u32 {
        self.0
    }

    /// Symbolic name of the code, or "UNKNOWN"
    pub fn name(&self) -> &'static str {
        match *self {
            Self::INTERNAL_ERROR => "INTERNAL_ERROR",
            Self::NOT_SUPPORTED => "NOT_SUPPORTED",
            Self::PROPERTIES_UNAVAILABLE => "PROPERTIES_UNAVAILABLE",
            Self::DEVICE_NOT_FOUND => "DEVICE_NOT_FOUND",
            Self::DEVICE_BUSY => "DEVICE_BUSY",
            Self::COMM_DISCONNECTED => "COMM_DISCONNECTED",
            Self::SESSION_NOT_OPEN => "SESSION_NOT_OPEN",
            Self::TAKE_PICTURE_AF_NG => "TAKE_PICTURE_AF_NG",
            Self::OBJECT_NOT_READY => "OBJECT_NOT_READY",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

impl std::error::Error for SdkError {}

/// Result type for raw SDK calls
pub type SdkResult<T> = Result<T, SdkError>;

/// Numeric camera property identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyId(pub u32);

impl PropertyId {
    pub const OWNER_NAME: Self = Self(0x0000_0004);
    pub const MAKER_NAME: Self = Self(0x0000_0005);
    pub const BATTERY_LEVEL: Self = Self(0x0000_0008);
    pub const SAVE_TO: Self = Self(0x0000_000B);
    pub const BATTERY_QUALITY: Self = Self(0x0000_0010);
    pub const ISO_SPEED: Self = Self(0x0000_0402);
    pub const AV: Self = Self(0x0000_0405);
    pub const TV: Self = Self(0x0000_0406);
    pub const FOCAL_LENGTH: Self = Self(0x0000_0409);
    pub const LENS_NAME: Self = Self(0x0000_040D);
    pub const LENS_STATUS: Self = Self(0x0000_0416);
    pub const ARTIST: Self = Self(0x0000_0418);
    pub const COPYRIGHT: Self = Self(0x0000_0419);
    pub const EVF_OUTPUT_DEVICE: Self = Self(0x0000_0500);
    pub const EVF_MODE: Self = Self(0x0000_0501);

    pub fn name(&self) -> &'static str {
        match *self {
            Self::OWNER_NAME => "OwnerName",
            Self::MAKER_NAME => "MakerName",
            Self::BATTERY_LEVEL => "BatteryLevel",
            Self::SAVE_TO => "SaveTo",
            Self::BATTERY_QUALITY => "BatteryQuality",
            Self::ISO_SPEED => "ISOSpeed",
            Self::AV => "Av",
            Self::TV => "Tv",
            Self::FOCAL_LENGTH => "FocalLength",
            Self::LENS_NAME => "LensName",
            Self::LENS_STATUS => "LensStatus",
            Self::ARTIST => "Artist",
            Self::COPYRIGHT => "Copyright",
            Self::EVF_OUTPUT_DEVICE => "Evf_OutputDevice",
            Self::EVF_MODE => "Evf_Mode",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.0)
    }
}

/// Values for [`PropertyId::SAVE_TO`]
pub mod save_to {
    pub const CAMERA: u32 = 1;
    pub const HOST: u32 = 2;
    pub const BOTH: u32 = CAMERA | HOST;
}

/// Bits for [`PropertyId::EVF_OUTPUT_DEVICE`]
pub mod evf_output {
    pub const TFT: u32 = 1;
    pub const PC: u32 = 2;
}

/// Typed property payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    UInt(u32),
    Text(String),
}

impl PropertyValue {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            PropertyValue::UInt(value) => Some(*value),
            PropertyValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            PropertyValue::UInt(_) => None,
        }
    }
}

/// Rational number as stored in image metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rational {
    pub numerator: i32,
    pub denominator: u32,
}

impl Rational {
    pub fn new(numerator: i32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Value as float; zero denominators yield 0.0
    pub fn to_f32(self) -> f32 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f32 / self.denominator as f32
        }
    }
}

/// Commands sent with [`SdkCamera::send_command`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraCommand {
    TakePicture,
    /// Keep-alive: postpones the camera's auto power-off
    ExtendShutDownTimer,
}

/// Commands sent with [`SdkCamera::send_status_command`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCommand {
    UiLock,
    UiUnlock,
}

/// Free space advertised to the camera when saving to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub number_of_free_clusters: u32,
    pub bytes_per_sector: u32,
    pub reset: bool,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            number_of_free_clusters: 0x7FFF_FFFF,
            bytes_per_sector: 0x1000,
            reset: true,
        }
    }
}

/// Identity of a connected camera as reported by the SDK
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdkDeviceInfo {
    pub description: String,
    pub port: String,
}

/// Handle to a file on the camera that can be downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryItem {
    pub handle: u64,
    pub file_name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEvent {
    /// A new file was created in the camera's storage
    DirItemCreated,
    DirItemRemoved,
    /// A file is waiting to be transferred to the host
    DirItemRequestTransfer,
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyEvent {
    PropertyChanged,
    /// The list of valid values for a property changed
    PropertyDescChanged,
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Shutdown,
    /// Auto power-off is imminent
    WillSoonShutDown,
    ShutDownTimerUpdate,
    /// The camera failed to complete a capture; the parameter holds the code
    CaptureError,
    Other(u32),
}

/// Callback surface invoked by the SDK
pub trait SdkEventHandler: Send + Sync {
    fn handle_object_event(&self, event: ObjectEvent, item: Option<DirectoryItem>);
    fn handle_property_event(&self, event: PropertyEvent, property: PropertyId, param: u32);
    fn handle_state_event(&self, event: StateEvent, param: u32);
}

/// One camera as exposed by the SDK
///
/// Apart from [`SdkCamera::set_event_handler`], every method must be called
/// from the thread that owns the device.
pub trait SdkCamera: Send {
    fn device_info(&self) -> SdkResult<SdkDeviceInfo>;

    /// Register (or clear) the single event handler for this camera
    fn set_event_handler(&mut self, handler: Option<Arc<dyn SdkEventHandler>>);

    // ===== Session =====

    fn open_session(&mut self) -> SdkResult<()>;
    fn close_session(&mut self) -> SdkResult<()>;

    // ===== Commands =====

    fn send_command(&mut self, command: CameraCommand) -> SdkResult<()>;
    fn send_status_command(&mut self, command: StatusCommand) -> SdkResult<()>;
    fn set_capacity(&mut self, capacity: Capacity) -> SdkResult<()>;

    // ===== Properties =====

    fn get_property(&self, property: PropertyId) -> SdkResult<PropertyValue>;
    fn set_property(&mut self, property: PropertyId, value: PropertyValue) -> SdkResult<()>;

    /// Encoded values currently accepted for `property`
    fn property_options(&self, property: PropertyId) -> SdkResult<Vec<u32>>;

    // ===== Transfer =====

    /// Download a file from the camera and return its encoded bytes
    fn download(&mut self, item: &DirectoryItem) -> SdkResult<Vec<u8>>;

    /// Download the current live view frame (JPEG)
    ///
    /// Returns [`SdkError::OBJECT_NOT_READY`] when no new frame is available yet.
    fn download_live_view(&mut self) -> SdkResult<Vec<u8>>;

    /// Focal length triple (current, min, max) stored in an encoded image
    fn image_focal_length(&self, encoded: &[u8]) -> SdkResult<[Rational; 3]>;

    /// Deliver queued events to the registered handler
    fn pump_events(&mut self);
}

/// Entry point of an SDK: enumerates attached cameras
pub trait CameraSdk: Send + Sync {
    fn list_cameras(&self) -> SdkResult<Vec<Box<dyn SdkCamera>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_error_display() {
        assert_eq!(
            SdkError::DEVICE_BUSY.to_string(),
            "DEVICE_BUSY (0x00000081)"
        );
        assert_eq!(SdkError(0x1234).name(), "UNKNOWN");
    }

    #[test]
    fn test_property_names() {
        assert_eq!(PropertyId::ISO_SPEED.name(), "ISOSpeed");
        assert_eq!(PropertyId(0xdead).name(), "Unknown");
    }

    #[test]
    fn test_rational() {
        assert_eq!(Rational::new(50, 1).to_f32(), 50.0);
        assert_eq!(Rational::new(35, 0).to_f32(), 0.0);
    }
}

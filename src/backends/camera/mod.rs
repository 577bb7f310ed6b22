// SPDX-License-Identifier: GPL-3.0-only

//! Camera backends
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Caller (CLI, UI)   │
//! └──────────┬──────────┘
//!            │  CameraControl
//!            ▼
//! ┌─────────────────────┐
//! │    Camera (enum)    │  ← Tethered | Remote, chosen at construction
//! └─────┬─────────┬─────┘
//!       │         │
//!       ▼         ▼
//! ┌───────────┐ ┌──────────────┐
//! │CameraThread│ │ RemoteCamera │  ← own thread each, double-buffered output
//! └─────┬─────┘ └──────┬───────┘
//!       ▼              ▼
//!   Device ◀─ EventDispatcher    RemoteTransport (HTTP)
//!       │
//!       ▼
//!   SdkCamera (hardware SDK boundary)
//! ```

pub mod camera_thread;
pub mod codec;
pub mod device;
pub mod double_buffer;
pub mod events;
pub mod frame_loop;
pub mod property_cache;
pub mod remote;
pub mod sdk;
pub mod simulated;
pub mod types;

pub use camera_thread::{CameraThread, CameraThreadSettings};
pub use device::{Device, DeviceHandle, DeviceSettings, PendingCapture};
pub use remote::{RemoteCamera, RemoteSettings};
pub use types::*;

use sdk::CameraSdk;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which kind of camera connection to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraBackendType {
    /// USB tethered camera, photos only
    #[default]
    Tethered,
    /// USB tethered camera streaming live view
    LiveView,
    /// Camera on the network
    Remote,
}

impl CameraBackendType {
    pub fn display_name(&self) -> &'static str {
        match self {
            CameraBackendType::Tethered => "Tethered",
            CameraBackendType::LiveView => "Live view",
            CameraBackendType::Remote => "Remote",
        }
    }
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Operations every camera backend provides
///
/// Setup and teardown run the backend's own thread; everything else is
/// called from the caller's thread.
pub trait CameraControl {
    fn backend_type(&self) -> CameraBackendType;

    /// Connect to the camera
    ///
    /// # Returns
    /// * `Ok(())` - The camera is open and its thread running
    /// * `Err(BackendError)` - Connecting failed; nothing is left running
    fn setup(&mut self) -> BackendResult<()>;

    /// Disconnect; safe to call repeatedly
    fn close(&mut self);

    /// Pick up photos and frames published since the last call
    fn update(&mut self);

    fn is_connected(&self) -> bool;

    /// Request a photo; it arrives through `update`
    fn take_photo(&mut self) -> BackendResult<()>;

    fn capture_status(&self) -> CaptureStatus;

    /// Whether the last `update` brought a new photo
    fn is_photo_new(&self) -> bool;

    fn photo(&self) -> Option<&CapturedPhoto>;

    fn last_capture_error(&self) -> Option<CaptureError>;

    /// Latest live view frame, for backends that stream one
    fn live_view(&self) -> Option<&Frame> {
        None
    }

    fn camera_settings(&self) -> CameraSettings;

    /// Write an exposure setting
    ///
    /// With `snap_to_option` the value is first moved to the closest value
    /// the camera currently accepts. Returns the value actually written.
    fn set_parameter(&mut self, value: Parameter, snap_to_option: bool) -> BackendResult<Parameter>;

    fn parameter_options(&self, kind: ParameterKind) -> BackendResult<Vec<Parameter>>;
}

impl CameraControl for CameraThread {
    fn backend_type(&self) -> CameraBackendType {
        if self.settings().live_view {
            CameraBackendType::LiveView
        } else {
            CameraBackendType::Tethered
        }
    }

    fn setup(&mut self) -> BackendResult<()> {
        CameraThread::setup(self)
    }

    fn close(&mut self) {
        CameraThread::close(self)
    }

    fn update(&mut self) {
        CameraThread::update(self)
    }

    fn is_connected(&self) -> bool {
        CameraThread::is_connected(self)
    }

    fn take_photo(&mut self) -> BackendResult<()> {
        CameraThread::take_photo(self, false)
    }

    fn capture_status(&self) -> CaptureStatus {
        CameraThread::capture_status(self)
    }

    fn is_photo_new(&self) -> bool {
        CameraThread::is_photo_new(self)
    }

    fn photo(&self) -> Option<&CapturedPhoto> {
        CameraThread::photo(self)
    }

    fn last_capture_error(&self) -> Option<CaptureError> {
        CameraThread::last_capture_error(self)
    }

    fn live_view(&self) -> Option<&Frame> {
        let frame = CameraThread::live_view(self);
        (!frame.is_empty()).then_some(frame)
    }

    fn camera_settings(&self) -> CameraSettings {
        CameraThread::camera_settings(self)
    }

    fn set_parameter(&mut self, value: Parameter, snap_to_option: bool) -> BackendResult<Parameter> {
        CameraThread::set_parameter(self, value, snap_to_option)
    }

    fn parameter_options(&self, kind: ParameterKind) -> BackendResult<Vec<Parameter>> {
        CameraThread::parameter_options(self, kind)
    }
}

impl CameraControl for RemoteCamera {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Remote
    }

    fn setup(&mut self) -> BackendResult<()> {
        RemoteCamera::setup(self)
    }

    fn close(&mut self) {
        RemoteCamera::close(self)
    }

    fn update(&mut self) {
        RemoteCamera::update(self)
    }

    fn is_connected(&self) -> bool {
        RemoteCamera::is_connected(self)
    }

    fn take_photo(&mut self) -> BackendResult<()> {
        RemoteCamera::take_photo(self, true)
    }

    fn capture_status(&self) -> CaptureStatus {
        RemoteCamera::capture_status(self)
    }

    fn is_photo_new(&self) -> bool {
        RemoteCamera::is_photo_new(self)
    }

    fn photo(&self) -> Option<&CapturedPhoto> {
        RemoteCamera::photo(self)
    }

    fn last_capture_error(&self) -> Option<CaptureError> {
        RemoteCamera::last_capture_error(self)
    }

    fn camera_settings(&self) -> CameraSettings {
        RemoteCamera::camera_settings(self)
    }

    fn set_parameter(&mut self, value: Parameter, snap_to_option: bool) -> BackendResult<Parameter> {
        RemoteCamera::set_parameter(self, value, snap_to_option)
    }

    fn parameter_options(&self, kind: ParameterKind) -> BackendResult<Vec<Parameter>> {
        RemoteCamera::parameter_options(self, kind)
    }
}

/// One camera of any supported kind
pub enum Camera {
    Tethered(CameraThread),
    Remote(RemoteCamera),
}

impl Camera {
    /// Tethered camera from `sdk`, streaming live view when `settings.live_view` is set
    pub fn tethered(sdk: Arc<dyn CameraSdk>, settings: CameraThreadSettings) -> Self {
        Camera::Tethered(CameraThread::new(sdk, settings))
    }

    pub fn remote(settings: RemoteSettings) -> Self {
        Camera::Remote(RemoteCamera::new(settings))
    }

    fn control(&self) -> &dyn CameraControl {
        match self {
            Camera::Tethered(camera) => camera,
            Camera::Remote(camera) => camera,
        }
    }

    fn control_mut(&mut self) -> &mut dyn CameraControl {
        match self {
            Camera::Tethered(camera) => camera,
            Camera::Remote(camera) => camera,
        }
    }

    /// Human readable name of the connected camera
    pub fn description(&self) -> String {
        match self {
            Camera::Tethered(camera) => camera
                .device_info()
                .map(|info| info.description)
                .unwrap_or_default(),
            Camera::Remote(camera) => camera.device_info().description(),
        }
    }
}

impl CameraControl for Camera {
    fn backend_type(&self) -> CameraBackendType {
        self.control().backend_type()
    }

    fn setup(&mut self) -> BackendResult<()> {
        self.control_mut().setup()
    }

    fn close(&mut self) {
        self.control_mut().close()
    }

    fn update(&mut self) {
        self.control_mut().update()
    }

    fn is_connected(&self) -> bool {
        self.control().is_connected()
    }

    fn take_photo(&mut self) -> BackendResult<()> {
        self.control_mut().take_photo()
    }

    fn capture_status(&self) -> CaptureStatus {
        self.control().capture_status()
    }

    fn is_photo_new(&self) -> bool {
        self.control().is_photo_new()
    }

    fn photo(&self) -> Option<&CapturedPhoto> {
        self.control().photo()
    }

    fn last_capture_error(&self) -> Option<CaptureError> {
        self.control().last_capture_error()
    }

    fn live_view(&self) -> Option<&Frame> {
        self.control().live_view()
    }

    fn camera_settings(&self) -> CameraSettings {
        self.control().camera_settings()
    }

    fn set_parameter(&mut self, value: Parameter, snap_to_option: bool) -> BackendResult<Parameter> {
        self.control_mut().set_parameter(value, snap_to_option)
    }

    fn parameter_options(&self, kind: ParameterKind) -> BackendResult<Vec<Parameter>> {
        self.control().parameter_options(kind)
    }
}

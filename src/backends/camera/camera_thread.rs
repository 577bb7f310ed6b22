// SPDX-License-Identifier: GPL-3.0-only

//! Camera thread supervisor
//!
//! [`CameraThread`] runs a [`Device`] on a dedicated thread and exposes its
//! output to a caller thread (typically a UI or render loop):
//!
//! ```text
//!  camera thread                         caller thread
//!  ─────────────                         ─────────────
//!  service pending photo ─┐
//!  drain device events    ├─▶ photo load ──swap──▶ ready ──swap──▶ photo
//!  device.update()        │
//!  fetch live view ───────┴─▶ lv load ─────swap──▶ ready ──swap──▶ live view
//!  sleep                                                 update() sets is_new
//! ```
//!
//! The device is created, opened and closed on the camera thread. The
//! caller reaches it only through a [`DeviceHandle`].

use super::codec;
use super::device::{Device, DeviceHandle, DeviceSettings, PendingCapture};
use super::double_buffer::DoubleBuffer;
use super::frame_loop::{CaptureLoopController, LoopAction};
use super::sdk::CameraSdk;
use super::types::*;
use crate::constants::timing::{CAMERA_LOOP_INTERVAL, FRAMERATE_WINDOW};
use crate::errors::{AppError, AppResult};
use crate::storage;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const CAMERA_THREAD_NAME: &str = "camera-owner";

/// How the camera thread opens and drives its device
#[derive(Debug, Clone)]
pub struct CameraThreadSettings {
    /// Index into the SDK's camera list
    pub device_index: usize,
    /// Stream live view frames
    pub live_view: bool,
    /// Keep the camera's own screen on while streaming
    pub show_live_view_on_camera: bool,
    /// Rotation applied to photos and live view frames
    pub orientation: Orientation,
    /// Sleep between loop iterations
    pub loop_interval: Duration,
    pub device: DeviceSettings,
}

impl Default for CameraThreadSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            live_view: false,
            show_live_view_on_camera: false,
            orientation: Orientation::None,
            loop_interval: CAMERA_LOOP_INTERVAL,
            device: DeviceSettings::default(),
        }
    }
}

/// Non-blocking capture waiting for its download
struct QueuedCapture {
    pending: PendingCapture,
    deadline: Instant,
}

/// State shared between the camera thread and the caller
struct SharedState {
    orientation: Orientation,
    photo: DoubleBuffer<Option<CapturedPhoto>>,
    live_view: DoubleBuffer<Frame>,
    /// Capture requested with `take_photo(false)`, serviced by the loop
    pending_photo: Mutex<Option<QueuedCapture>>,
    last_error: Mutex<Option<CaptureError>>,
    lens_changed: AtomicBool,
    iso_changed: AtomicBool,
    aperture_changed: AtomicBool,
    shutter_speed_changed: AtomicBool,
    options_changed: AtomicBool,
}

impl SharedState {
    fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            photo: DoubleBuffer::default(),
            live_view: DoubleBuffer::default(),
            pending_photo: Mutex::new(None),
            last_error: Mutex::new(None),
            lens_changed: AtomicBool::new(false),
            iso_changed: AtomicBool::new(false),
            aperture_changed: AtomicBool::new(false),
            shutter_speed_changed: AtomicBool::new(false),
            options_changed: AtomicBool::new(false),
        }
    }

    fn process_capture_result(&self, result: PhotoCaptureResult) {
        let mut last_error = self.last_error.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(mut photo) => {
                photo.pixels.rotate(self.orientation);
                *last_error = None;
                self.photo.publish(&mut Some(photo));
            }
            Err(e) => {
                warn!(error = %e, "Photo capture failed");
                *last_error = Some(e);
            }
        }
    }

    /// Publish the queued capture once it resolves or its deadline passes
    ///
    /// Runs on the camera thread only.
    fn service_pending_photo(&self, device: &mut Device) {
        let result = {
            let mut slot = self
                .pending_photo
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(queued) = slot.as_mut() else {
                return;
            };
            let mut result = queued.pending.try_take();
            if result.is_none() && Instant::now() >= queued.deadline {
                warn!("No photo announced before the capture deadline");
                device.fail_capture(CaptureError::Timeout);
                result = queued.pending.try_take();
            }
            if result.is_some() {
                *slot = None;
            }
            result
        };
        if let Some(result) = result {
            self.process_capture_result(result);
        }
    }

    /// Queue a non-blocking capture, or publish it if it already resolved
    fn queue_capture(&self, device: &mut Device) {
        // A capture resolved earlier in this same drain is still in the slot
        self.service_pending_photo(device);

        let mut pending = device.take_photo_async();
        match pending.try_take() {
            // Rejected right away (busy, shutter failure)
            Some(result) => self.process_capture_result(result),
            None => {
                let deadline = Instant::now() + device.capture_timeout();
                *self
                    .pending_photo
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) =
                    Some(QueuedCapture { pending, deadline });
            }
        }
    }
}

/// Thread-local state of the camera thread
struct CameraWorker {
    device: Device,
    events: Receiver<DeviceEvent>,
    shared: Arc<SharedState>,
    live_view_load: Frame,
    loop_interval: Duration,
}

impl CameraWorker {
    fn tick(&mut self) -> LoopAction {
        self.service_pending_photo();
        self.drain_events();
        self.device.update();
        self.pull_live_view();
        thread::sleep(self.loop_interval);
        LoopAction::Continue
    }

    fn service_pending_photo(&mut self) {
        self.shared.service_pending_photo(&mut self.device);
    }

    fn drain_events(&mut self) {
        let events: Vec<DeviceEvent> = self.events.try_iter().collect();
        for event in events {
            match event {
                DeviceEvent::UnrequestedPhoto(photo) => self.shared.process_capture_result(Ok(photo)),
                DeviceEvent::LensChanged(_) => self.shared.lens_changed.store(true, Ordering::Release),
                DeviceEvent::OptionsChanged(_) => {
                    self.shared.options_changed.store(true, Ordering::Release)
                }
                DeviceEvent::PropertyChanged(property) => {
                    let flag = match codec::kind_for(property) {
                        Some(ParameterKind::Iso) => &self.shared.iso_changed,
                        Some(ParameterKind::Aperture) => &self.shared.aperture_changed,
                        Some(ParameterKind::ShutterSpeed) => &self.shared.shutter_speed_changed,
                        None => continue,
                    };
                    flag.store(true, Ordering::Release);
                }
            }
        }
    }

    fn pull_live_view(&mut self) {
        if !self.device.is_live_view_enabled() {
            return;
        }
        match self.device.live_view_frame(&mut self.live_view_load) {
            Ok(true) => {
                self.live_view_load.rotate(self.shared.orientation);
                self.shared.live_view.publish(&mut self.live_view_load);
            }
            Ok(false) => {}
            Err(e) => debug!(error = %e, "Live view frame unavailable"),
        }
    }

    fn shutdown(mut self) {
        self.device.close();
        // Resolve a capture that close() just failed
        self.service_pending_photo();
    }
}

/// Live view frame rate over a sliding window
#[derive(Debug, Default)]
struct FramerateCounter {
    stamps: VecDeque<Instant>,
}

impl FramerateCounter {
    fn tick(&mut self, at: Instant) {
        self.stamps.push_back(at);
        while self.stamps.len() > FRAMERATE_WINDOW {
            self.stamps.pop_front();
        }
    }

    fn fps(&self) -> f32 {
        match (self.stamps.front(), self.stamps.back()) {
            (Some(first), Some(last)) if self.stamps.len() > 1 => {
                let elapsed = last.duration_since(*first).as_secs_f32();
                if elapsed > 0.0 {
                    (self.stamps.len() - 1) as f32 / elapsed
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

/// A tethered camera driven from its own thread
pub struct CameraThread {
    sdk: Arc<dyn CameraSdk>,
    settings: CameraThreadSettings,
    shared: Arc<SharedState>,
    controller: Option<CaptureLoopController>,
    handle: Option<DeviceHandle>,
    photo: Option<CapturedPhoto>,
    live_view: Frame,
    framerate: FramerateCounter,
    photo_is_new: bool,
    live_view_is_new: bool,
    lens_is_new: bool,
    iso_is_new: bool,
    aperture_is_new: bool,
    shutter_speed_is_new: bool,
    options_are_new: bool,
}

impl CameraThread {
    /// Create an idle supervisor; nothing runs until [`CameraThread::setup`]
    pub fn new(sdk: Arc<dyn CameraSdk>, settings: CameraThreadSettings) -> Self {
        let shared = Arc::new(SharedState::new(settings.orientation));
        Self {
            sdk,
            settings,
            shared,
            controller: None,
            handle: None,
            photo: None,
            live_view: Frame::default(),
            framerate: FramerateCounter::default(),
            photo_is_new: false,
            live_view_is_new: false,
            lens_is_new: false,
            iso_is_new: false,
            aperture_is_new: false,
            shutter_speed_is_new: false,
            options_are_new: false,
        }
    }

    pub fn settings(&self) -> &CameraThreadSettings {
        &self.settings
    }

    /// Start the camera thread and open the configured device
    ///
    /// Blocks until the device is open or opening failed. On failure the
    /// thread has already exited.
    pub fn setup(&mut self) -> BackendResult<()> {
        self.close();

        let shared = Arc::new(SharedState::new(self.settings.orientation));
        let sdk = Arc::clone(&self.sdk);
        let settings = self.settings.clone();
        let worker_shared = Arc::clone(&shared);

        let init = move || -> BackendResult<(CameraWorker, DeviceHandle)> {
            let cameras = sdk.list_cameras()?;
            let count = cameras.len();
            let camera = cameras
                .into_iter()
                .nth(settings.device_index)
                .ok_or_else(|| {
                    BackendError::DeviceNotFound(format!(
                        "camera {} requested, {} attached",
                        settings.device_index, count
                    ))
                })?;

            let mut device = Device::new(camera, settings.device.clone());
            let events = device.subscribe();
            device.open()?;

            if settings.live_view
                && let Err(e) =
                    device.set_live_view_enabled(true, settings.show_live_view_on_camera)
            {
                warn!(error = %e, "Failed to enable live view");
            }

            let handle = device.handle();
            let worker = CameraWorker {
                device,
                events,
                shared: worker_shared,
                live_view_load: Frame::default(),
                loop_interval: settings.loop_interval,
            };
            Ok((worker, handle))
        };

        match CaptureLoopController::start_with_init(
            CAMERA_THREAD_NAME,
            init,
            CameraWorker::tick,
            CameraWorker::shutdown,
        ) {
            Ok((controller, handle)) => {
                info!(index = self.settings.device_index, "Camera thread running");
                self.shared = shared;
                self.controller = Some(controller);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!(index = self.settings.device_index, error = %e, "Camera setup failed");
                Err(e)
            }
        }
    }

    /// Stop the camera thread and close the device; safe to call repeatedly
    pub fn close(&mut self) {
        self.handle = None;
        if let Some(mut controller) = self.controller.take() {
            info!("Stopping camera thread");
            controller.stop();
        }
    }

    pub fn is_connected(&self) -> bool {
        let running = self
            .controller
            .as_ref()
            .is_some_and(CaptureLoopController::is_running);
        running && self.handle.as_ref().is_some_and(DeviceHandle::is_open)
    }

    /// Handle for running work on the camera thread
    pub fn device(&self) -> BackendResult<&DeviceHandle> {
        self.handle.as_ref().ok_or(BackendError::NotConnected)
    }

    /// Pick up frames and change flags published since the last call
    pub fn update(&mut self) {
        self.photo_is_new = self.shared.photo.take_new(&mut self.photo);
        self.live_view_is_new = self.shared.live_view.take_new(&mut self.live_view);
        if self.live_view_is_new {
            self.framerate.tick(Instant::now());
        }
        self.lens_is_new = self.shared.lens_changed.swap(false, Ordering::AcqRel);
        self.iso_is_new = self.shared.iso_changed.swap(false, Ordering::AcqRel);
        self.aperture_is_new = self.shared.aperture_changed.swap(false, Ordering::AcqRel);
        self.shutter_speed_is_new = self
            .shared
            .shutter_speed_changed
            .swap(false, Ordering::AcqRel);
        self.options_are_new = self.shared.options_changed.swap(false, Ordering::AcqRel);
    }

    // ===== Capture =====

    /// Request a photo
    ///
    /// With `blocking` the camera thread itself waits for the download,
    /// pausing live view; otherwise the loop keeps running and picks the
    /// photo up when it arrives, failing it with [`CaptureError::Timeout`]
    /// after the device's capture timeout. Either way this call returns
    /// immediately and the photo shows up through [`CameraThread::update`].
    pub fn take_photo(&self, blocking: bool) -> BackendResult<()> {
        let handle = self.device()?;
        let shared = Arc::clone(&self.shared);

        if blocking {
            handle.perform(move |device| {
                let result = device.take_photo();
                shared.process_capture_result(result);
            })
        } else {
            handle.perform(move |device| shared.queue_capture(device))
        }
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.handle
            .as_ref()
            .map(DeviceHandle::capture_status)
            .unwrap_or_default()
    }

    pub fn is_photo_new(&self) -> bool {
        self.photo_is_new
    }

    /// Most recent photo taken up by [`CameraThread::update`]
    pub fn photo(&self) -> Option<&CapturedPhoto> {
        self.photo.as_ref()
    }

    /// Error of the most recent failed capture, cleared by the next success
    pub fn last_capture_error(&self) -> Option<CaptureError> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Save the current photo to `path`
    pub fn save_photo(&self, path: &Path) -> AppResult<()> {
        let photo = self
            .photo
            .as_ref()
            .ok_or_else(|| AppError::Storage("No photo to save".to_string()))?;
        storage::save_photo(photo, path)
    }

    // ===== Live view =====

    pub fn is_live_view_new(&self) -> bool {
        self.live_view_is_new
    }

    pub fn live_view(&self) -> &Frame {
        &self.live_view
    }

    pub fn live_view_framerate(&self) -> f32 {
        self.framerate.fps()
    }

    pub fn set_live_view_enabled(&mut self, enabled: bool) -> BackendResult<()> {
        let show_on_camera = self.settings.show_live_view_on_camera;
        self.device()?
            .perform_blocking(move |device| device.set_live_view_enabled(enabled, show_on_camera))??;
        self.settings.live_view = enabled;
        Ok(())
    }

    // ===== Settings =====

    pub fn camera_settings(&self) -> CameraSettings {
        self.handle
            .as_ref()
            .map(DeviceHandle::settings)
            .unwrap_or_default()
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.handle.as_ref().map(DeviceHandle::device_info)
    }

    pub fn lens_info(&self) -> Option<LensInfo> {
        self.handle.as_ref().map(DeviceHandle::lens_info)
    }

    /// Write a setting on the camera thread and wait for the outcome
    pub fn set_parameter(&self, value: Parameter, snap_to_option: bool) -> BackendResult<Parameter> {
        self.device()?
            .perform_blocking(move |device| device.set_parameter(value, snap_to_option))?
    }

    pub fn set_iso(&self, iso: u32, snap_to_option: bool) -> BackendResult<u32> {
        let written = self.set_parameter(Parameter::Iso(iso), snap_to_option)?;
        Ok(written.as_iso().unwrap_or(iso))
    }

    pub fn set_aperture(&self, aperture: f32, snap_to_option: bool) -> BackendResult<f32> {
        let written = self.set_parameter(Parameter::Aperture(aperture), snap_to_option)?;
        Ok(written.as_aperture().unwrap_or(aperture))
    }

    pub fn set_shutter_speed(&self, seconds: f32, snap_to_option: bool) -> BackendResult<f32> {
        let written = self.set_parameter(Parameter::ShutterSpeed(seconds), snap_to_option)?;
        Ok(written.as_shutter_speed().unwrap_or(seconds))
    }

    pub fn parameter_options(&self, kind: ParameterKind) -> BackendResult<Vec<Parameter>> {
        self.device()?
            .perform_blocking(move |device| device.parameter_options(kind))?
    }

    pub fn is_lens_new(&self) -> bool {
        self.lens_is_new
    }

    pub fn is_iso_new(&self) -> bool {
        self.iso_is_new
    }

    pub fn is_aperture_new(&self) -> bool {
        self.aperture_is_new
    }

    pub fn is_shutter_speed_new(&self) -> bool {
        self.shutter_speed_is_new
    }

    pub fn are_options_new(&self) -> bool {
        self.options_are_new
    }
}

impl Drop for CameraThread {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framerate_counter() {
        let mut counter = FramerateCounter::default();
        assert_eq!(counter.fps(), 0.0);

        let start = Instant::now();
        for i in 0..11 {
            counter.tick(start + Duration::from_millis(100 * i));
        }
        let fps = counter.fps();
        assert!((fps - 10.0).abs() < 0.01, "fps was {}", fps);
    }

    #[test]
    fn test_framerate_window_is_bounded() {
        let mut counter = FramerateCounter::default();
        let start = Instant::now();
        for i in 0..(FRAMERATE_WINDOW as u64 * 2) {
            counter.tick(start + Duration::from_millis(i));
        }
        assert_eq!(counter.stamps.len(), FRAMERATE_WINDOW);
    }
}

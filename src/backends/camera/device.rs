// SPDX-License-Identifier: GPL-3.0-only

//! Tethered camera device
//!
//! A [`Device`] owns one SDK camera and is confined to the thread that
//! created it (it is `!Send`). Holding `&mut Device` is therefore proof of
//! running on the owning thread, and every hardware call goes through it.
//!
//! Other threads talk to the device through a [`DeviceHandle`], which posts
//! actions onto the device's FIFO queue. The queue is drained by
//! [`Device::update`], which the owning thread calls in its loop.
//!
//! # Capture state machine
//!
//! ```text
//! NoCaptureTriggered ──take_photo──▶ WaitingForPhotoDownload
//!                                       │              │
//!                            download ok│              │shutter/download/decode error,
//!                                       ▼              ▼timeout or close
//!                              CaptureSucceeded   CaptureFailed
//! ```
//!
//! Either terminal state accepts a new capture. While waiting, further
//! capture requests resolve immediately with [`CaptureError::Busy`].

use super::codec::{self, INVALID_ENCODING};
use super::events::EventDispatcher;
use super::property_cache::PropertyCache;
use super::sdk::{
    CameraCommand, Capacity, DirectoryItem, PropertyId, PropertyValue, SdkCamera, SdkError,
    SdkEventHandler, StatusCommand, evf_output, save_to,
};
use super::types::*;
use crate::constants::timing::{BLOCKING_CAPTURE_POLL_INTERVAL, DEFAULT_CAPTURE_TIMEOUT};
use futures::channel::oneshot;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::task::{Context, Poll};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Deferred operation executed on the owning thread
pub(crate) type Action = Box<dyn FnOnce(&mut Device) + Send + 'static>;

/// Properties read when a session opens
const INITIAL_PROPERTIES: [PropertyId; 11] = [
    PropertyId::ISO_SPEED,
    PropertyId::AV,
    PropertyId::TV,
    PropertyId::LENS_STATUS,
    PropertyId::BATTERY_LEVEL,
    PropertyId::BATTERY_QUALITY,
    PropertyId::MAKER_NAME,
    PropertyId::OWNER_NAME,
    PropertyId::ARTIST,
    PropertyId::COPYRIGHT,
    PropertyId::EVF_OUTPUT_DEVICE,
];

/// Device behaviour settings
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// How long a capture waits for its download
    pub capture_timeout: Duration,
    /// Log every SDK callback at info level
    pub log_device_callbacks: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            log_device_callbacks: false,
        }
    }
}

/// State readable from any thread
struct DeviceShared {
    cache: PropertyCache,
    capture_status: Mutex<CaptureStatus>,
    info: RwLock<DeviceInfo>,
    lens: RwLock<LensInfo>,
    owner: Mutex<Option<ThreadId>>,
    /// Admits one blocking request at a time
    blocking_gate: Mutex<()>,
    open: AtomicBool,
}

impl DeviceShared {
    fn capture_status(&self) -> CaptureStatus {
        *self
            .capture_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_owner_thread(&self) -> bool {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) == Some(thread::current().id())
    }
}

/// Result of a capture that may not have arrived yet
///
/// Resolves exactly once. Poll it as a future, or check it without blocking
/// with [`PendingCapture::try_take`] while the owning thread keeps calling
/// [`Device::update`].
#[derive(Debug)]
pub struct PendingCapture {
    receiver: Option<oneshot::Receiver<PhotoCaptureResult>>,
}

impl PendingCapture {
    fn new(receiver: oneshot::Receiver<PhotoCaptureResult>) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }

    /// Already-resolved failure
    pub(crate) fn failed(error: CaptureError) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(Err(error));
        Self::new(receiver)
    }

    /// Take the result if it has arrived
    ///
    /// Returns `None` while pending and after the result was taken.
    pub fn try_take(&mut self) -> Option<PhotoCaptureResult> {
        let receiver = self.receiver.as_mut()?;
        let result = match receiver.try_recv() {
            Ok(Some(result)) => result,
            Ok(None) => return None,
            Err(oneshot::Canceled) => Err(CaptureError::Abandoned),
        };
        self.receiver = None;
        Some(result)
    }

    /// Whether the result has already been taken
    pub fn is_taken(&self) -> bool {
        self.receiver.is_none()
    }
}

impl Future for PendingCapture {
    type Output = PhotoCaptureResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Poll::Ready(Err(CaptureError::Abandoned));
        };
        match Pin::new(receiver).poll(cx) {
            Poll::Ready(result) => {
                self.receiver = None;
                Poll::Ready(result.unwrap_or(Err(CaptureError::Abandoned)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Cross-thread access to a [`Device`]
#[derive(Clone)]
pub struct DeviceHandle {
    actions: Sender<Action>,
    shared: Arc<DeviceShared>,
}

impl DeviceHandle {
    /// Queue `action` to run on the owning thread and return immediately
    pub fn perform<F>(&self, action: F) -> BackendResult<()>
    where
        F: FnOnce(&mut Device) + Send + 'static,
    {
        self.actions
            .send(Box::new(action))
            .map_err(|_| BackendError::Disconnected)
    }

    /// Run `action` on the owning thread and wait for its return value
    ///
    /// One blocking request is in flight at a time; concurrent callers wait
    /// their turn. Each request carries its own completion channel.
    ///
    /// # Returns
    /// * `Err(BackendError::WouldDeadlock)` - called from the owning thread,
    ///   which would never get to drain the queue
    /// * `Err(BackendError::Disconnected)` - the device was dropped before
    ///   running the action
    pub fn perform_blocking<F, R>(&self, action: F) -> BackendResult<R>
    where
        F: FnOnce(&mut Device) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shared.is_owner_thread() {
            return Err(BackendError::WouldDeadlock);
        }

        let _turn = self
            .shared
            .blocking_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (done_tx, done_rx) = mpsc::sync_channel(1);
        self.perform(move |device| {
            let _ = done_tx.send(action(device));
        })?;
        done_rx.recv().map_err(|_| BackendError::Disconnected)
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.shared.capture_status()
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Cached exposure settings
    pub fn settings(&self) -> CameraSettings {
        self.shared.cache.snapshot()
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.shared
            .info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn lens_info(&self) -> LensInfo {
        self.shared
            .lens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// One tethered camera, confined to its owning thread
pub struct Device {
    camera: Box<dyn SdkCamera>,
    settings: DeviceSettings,
    shared: Arc<DeviceShared>,
    dispatcher: Arc<EventDispatcher>,
    actions_tx: Sender<Action>,
    actions_rx: Receiver<Action>,
    capture_promise: Option<oneshot::Sender<PhotoCaptureResult>>,
    subscribers: Vec<Sender<DeviceEvent>>,
    is_open: bool,
    live_view_enabled: bool,
    download_enabled: bool,
    save_to_host: bool,
    _owning_thread: PhantomData<Rc<()>>,
}

impl Device {
    /// Wrap an SDK camera; the calling thread becomes the owning thread
    pub fn new(mut camera: Box<dyn SdkCamera>, settings: DeviceSettings) -> Self {
        let mut info = DeviceInfo::default();
        match camera.device_info() {
            Ok(sdk_info) => {
                info.description = sdk_info.description;
                info.port = sdk_info.port;
            }
            Err(e) => warn!(error = %e, "Failed to read device info"),
        }

        let dispatcher = Arc::new(EventDispatcher::new());
        dispatcher.set_log_callbacks(settings.log_device_callbacks);
        camera.set_event_handler(Some(Arc::clone(&dispatcher) as Arc<dyn SdkEventHandler>));

        let (actions_tx, actions_rx) = mpsc::channel();

        let shared = Arc::new(DeviceShared {
            cache: PropertyCache::new(),
            capture_status: Mutex::new(CaptureStatus::NoCaptureTriggered),
            info: RwLock::new(info),
            lens: RwLock::new(LensInfo::default()),
            owner: Mutex::new(Some(thread::current().id())),
            blocking_gate: Mutex::new(()),
            open: AtomicBool::new(false),
        });

        Self {
            camera,
            settings,
            shared,
            dispatcher,
            actions_tx,
            actions_rx,
            capture_promise: None,
            subscribers: Vec::new(),
            is_open: false,
            live_view_enabled: false,
            download_enabled: true,
            save_to_host: true,
            _owning_thread: PhantomData,
        }
    }

    /// Handle for other threads
    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            actions: self.actions_tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn description(&self) -> String {
        self.shared
            .info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .description
            .clone()
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.handle().device_info()
    }

    pub fn lens_info(&self) -> LensInfo {
        self.handle().lens_info()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    // ===== Session =====

    /// Open a session with the camera
    ///
    /// Any previous session is closed first. On failure the device is left
    /// closed.
    pub fn open(&mut self) -> BackendResult<()> {
        self.close();
        *self.shared.owner.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(thread::current().id());

        let description = self.description();
        info!(device = %description, "Opening camera session");

        if let Err(e) = self.camera.open_session() {
            error!(device = %description, error = %e, "Failed to open session");
            return Err(BackendError::Sdk(e));
        }

        if let Err(e) = self.prepare_session() {
            error!(device = %description, error = %e, "Failed to prepare session");
            if let Err(e) = self.camera.close_session() {
                warn!(error = %e, "Failed to close session after failed open");
            }
            return Err(BackendError::Sdk(e));
        }

        self.is_open = true;
        self.save_to_host = true;
        self.shared.open.store(true, Ordering::Release);
        self.dispatcher.attach(self.actions_tx.clone());

        for property in INITIAL_PROPERTIES {
            self.refresh_property(property);
        }

        info!(device = %description, "Camera session open");
        Ok(())
    }

    /// Route photos to the host and advertise host storage
    fn prepare_session(&mut self) -> Result<(), SdkError> {
        self.camera
            .set_property(PropertyId::SAVE_TO, PropertyValue::UInt(save_to::HOST))?;

        self.camera.send_status_command(StatusCommand::UiLock)?;
        let capacity = self.camera.set_capacity(Capacity::default());
        let unlock = self.camera.send_status_command(StatusCommand::UiUnlock);
        capacity.and(unlock)
    }

    /// Close the session; safe to call repeatedly
    ///
    /// An outstanding capture resolves with [`CaptureError::Closed`].
    pub fn close(&mut self) {
        if !self.is_open {
            return;
        }

        let description = self.description();
        info!(device = %description, "Closing camera session");

        self.dispatcher.detach();
        self.is_open = false;
        self.live_view_enabled = false;
        self.shared.open.store(false, Ordering::Release);

        self.fail_capture(CaptureError::Closed);

        if let Err(e) = self.camera.close_session() {
            warn!(device = %description, error = %e, "Failed to close session");
        }
    }

    /// Deliver pending SDK events, then run every queued action in order
    pub fn update(&mut self) {
        self.camera.pump_events();

        loop {
            let Ok(action) = self.actions_rx.try_recv() else {
                break;
            };
            action(self);
        }
    }

    /// Run `action` now; `&mut self` already proves we are on the owning thread
    pub fn perform_in_camera_thread<F>(&mut self, action: F)
    where
        F: FnOnce(&mut Device),
    {
        action(self);
    }

    /// Receive lens, property and unrequested photo notifications
    pub fn subscribe(&mut self) -> Receiver<DeviceEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub(crate) fn notify(&mut self, event: DeviceEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn set_log_device_callbacks(&mut self, enabled: bool) {
        self.settings.log_device_callbacks = enabled;
        self.dispatcher.set_log_callbacks(enabled);
    }

    // ===== Capture =====

    pub fn capture_status(&self) -> CaptureStatus {
        self.shared.capture_status()
    }

    fn set_capture_status(&self, status: CaptureStatus) {
        *self
            .shared
            .capture_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Fire the shutter and return the pending photo
    ///
    /// Never blocks. If a capture is already waiting for its download, the
    /// result is an immediate [`CaptureError::Busy`] and the camera is not
    /// touched.
    pub fn take_photo_async(&mut self) -> PendingCapture {
        if self.capture_status() == CaptureStatus::WaitingForPhotoDownload {
            warn!("Capture already in progress, rejecting request");
            return PendingCapture::failed(CaptureError::Busy);
        }

        if !self.is_open {
            self.set_capture_status(CaptureStatus::CaptureFailed);
            return PendingCapture::failed(CaptureError::Command(SdkError::SESSION_NOT_OPEN));
        }

        if !self.save_to_host {
            match self
                .camera
                .set_property(PropertyId::SAVE_TO, PropertyValue::UInt(save_to::HOST))
            {
                Ok(()) => self.save_to_host = true,
                Err(e) => warn!(error = %e, "Failed to route photos back to host"),
            }
        }

        self.set_capture_status(CaptureStatus::WaitingForPhotoDownload);

        if let Err(e) = self.camera.send_command(CameraCommand::TakePicture) {
            error!(error = %e, "Take picture command failed");
            self.set_capture_status(CaptureStatus::CaptureFailed);
            return PendingCapture::failed(CaptureError::Command(e));
        }

        debug!("Shutter fired, waiting for photo");
        let (sender, receiver) = oneshot::channel();
        self.capture_promise = Some(sender);
        PendingCapture::new(receiver)
    }

    /// How long a capture may wait for its download
    pub fn capture_timeout(&self) -> Duration {
        self.settings.capture_timeout
    }

    /// Fire the shutter and wait for the photo
    ///
    /// Keeps the device running (events and queued actions) while it waits.
    /// Gives up after the configured capture timeout.
    pub fn take_photo(&mut self) -> PhotoCaptureResult {
        let mut pending = self.take_photo_async();
        let deadline = Instant::now() + self.settings.capture_timeout;

        loop {
            if let Some(result) = pending.try_take() {
                return result;
            }
            if Instant::now() >= deadline {
                warn!(timeout = ?self.settings.capture_timeout, "Timed out waiting for photo");
                self.fail_capture(CaptureError::Timeout);
                return pending.try_take().unwrap_or(Err(CaptureError::Timeout));
            }
            self.update();
            thread::sleep(BLOCKING_CAPTURE_POLL_INTERVAL);
        }
    }

    /// Fire the shutter with the photo stored on the camera's card
    ///
    /// Photos are routed back to the host on the next [`Device::take_photo_async`].
    pub fn take_photo_to_memory_card(&mut self) -> BackendResult<()> {
        if !self.is_open {
            return Err(BackendError::NotConnected);
        }
        self.camera
            .set_property(PropertyId::SAVE_TO, PropertyValue::UInt(save_to::CAMERA))?;
        self.save_to_host = false;
        self.camera.send_command(CameraCommand::TakePicture)?;
        Ok(())
    }

    /// Whether transfer events download the file (default on)
    pub fn set_download_enabled(&mut self, enabled: bool) {
        self.download_enabled = enabled;
    }

    pub fn is_download_enabled(&self) -> bool {
        self.download_enabled
    }

    /// Resolve the outstanding capture with `error`, if there is one
    pub(crate) fn fail_capture(&mut self, error: CaptureError) {
        match self.capture_promise.take() {
            Some(sender) => {
                warn!(error = %error, "Capture failed");
                self.set_capture_status(CaptureStatus::CaptureFailed);
                let _ = sender.send(Err(error));
            }
            None => debug!(error = %error, "No capture outstanding"),
        }
    }

    /// Download a file the camera announced
    pub(crate) fn download(&mut self, item: DirectoryItem) {
        if !self.download_enabled {
            debug!(file = %item.file_name, "Download disabled, skipping");
            return;
        }
        if !self.is_open {
            debug!(file = %item.file_name, "Session closed, skipping download");
            return;
        }

        let result = self.fetch_photo(&item);

        match self.capture_promise.take() {
            Some(sender) => {
                let status = if result.is_ok() {
                    CaptureStatus::CaptureSucceeded
                } else {
                    CaptureStatus::CaptureFailed
                };
                self.set_capture_status(status);
                if sender.send(result).is_err() {
                    debug!("Capture result dropped by caller");
                }
            }
            None => match result {
                Ok(photo) => {
                    info!(file = %item.file_name, "Received unrequested photo");
                    self.notify(DeviceEvent::UnrequestedPhoto(photo));
                }
                Err(e) => warn!(file = %item.file_name, error = %e, "Unrequested photo failed"),
            },
        }
    }

    fn fetch_photo(&mut self, item: &DirectoryItem) -> PhotoCaptureResult {
        let encoded = self.camera.download(item).map_err(|e| {
            error!(file = %item.file_name, error = %e, "Download failed");
            CaptureError::Transfer(e)
        })?;

        let pixels = Frame::decode(&encoded).map_err(|e| {
            error!(file = %item.file_name, error = %e, "Decode failed");
            CaptureError::Decode(e.to_string())
        })?;

        let metadata = match self.camera.image_focal_length(&encoded) {
            Ok([current, min, max]) => Some(PhotoMetadata {
                focal_length: current.to_f32(),
                focal_length_min: min.to_f32(),
                focal_length_max: max.to_f32(),
            }),
            Err(e) => {
                debug!(error = %e, "No focal length metadata");
                None
            }
        };

        info!(
            file = %item.file_name,
            width = pixels.width,
            height = pixels.height,
            "Photo downloaded"
        );

        Ok(CapturedPhoto {
            encoded: Arc::from(encoded),
            pixels,
            metadata,
            file_name: Some(item.file_name.clone()),
        })
    }

    /// Postpone the camera's auto power-off
    pub fn extend_shutdown_timer(&mut self) {
        debug!("Extending camera shutdown timer");
        if let Err(e) = self.camera.send_command(CameraCommand::ExtendShutDownTimer) {
            warn!(error = %e, "Failed to extend shutdown timer");
        }
    }

    // ===== Properties =====

    fn read_property(&self, property: PropertyId) -> Option<PropertyValue> {
        match self.camera.get_property(property) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(property = %property, error = %e, "Failed to read property");
                None
            }
        }
    }

    fn read_u32(&self, property: PropertyId) -> Option<u32> {
        self.read_property(property)?.as_u32()
    }

    fn read_text(&self, property: PropertyId) -> Option<String> {
        self.read_property(property)?.as_text().map(str::to_string)
    }

    /// Re-read a property after the camera reported a change
    ///
    /// Updates the cache without writing anything back to the camera.
    pub(crate) fn refresh_property(&mut self, property: PropertyId) {
        if !self.is_open {
            debug!(property = %property, "Session closed, skipping refresh");
            return;
        }

        match property {
            PropertyId::ISO_SPEED | PropertyId::AV | PropertyId::TV => {
                if let (Some(kind), Some(code)) = (codec::kind_for(property), self.read_u32(property)) {
                    self.shared
                        .cache
                        .apply_from_hardware(codec::decode(kind, code));
                }
            }
            PropertyId::LENS_STATUS => self.refresh_lens(),
            PropertyId::LENS_NAME => {
                if let Some(name) = self.read_text(property) {
                    self.shared
                        .lens
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .name = name;
                }
            }
            PropertyId::BATTERY_LEVEL => {
                if let Some(level) = self.read_u32(property) {
                    self.update_info(|info| {
                        info.battery_level = if level == 0xFFFF_FFFF {
                            BatteryLevel::ExternalPower
                        } else {
                            BatteryLevel::Percent(level)
                        };
                    });
                }
            }
            PropertyId::BATTERY_QUALITY => {
                if let Some(quality) = self.read_u32(property) {
                    self.update_info(|info| {
                        info.battery_quality = quality.saturating_add(1) as f32 / 4.0
                    });
                }
            }
            PropertyId::MAKER_NAME
            | PropertyId::OWNER_NAME
            | PropertyId::ARTIST
            | PropertyId::COPYRIGHT => {
                if let Some(text) = self.read_text(property) {
                    self.update_info(|info| match property {
                        PropertyId::MAKER_NAME => info.maker_name = text,
                        PropertyId::OWNER_NAME => info.owner_name = text,
                        PropertyId::ARTIST => info.artist = text,
                        _ => info.copyright = text,
                    });
                }
            }
            PropertyId::EVF_OUTPUT_DEVICE => {
                if let Some(output) = self.read_u32(property) {
                    self.live_view_enabled = output & evf_output::PC != 0;
                }
            }
            _ => {}
        }

        self.notify(DeviceEvent::PropertyChanged(property));
    }

    fn update_info<F: FnOnce(&mut DeviceInfo)>(&self, update: F) {
        update(&mut self.shared.info.write().unwrap_or_else(PoisonError::into_inner));
    }

    fn refresh_lens(&mut self) {
        let attached = self.read_u32(PropertyId::LENS_STATUS).unwrap_or(0) != 0;
        let name = if attached {
            self.read_text(PropertyId::LENS_NAME).unwrap_or_default()
        } else {
            String::new()
        };
        let lens = LensInfo { attached, name };

        let changed = {
            let mut current = self.shared.lens.write().unwrap_or_else(PoisonError::into_inner);
            if *current != lens {
                *current = lens.clone();
                true
            } else {
                false
            }
        };

        if changed {
            info!(attached = lens.attached, lens = %lens.name, "Lens changed");
            self.notify(DeviceEvent::LensChanged(lens));
        }
    }

    /// Cached exposure settings
    pub fn settings(&self) -> CameraSettings {
        self.shared.cache.snapshot()
    }

    pub fn iso(&self) -> u32 {
        self.shared.cache.iso()
    }

    pub fn aperture(&self) -> f32 {
        self.shared.cache.aperture()
    }

    pub fn shutter_speed(&self) -> f32 {
        self.shared.cache.shutter_speed()
    }

    /// Write a setting to the camera, optionally snapping to the nearest valid option
    ///
    /// # Returns
    /// The value actually written.
    pub fn set_parameter(
        &mut self,
        value: Parameter,
        snap_to_option: bool,
    ) -> BackendResult<Parameter> {
        if !self.is_open {
            return Err(BackendError::NotConnected);
        }

        let value = if snap_to_option {
            let options = self.parameter_options(value.kind()).unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read options, writing value as is");
                Vec::new()
            });
            codec::snap_parameter(value, &options)
        } else {
            value
        };

        self.shared
            .cache
            .write_through(self.camera.as_mut(), value)?;
        Ok(value)
    }

    pub fn set_iso(&mut self, iso: u32, snap_to_option: bool) -> BackendResult<u32> {
        let written = self.set_parameter(Parameter::Iso(iso), snap_to_option)?;
        Ok(written.as_iso().unwrap_or(iso))
    }

    pub fn set_aperture(&mut self, aperture: f32, snap_to_option: bool) -> BackendResult<f32> {
        let written = self.set_parameter(Parameter::Aperture(aperture), snap_to_option)?;
        Ok(written.as_aperture().unwrap_or(aperture))
    }

    pub fn set_shutter_speed(&mut self, seconds: f32, snap_to_option: bool) -> BackendResult<f32> {
        let written = self.set_parameter(Parameter::ShutterSpeed(seconds), snap_to_option)?;
        Ok(written.as_shutter_speed().unwrap_or(seconds))
    }

    /// Values the camera currently accepts for `kind`, in camera order
    pub fn parameter_options(&self, kind: ParameterKind) -> BackendResult<Vec<Parameter>> {
        let codes = self.camera.property_options(codec::property_for(kind))?;
        Ok(codes
            .into_iter()
            .filter(|code| *code != INVALID_ENCODING)
            .map(|code| codec::decode(kind, code))
            .collect())
    }

    pub fn iso_options(&self) -> BackendResult<Vec<u32>> {
        Ok(self
            .parameter_options(ParameterKind::Iso)?
            .iter()
            .filter_map(Parameter::as_iso)
            .collect())
    }

    pub fn aperture_options(&self) -> BackendResult<Vec<f32>> {
        Ok(self
            .parameter_options(ParameterKind::Aperture)?
            .iter()
            .filter_map(Parameter::as_aperture)
            .collect())
    }

    pub fn shutter_speed_options(&self) -> BackendResult<Vec<f32>> {
        Ok(self
            .parameter_options(ParameterKind::ShutterSpeed)?
            .iter()
            .filter_map(Parameter::as_shutter_speed)
            .collect())
    }

    /// Display labels for the current options of `kind`
    pub fn option_labels(&self, kind: ParameterKind) -> BackendResult<Vec<String>> {
        Ok(self
            .parameter_options(kind)?
            .into_iter()
            .map(codec::format_parameter)
            .collect())
    }

    // ===== Live view =====

    /// Start or stop streaming live view to the host
    ///
    /// # Arguments
    /// * `enabled` - Stream live view to the host
    /// * `show_on_camera` - Also keep the camera's own screen on
    pub fn set_live_view_enabled(
        &mut self,
        enabled: bool,
        show_on_camera: bool,
    ) -> BackendResult<()> {
        if !self.is_open {
            return Err(BackendError::NotConnected);
        }

        let mode = u32::from(enabled);
        self.camera
            .set_property(PropertyId::EVF_MODE, PropertyValue::UInt(mode))?;

        let mut output = if show_on_camera { evf_output::TFT } else { 0 };
        if enabled {
            output |= evf_output::PC;
        }
        self.camera
            .set_property(PropertyId::EVF_OUTPUT_DEVICE, PropertyValue::UInt(output))?;

        self.live_view_enabled = enabled;
        info!(enabled, "Live view toggled");
        Ok(())
    }

    pub fn is_live_view_enabled(&self) -> bool {
        self.live_view_enabled
    }

    /// Fetch the latest live view frame into `frame`
    ///
    /// # Returns
    /// * `Ok(true)` - `frame` holds a new image
    /// * `Ok(false)` - no new image yet; `frame` is untouched
    pub fn live_view_frame(&mut self, frame: &mut Frame) -> BackendResult<bool> {
        if !self.live_view_enabled {
            return Err(BackendError::LiveViewDisabled);
        }

        match self.camera.download_live_view() {
            Ok(bytes) => {
                *frame = Frame::decode(&bytes)
                    .map_err(|e| BackendError::Other(format!("Live view decode failed: {}", e)))?;
                Ok(true)
            }
            Err(SdkError::OBJECT_NOT_READY) => Ok(false),
            Err(e) => Err(BackendError::Sdk(e)),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
        self.camera.set_event_handler(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::simulated::{SdkCall, SimulatedProbe, SimulatedSdk};
    use crate::backends::camera::sdk::{ObjectEvent, StateEvent};

    fn open_device() -> (Device, SimulatedProbe) {
        let (camera, probe) = SimulatedSdk::camera();
        let mut device = Device::new(camera, DeviceSettings::default());
        device.open().unwrap();
        (device, probe)
    }

    #[test]
    fn test_open_prepares_session() {
        let (device, probe) = open_device();
        assert!(device.is_open());
        assert!(probe.is_session_open());

        let calls = probe.calls();
        assert_eq!(calls[0], SdkCall::OpenSession);
        assert_eq!(
            calls[1],
            SdkCall::SetProperty(PropertyId::SAVE_TO, PropertyValue::UInt(save_to::HOST))
        );
        assert_eq!(calls[2], SdkCall::StatusCommand(StatusCommand::UiLock));
        assert_eq!(calls[3], SdkCall::SetCapacity);
        assert_eq!(calls[4], SdkCall::StatusCommand(StatusCommand::UiUnlock));

        assert_eq!(device.iso(), 400);
        assert_eq!(device.aperture(), 5.6);
        assert!(device.lens_info().attached);
        assert_eq!(device.device_info().battery_level, BatteryLevel::Percent(80));
    }

    #[test]
    fn test_open_failure_leaves_device_closed() {
        let (camera, probe) = SimulatedSdk::camera();
        probe.fail_open(Some(SdkError::DEVICE_NOT_FOUND));
        let mut device = Device::new(camera, DeviceSettings::default());

        assert_eq!(
            device.open(),
            Err(BackendError::Sdk(SdkError::DEVICE_NOT_FOUND))
        );
        assert!(!device.is_open());
        assert!(!device.handle().is_open());
        device.close();
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut device, probe) = open_device();
        device.close();
        device.close();
        let closes = probe
            .calls()
            .iter()
            .filter(|call| **call == SdkCall::CloseSession)
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_async_capture_resolves_after_update() {
        let (mut device, _probe) = open_device();

        let mut pending = device.take_photo_async();
        assert_eq!(
            device.capture_status(),
            CaptureStatus::WaitingForPhotoDownload
        );
        assert!(pending.try_take().is_none());
        assert!(!pending.is_taken());

        device.update();

        let photo = pending.try_take().unwrap().unwrap();
        assert_eq!((photo.pixels.width, photo.pixels.height), (64, 48));
        assert_eq!(photo.metadata.unwrap().focal_length, 35.0);
        assert_eq!(device.capture_status(), CaptureStatus::CaptureSucceeded);
        assert!(pending.is_taken());
        assert!(pending.try_take().is_none());
    }

    #[test]
    fn test_busy_capture_does_not_touch_hardware() {
        let (mut device, probe) = open_device();

        let _first = device.take_photo_async();
        let mut second = device.take_photo_async();

        assert_eq!(second.try_take().unwrap().unwrap_err(), CaptureError::Busy);
        assert_eq!(probe.command_count(CameraCommand::TakePicture), 1);
        assert_eq!(
            device.capture_status(),
            CaptureStatus::WaitingForPhotoDownload
        );
    }

    #[test]
    fn test_rejected_shutter_fails_capture() {
        let (mut device, probe) = open_device();
        probe.fail_next_take_picture(SdkError::TAKE_PICTURE_AF_NG);

        let mut pending = device.take_photo_async();
        assert_eq!(
            pending.try_take().unwrap().unwrap_err(),
            CaptureError::Command(SdkError::TAKE_PICTURE_AF_NG)
        );
        assert_eq!(device.capture_status(), CaptureStatus::CaptureFailed);

        // A failed capture does not block the next one
        let mut retry = device.take_photo_async();
        device.update();
        assert!(retry.try_take().unwrap().is_ok());
    }

    #[test]
    fn test_download_failure_fails_capture() {
        let (mut device, probe) = open_device();
        probe.fail_next_download(SdkError::COMM_DISCONNECTED);

        let mut pending = device.take_photo_async();
        device.update();

        assert_eq!(
            pending.try_take().unwrap().unwrap_err(),
            CaptureError::Transfer(SdkError::COMM_DISCONNECTED)
        );
        assert_eq!(device.capture_status(), CaptureStatus::CaptureFailed);
    }

    #[test]
    fn test_missing_metadata_is_not_an_error() {
        let (mut device, probe) = open_device();
        probe.fail_metadata(true);

        let mut pending = device.take_photo_async();
        device.update();

        let photo = pending.try_take().unwrap().unwrap();
        assert!(photo.metadata.is_none());
    }

    #[test]
    fn test_camera_shutter_press_is_unrequested_photo() {
        let (mut device, probe) = open_device();
        let events = device.subscribe();

        probe.press_shutter();
        device.update();

        let photo = events
            .try_iter()
            .find_map(|event| match event {
                DeviceEvent::UnrequestedPhoto(photo) => Some(photo),
                _ => None,
            })
            .unwrap();
        assert_eq!(photo.file_name.as_deref(), Some("IMG_0001.JPG"));
        assert_eq!(device.capture_status(), CaptureStatus::NoCaptureTriggered);
    }

    #[test]
    fn test_close_fails_outstanding_capture() {
        let (mut device, probe) = open_device();
        probe.set_auto_transfer(false);

        let mut pending = device.take_photo_async();
        device.close();

        assert_eq!(pending.try_take().unwrap().unwrap_err(), CaptureError::Closed);
        assert_eq!(device.capture_status(), CaptureStatus::CaptureFailed);
    }

    #[test]
    fn test_blocking_capture_times_out() {
        let (camera, probe) = SimulatedSdk::camera();
        probe.set_auto_transfer(false);
        let mut device = Device::new(
            camera,
            DeviceSettings {
                capture_timeout: Duration::from_millis(50),
                ..DeviceSettings::default()
            },
        );
        device.open().unwrap();

        assert_eq!(device.take_photo().unwrap_err(), CaptureError::Timeout);
        assert_eq!(device.capture_status(), CaptureStatus::CaptureFailed);
    }

    #[test]
    fn test_blocking_capture() {
        let (mut device, _probe) = open_device();
        let photo = device.take_photo().unwrap();
        assert!(!photo.encoded.is_empty());
        assert_eq!(device.capture_status(), CaptureStatus::CaptureSucceeded);
    }

    #[test]
    fn test_local_write_goes_to_hardware_once() {
        let (mut device, probe) = open_device();
        probe.clear_calls();

        assert_eq!(device.set_iso(800, false), Ok(800));
        assert_eq!(device.iso(), 800);

        // The camera echoes a property-changed event; refreshing must not write again
        device.update();
        device.update();

        assert_eq!(probe.property_writes(PropertyId::ISO_SPEED), 1);
        assert_eq!(device.iso(), 800);
    }

    #[test]
    fn test_hardware_change_updates_cache_without_write() {
        let (mut device, probe) = open_device();
        probe.clear_calls();

        probe.turn_dial(PropertyId::TV, PropertyValue::UInt(0x70));
        device.update();

        assert_eq!(device.shutter_speed(), 1.0 / 125.0);
        assert_eq!(probe.property_writes(PropertyId::TV), 0);
    }

    #[test]
    fn test_unencodable_value_is_rejected() {
        let (mut device, probe) = open_device();
        probe.clear_calls();

        assert!(matches!(
            device.set_iso(123, false),
            Err(BackendError::UnsupportedValue(_))
        ));
        assert_eq!(probe.property_writes(PropertyId::ISO_SPEED), 0);
        assert_eq!(device.iso(), 400);
    }

    #[test]
    fn test_snap_to_option() {
        let (mut device, _probe) = open_device();
        assert_eq!(device.set_iso(700, true), Ok(800));
        assert_eq!(device.set_aperture(5.0, true), Ok(5.6));
        assert_eq!(device.set_shutter_speed(1.0 / 100.0, true), Ok(1.0 / 125.0));
        assert_eq!(device.shutter_speed(), 1.0 / 125.0);
    }

    #[test]
    fn test_options_and_labels() {
        let (device, probe) = open_device();
        assert_eq!(
            device.iso_options().unwrap(),
            vec![100, 200, 400, 800, 1600, 3200, 6400]
        );
        assert_eq!(
            device.aperture_options().unwrap(),
            vec![2.8, 4.0, 5.6, 8.0, 11.0, 16.0]
        );
        assert_eq!(
            device.shutter_speed_options().unwrap(),
            vec![1.0, 0.25, 1.0 / 30.0, 1.0 / 60.0, 1.0 / 125.0, 1.0 / 250.0, 1.0 / 500.0]
        );

        // Lens swapped: fewer apertures, and a slot the camera marks invalid
        probe.set_property_options(PropertyId::AV, vec![0x30, 0x38, INVALID_ENCODING]);
        assert_eq!(device.aperture_options().unwrap(), vec![5.6, 8.0]);

        let labels = device.option_labels(ParameterKind::ShutterSpeed).unwrap();
        assert_eq!(labels[0], "1\"");
        assert_eq!(labels[4], "1/125");
    }

    #[test]
    fn test_events_ignored_while_closed() {
        let (camera, probe) = SimulatedSdk::camera();
        let mut device = Device::new(camera, DeviceSettings::default());

        assert!(probe.fire_transfer_request());
        device.open().unwrap();
        probe.clear_calls();
        device.update();
        assert!(!probe
            .calls()
            .iter()
            .any(|call| matches!(call, SdkCall::Download(_))));

        device.close();
        assert!(probe.fire_object_event(ObjectEvent::DirItemCreated, None));
        assert!(probe.fire_transfer_request());
        device.update();
        assert!(!probe
            .calls()
            .iter()
            .any(|call| matches!(call, SdkCall::Download(_))));
    }

    #[test]
    fn test_memory_card_capture_skips_download() {
        let (mut device, probe) = open_device();
        probe.set_auto_transfer(false);

        device.take_photo_to_memory_card().unwrap();
        assert_eq!(probe.shots_taken(), 1);
        assert_eq!(
            probe.property(PropertyId::SAVE_TO),
            Some(PropertyValue::UInt(save_to::CAMERA))
        );
        assert_eq!(device.capture_status(), CaptureStatus::NoCaptureTriggered);

        // The next tethered capture routes photos back to the host
        probe.set_auto_transfer(true);
        let mut pending = device.take_photo_async();
        assert_eq!(
            probe.property(PropertyId::SAVE_TO),
            Some(PropertyValue::UInt(save_to::HOST))
        );
        device.update();
        assert!(pending.try_take().unwrap().is_ok());

        device.close();
        assert_eq!(
            device.take_photo_to_memory_card(),
            Err(BackendError::NotConnected)
        );
    }

    #[test]
    fn test_disabled_download_ignores_transfers() {
        let (mut device, probe) = open_device();
        let events = device.subscribe();
        assert!(device.is_download_enabled());

        device.set_download_enabled(false);
        assert!(!device.is_download_enabled());
        probe.clear_calls();
        probe.press_shutter();
        device.update();

        assert!(!probe
            .calls()
            .iter()
            .any(|call| matches!(call, SdkCall::Download(_))));
        assert!(!events
            .try_iter()
            .any(|event| matches!(event, DeviceEvent::UnrequestedPhoto(_))));

        device.set_download_enabled(true);
        probe.press_shutter();
        device.update();
        assert!(events
            .try_iter()
            .any(|event| matches!(event, DeviceEvent::UnrequestedPhoto(_))));
    }

    #[test]
    fn test_dispatcher_attached_only_while_open() {
        let (camera, _probe) = SimulatedSdk::camera();
        let mut device = Device::new(camera, DeviceSettings::default());
        assert!(!device.dispatcher.is_attached());

        device.open().unwrap();
        assert!(device.dispatcher.is_attached());

        device.close();
        assert!(!device.dispatcher.is_attached());
    }

    #[test]
    fn test_property_changes_come_from_camera_echo() {
        let (mut device, probe) = open_device();
        let events = device.subscribe();
        let iso_changed = |events: &Receiver<DeviceEvent>| {
            events.try_iter().any(|event| {
                matches!(event, DeviceEvent::PropertyChanged(PropertyId::ISO_SPEED))
            })
        };

        probe.set_echo_property_changes(false);
        device.set_iso(800, false).unwrap();
        device.update();
        assert!(!iso_changed(&events));
        assert_eq!(device.iso(), 800);

        probe.set_echo_property_changes(true);
        device.set_iso(1600, false).unwrap();
        device.update();
        assert!(iso_changed(&events));
    }

    #[test]
    fn test_battery_quality() {
        let (mut device, probe) = open_device();
        assert_eq!(device.device_info().battery_quality, 1.0);

        probe.turn_dial(PropertyId::BATTERY_QUALITY, PropertyValue::UInt(1));
        device.update();
        assert_eq!(device.device_info().battery_quality, 0.5);

        // Out of range values from the camera must not overflow
        probe.turn_dial(PropertyId::BATTERY_QUALITY, PropertyValue::UInt(u32::MAX));
        device.update();
        assert!(device.device_info().battery_quality.is_finite());
    }

    #[test]
    fn test_shutdown_warning_extends_timer() {
        let (mut device, probe) = open_device();
        probe.queue_state_event(StateEvent::WillSoonShutDown, 0);
        device.update();
        assert_eq!(probe.command_count(CameraCommand::ExtendShutDownTimer), 1);

        // Same warning straight from an SDK thread
        let sdk_probe = probe.clone();
        thread::spawn(move || {
            assert!(sdk_probe.fire_state_event(StateEvent::WillSoonShutDown, 0));
        })
        .join()
        .unwrap();
        device.update();
        assert_eq!(probe.command_count(CameraCommand::ExtendShutDownTimer), 2);
    }

    #[test]
    fn test_capture_error_state_event_fails_capture() {
        let (mut device, probe) = open_device();
        probe.set_auto_transfer(false);

        let mut pending = device.take_photo_async();
        probe.queue_state_event(StateEvent::CaptureError, 0x8D01);
        device.update();

        assert_eq!(
            pending.try_take().unwrap().unwrap_err(),
            CaptureError::Hardware(SdkError::TAKE_PICTURE_AF_NG)
        );
    }

    #[test]
    fn test_lens_removal_notifies() {
        let (mut device, probe) = open_device();
        let events = device.subscribe();

        probe.turn_dial(PropertyId::LENS_STATUS, PropertyValue::UInt(0));
        device.update();

        let lens = events
            .try_iter()
            .find_map(|event| match event {
                DeviceEvent::LensChanged(lens) => Some(lens),
                _ => None,
            })
            .unwrap();
        assert!(!lens.attached);
        assert!(!device.lens_info().attached);
    }

    #[test]
    fn test_perform_blocking_on_owner_thread_is_refused() {
        let (device, _probe) = open_device();
        let result = device.handle().perform_blocking(|device| device.iso());
        assert_eq!(result, Err(BackendError::WouldDeadlock));
    }

    #[test]
    fn test_perform_in_camera_thread_runs_inline() {
        let (mut device, _probe) = open_device();
        let mut seen = 0;
        device.perform_in_camera_thread(|device| seen = device.iso());
        assert_eq!(seen, 400);
    }

    #[test]
    fn test_live_view() {
        let (mut device, _probe) = open_device();
        let mut frame = Frame::default();

        assert_eq!(
            device.live_view_frame(&mut frame),
            Err(BackendError::LiveViewDisabled)
        );

        device.set_live_view_enabled(true, false).unwrap();
        assert_eq!(device.live_view_frame(&mut frame), Ok(true));
        assert_eq!((frame.width, frame.height), (32, 24));

        // The echoed output-device change keeps the flag consistent
        device.update();
        assert!(device.is_live_view_enabled());
    }

    #[test]
    fn test_pending_capture_as_future() {
        let (mut device, _probe) = open_device();
        let pending = device.take_photo_async();
        device.update();
        let photo = pollster::block_on(pending).unwrap();
        assert!(!photo.pixels.is_empty());
    }

    #[test]
    fn test_drop_fails_outstanding_capture() {
        let (mut device, probe) = open_device();
        probe.set_auto_transfer(false);
        let mut pending = device.take_photo_async();
        drop(device);
        assert_eq!(pending.try_take().unwrap().unwrap_err(), CaptureError::Closed);
    }
}

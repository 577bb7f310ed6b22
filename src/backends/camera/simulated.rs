// SPDX-License-Identifier: GPL-3.0-only

//! Simulated camera SDK
//!
//! A virtual camera implementing the SDK boundary entirely in memory. It
//! behaves like a tethered body: taking a picture queues a transfer event
//! that is delivered on the next [`SdkCamera::pump_events`], writing a
//! property echoes a property-changed event, and downloads return a JPEG
//! test pattern.
//!
//! Each simulated camera shares its state with a [`SimulatedProbe`], which
//! records every SDK call, injects faults and fires events from any thread.

use super::sdk::{
    CameraCommand, CameraSdk, Capacity, DirectoryItem, ObjectEvent, PropertyEvent, PropertyId,
    PropertyValue, Rational, SdkCamera, SdkDeviceInfo, SdkError, SdkEventHandler, SdkResult,
    StateEvent, StatusCommand, evf_output,
};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Size of simulated photos
const PHOTO_SIZE: (u32, u32) = (64, 48);
/// Size of simulated live view frames
const LIVE_VIEW_SIZE: (u32, u32) = (32, 24);

/// One SDK call as seen by the simulated camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkCall {
    OpenSession,
    CloseSession,
    Command(CameraCommand),
    StatusCommand(StatusCommand),
    SetCapacity,
    SetProperty(PropertyId, PropertyValue),
    Download(String),
    DownloadLiveView,
}

enum QueuedEvent {
    Object(ObjectEvent, Option<DirectoryItem>),
    Property(PropertyEvent, PropertyId, u32),
    State(StateEvent, u32),
}

#[derive(Default)]
struct Faults {
    open: Option<SdkError>,
    take_picture: Option<SdkError>,
    download: Option<SdkError>,
    live_view: Option<SdkError>,
    metadata: bool,
}

struct SimulatedState {
    info: SdkDeviceInfo,
    session_open: bool,
    properties: HashMap<PropertyId, PropertyValue>,
    options: HashMap<PropertyId, Vec<u32>>,
    handler: Option<Arc<dyn SdkEventHandler>>,
    events: VecDeque<QueuedEvent>,
    calls: Vec<SdkCall>,
    faults: Faults,
    auto_transfer: bool,
    echo_property_changes: bool,
    shots: u32,
    next_handle: u64,
    live_view_frames: u32,
}

impl SimulatedState {
    fn new(index: usize) -> Self {
        let properties = HashMap::from([
            (PropertyId::ISO_SPEED, PropertyValue::UInt(0x58)),
            (PropertyId::AV, PropertyValue::UInt(0x30)),
            (PropertyId::TV, PropertyValue::UInt(0x60)),
            (PropertyId::BATTERY_LEVEL, PropertyValue::UInt(80)),
            (PropertyId::BATTERY_QUALITY, PropertyValue::UInt(3)),
            (PropertyId::LENS_STATUS, PropertyValue::UInt(1)),
            (
                PropertyId::LENS_NAME,
                PropertyValue::Text("EF-S18-55mm f/3.5-5.6 IS STM".to_string()),
            ),
            (
                PropertyId::MAKER_NAME,
                PropertyValue::Text("Simulated Camera Co.".to_string()),
            ),
            (PropertyId::OWNER_NAME, PropertyValue::Text(String::new())),
            (PropertyId::ARTIST, PropertyValue::Text(String::new())),
            (PropertyId::COPYRIGHT, PropertyValue::Text(String::new())),
            (PropertyId::SAVE_TO, PropertyValue::UInt(1)),
            (PropertyId::EVF_MODE, PropertyValue::UInt(0)),
            (PropertyId::EVF_OUTPUT_DEVICE, PropertyValue::UInt(evf_output::TFT)),
        ]);
        let options = HashMap::from([
            (
                PropertyId::ISO_SPEED,
                vec![0x48, 0x50, 0x58, 0x60, 0x68, 0x70, 0x78],
            ),
            (PropertyId::AV, vec![0x20, 0x28, 0x30, 0x38, 0x40, 0x48]),
            (
                PropertyId::TV,
                vec![0x38, 0x48, 0x60, 0x68, 0x70, 0x78, 0x80],
            ),
        ]);

        Self {
            info: SdkDeviceInfo {
                description: format!("Simulated EOS {}", index),
                port: format!("sim:{}", index),
            },
            session_open: false,
            properties,
            options,
            handler: None,
            events: VecDeque::new(),
            calls: Vec::new(),
            faults: Faults::default(),
            auto_transfer: true,
            echo_property_changes: true,
            shots: 0,
            next_handle: 1,
            live_view_frames: 0,
        }
    }

    fn require_session(&self) -> SdkResult<()> {
        if self.session_open {
            Ok(())
        } else {
            Err(SdkError::SESSION_NOT_OPEN)
        }
    }

    fn new_item(&mut self) -> DirectoryItem {
        let handle = self.next_handle;
        self.next_handle += 1;
        DirectoryItem {
            handle,
            file_name: format!("IMG_{:04}.JPG", handle),
            size: 0,
        }
    }
}

type SharedState = Arc<Mutex<SimulatedState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, SimulatedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// JPEG test pattern whose colours depend on `seed`
pub fn test_pattern_jpeg(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            (seed.wrapping_mul(37) as u8).wrapping_add(x as u8),
            (y.wrapping_mul(4)) as u8,
            (seed.wrapping_mul(91)) as u8,
        ])
    });
    let mut bytes = Vec::new();
    match DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
    {
        Ok(()) => bytes,
        Err(e) => {
            debug!(error = %e, "Failed to encode test pattern");
            Vec::new()
        }
    }
}

/// In-memory SDK exposing a fixed set of simulated cameras
pub struct SimulatedSdk {
    cameras: Vec<SharedState>,
}

impl Default for SimulatedSdk {
    fn default() -> Self {
        Self::with_cameras(1)
    }
}

impl SimulatedSdk {
    pub fn with_cameras(count: usize) -> Self {
        Self {
            cameras: (0..count)
                .map(|index| Arc::new(Mutex::new(SimulatedState::new(index))))
                .collect(),
        }
    }

    /// Probe for the camera at `index`
    pub fn probe(&self, index: usize) -> Option<SimulatedProbe> {
        self.cameras.get(index).map(|state| SimulatedProbe {
            state: Arc::clone(state),
        })
    }

    /// A standalone simulated camera and its probe
    pub fn camera() -> (Box<dyn SdkCamera>, SimulatedProbe) {
        let state = Arc::new(Mutex::new(SimulatedState::new(0)));
        let probe = SimulatedProbe {
            state: Arc::clone(&state),
        };
        (Box::new(SimulatedCamera { state }), probe)
    }
}

impl CameraSdk for SimulatedSdk {
    fn list_cameras(&self) -> SdkResult<Vec<Box<dyn SdkCamera>>> {
        Ok(self
            .cameras
            .iter()
            .map(|state| {
                Box::new(SimulatedCamera {
                    state: Arc::clone(state),
                }) as Box<dyn SdkCamera>
            })
            .collect())
    }
}

/// Simulated camera body
pub struct SimulatedCamera {
    state: SharedState,
}

impl SdkCamera for SimulatedCamera {
    fn device_info(&self) -> SdkResult<SdkDeviceInfo> {
        Ok(lock(&self.state).info.clone())
    }

    fn set_event_handler(&mut self, handler: Option<Arc<dyn SdkEventHandler>>) {
        lock(&self.state).handler = handler;
    }

    fn open_session(&mut self) -> SdkResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(SdkCall::OpenSession);
        if let Some(err) = state.faults.open {
            return Err(err);
        }
        state.session_open = true;
        Ok(())
    }

    fn close_session(&mut self) -> SdkResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(SdkCall::CloseSession);
        state.require_session()?;
        state.session_open = false;
        state.events.clear();
        Ok(())
    }

    fn send_command(&mut self, command: CameraCommand) -> SdkResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(SdkCall::Command(command));
        state.require_session()?;

        if command == CameraCommand::TakePicture {
            if let Some(err) = state.faults.take_picture.take() {
                return Err(err);
            }
            state.shots += 1;
            if state.auto_transfer {
                let item = state.new_item();
                trace!(file = %item.file_name, "Queueing transfer event");
                state.events.push_back(QueuedEvent::Object(
                    ObjectEvent::DirItemRequestTransfer,
                    Some(item),
                ));
            }
        }
        Ok(())
    }

    fn send_status_command(&mut self, command: StatusCommand) -> SdkResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(SdkCall::StatusCommand(command));
        state.require_session()
    }

    fn set_capacity(&mut self, _capacity: Capacity) -> SdkResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(SdkCall::SetCapacity);
        state.require_session()
    }

    fn get_property(&self, property: PropertyId) -> SdkResult<PropertyValue> {
        let state = lock(&self.state);
        state.require_session()?;
        state
            .properties
            .get(&property)
            .cloned()
            .ok_or(SdkError::PROPERTIES_UNAVAILABLE)
    }

    fn set_property(&mut self, property: PropertyId, value: PropertyValue) -> SdkResult<()> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(SdkCall::SetProperty(property, value.clone()));
        state.require_session()?;

        if let (Some(options), PropertyValue::UInt(code)) = (state.options.get(&property), &value)
            && !options.contains(code)
        {
            return Err(SdkError::NOT_SUPPORTED);
        }

        state.properties.insert(property, value);
        if state.echo_property_changes {
            state.events.push_back(QueuedEvent::Property(
                PropertyEvent::PropertyChanged,
                property,
                0,
            ));
        }
        Ok(())
    }

    fn property_options(&self, property: PropertyId) -> SdkResult<Vec<u32>> {
        let state = lock(&self.state);
        state.require_session()?;
        Ok(state.options.get(&property).cloned().unwrap_or_default())
    }

    fn download(&mut self, item: &DirectoryItem) -> SdkResult<Vec<u8>> {
        let mut state = lock(&self.state);
        state.calls.push(SdkCall::Download(item.file_name.clone()));
        state.require_session()?;
        if let Some(err) = state.faults.download.take() {
            return Err(err);
        }
        drop(state);

        let bytes = test_pattern_jpeg(PHOTO_SIZE.0, PHOTO_SIZE.1, item.handle as u32);
        if bytes.is_empty() {
            Err(SdkError::INTERNAL_ERROR)
        } else {
            Ok(bytes)
        }
    }

    fn download_live_view(&mut self) -> SdkResult<Vec<u8>> {
        let mut state = lock(&self.state);
        state.calls.push(SdkCall::DownloadLiveView);
        state.require_session()?;

        let mode = state
            .properties
            .get(&PropertyId::EVF_MODE)
            .and_then(PropertyValue::as_u32)
            .unwrap_or(0);
        let output = state
            .properties
            .get(&PropertyId::EVF_OUTPUT_DEVICE)
            .and_then(PropertyValue::as_u32)
            .unwrap_or(0);
        if mode != 1 || output & evf_output::PC == 0 {
            return Err(SdkError::OBJECT_NOT_READY);
        }
        if let Some(error) = state.faults.live_view {
            return Err(error);
        }

        state.live_view_frames += 1;
        let seed = state.live_view_frames;
        drop(state);

        Ok(test_pattern_jpeg(LIVE_VIEW_SIZE.0, LIVE_VIEW_SIZE.1, seed))
    }

    fn image_focal_length(&self, encoded: &[u8]) -> SdkResult<[Rational; 3]> {
        let state = lock(&self.state);
        if state.faults.metadata || encoded.is_empty() {
            return Err(SdkError::PROPERTIES_UNAVAILABLE);
        }
        Ok([
            Rational::new(35, 1),
            Rational::new(18, 1),
            Rational::new(55, 1),
        ])
    }

    fn pump_events(&mut self) {
        let (handler, events) = {
            let mut state = lock(&self.state);
            let events: Vec<QueuedEvent> = state.events.drain(..).collect();
            (state.handler.clone(), events)
        };
        let Some(handler) = handler else {
            return;
        };
        for event in events {
            dispatch(handler.as_ref(), event);
        }
    }
}

fn dispatch(handler: &dyn SdkEventHandler, event: QueuedEvent) {
    match event {
        QueuedEvent::Object(event, item) => handler.handle_object_event(event, item),
        QueuedEvent::Property(event, property, param) => {
            handler.handle_property_event(event, property, param)
        }
        QueuedEvent::State(event, param) => handler.handle_state_event(event, param),
    }
}

/// Test and diagnostics access to a simulated camera
#[derive(Clone)]
pub struct SimulatedProbe {
    state: SharedState,
}

impl SimulatedProbe {
    /// Every SDK call made so far
    pub fn calls(&self) -> Vec<SdkCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Number of property writes issued to the camera
    pub fn property_writes(&self, property: PropertyId) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| matches!(call, SdkCall::SetProperty(id, _) if *id == property))
            .count()
    }

    pub fn command_count(&self, command: CameraCommand) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| **call == SdkCall::Command(command))
            .count()
    }

    pub fn is_session_open(&self) -> bool {
        lock(&self.state).session_open
    }

    pub fn has_event_handler(&self) -> bool {
        lock(&self.state).handler.is_some()
    }

    pub fn shots_taken(&self) -> u32 {
        lock(&self.state).shots
    }

    pub fn property(&self, property: PropertyId) -> Option<PropertyValue> {
        lock(&self.state).properties.get(&property).cloned()
    }

    // ===== Fault injection =====

    /// Make every `open_session` fail with `error` (or succeed again with `None`)
    pub fn fail_open(&self, error: Option<SdkError>) {
        lock(&self.state).faults.open = error;
    }

    pub fn fail_next_take_picture(&self, error: SdkError) {
        lock(&self.state).faults.take_picture = Some(error);
    }

    pub fn fail_next_download(&self, error: SdkError) {
        lock(&self.state).faults.download = Some(error);
    }

    /// Make live view downloads fail with `error` until cleared with `None`
    pub fn fail_live_view(&self, error: Option<SdkError>) {
        lock(&self.state).faults.live_view = error;
    }

    pub fn fail_metadata(&self, fail: bool) {
        lock(&self.state).faults.metadata = fail;
    }

    /// Whether taking a picture queues a transfer event (default on)
    pub fn set_auto_transfer(&self, enabled: bool) {
        lock(&self.state).auto_transfer = enabled;
    }

    /// Whether property writes echo a property-changed event (default on)
    pub fn set_echo_property_changes(&self, enabled: bool) {
        lock(&self.state).echo_property_changes = enabled;
    }

    pub fn set_property_options(&self, property: PropertyId, options: Vec<u32>) {
        lock(&self.state).options.insert(property, options);
    }

    // ===== Camera-side actions, delivered on the next event pump =====

    /// Shutter pressed on the camera body
    pub fn press_shutter(&self) {
        let mut state = lock(&self.state);
        state.shots += 1;
        let item = state.new_item();
        state.events.push_back(QueuedEvent::Object(
            ObjectEvent::DirItemRequestTransfer,
            Some(item),
        ));
    }

    /// A dial on the camera body changed a property
    pub fn turn_dial(&self, property: PropertyId, value: PropertyValue) {
        let mut state = lock(&self.state);
        state.properties.insert(property, value);
        state.events.push_back(QueuedEvent::Property(
            PropertyEvent::PropertyChanged,
            property,
            0,
        ));
    }

    /// Queue a state event (delivered on the next pump)
    pub fn queue_state_event(&self, event: StateEvent, param: u32) {
        lock(&self.state)
            .events
            .push_back(QueuedEvent::State(event, param));
    }

    // ===== Direct callbacks on the calling thread =====

    /// Invoke the object callback right now, as an SDK thread would
    ///
    /// Returns false if no handler is registered.
    pub fn fire_object_event(&self, event: ObjectEvent, item: Option<DirectoryItem>) -> bool {
        self.fire(QueuedEvent::Object(event, item))
    }

    /// Invoke the object callback with a fresh transfer request
    pub fn fire_transfer_request(&self) -> bool {
        let item = lock(&self.state).new_item();
        self.fire_object_event(ObjectEvent::DirItemRequestTransfer, Some(item))
    }

    pub fn fire_property_event(&self, event: PropertyEvent, property: PropertyId) -> bool {
        self.fire(QueuedEvent::Property(event, property, 0))
    }

    pub fn fire_state_event(&self, event: StateEvent, param: u32) -> bool {
        self.fire(QueuedEvent::State(event, param))
    }

    fn fire(&self, event: QueuedEvent) -> bool {
        let handler = lock(&self.state).handler.clone();
        match handler {
            Some(handler) => {
                dispatch(handler.as_ref(), event);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_session() {
        let (mut camera, probe) = SimulatedSdk::camera();
        assert_eq!(
            camera.send_command(CameraCommand::TakePicture),
            Err(SdkError::SESSION_NOT_OPEN)
        );
        camera.open_session().unwrap();
        assert!(probe.is_session_open());
        assert_eq!(camera.send_command(CameraCommand::TakePicture), Ok(()));
        assert_eq!(probe.shots_taken(), 1);
    }

    #[test]
    fn test_rejects_values_outside_options() {
        let (mut camera, _probe) = SimulatedSdk::camera();
        camera.open_session().unwrap();
        assert_eq!(
            camera.set_property(PropertyId::ISO_SPEED, PropertyValue::UInt(0x40)),
            Err(SdkError::NOT_SUPPORTED)
        );
        assert_eq!(
            camera.set_property(PropertyId::ISO_SPEED, PropertyValue::UInt(0x68)),
            Ok(())
        );
    }

    #[test]
    fn test_live_view_needs_pc_output() {
        let (mut camera, _probe) = SimulatedSdk::camera();
        camera.open_session().unwrap();
        assert_eq!(camera.download_live_view(), Err(SdkError::OBJECT_NOT_READY));

        camera
            .set_property(PropertyId::EVF_MODE, PropertyValue::UInt(1))
            .unwrap();
        camera
            .set_property(
                PropertyId::EVF_OUTPUT_DEVICE,
                PropertyValue::UInt(evf_output::PC),
            )
            .unwrap();
        let jpeg = camera.download_live_view().unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), LIVE_VIEW_SIZE.0);
    }

    #[test]
    fn test_live_view_fault() {
        let (mut camera, probe) = SimulatedSdk::camera();
        camera.open_session().unwrap();
        camera
            .set_property(PropertyId::EVF_MODE, PropertyValue::UInt(1))
            .unwrap();
        camera
            .set_property(
                PropertyId::EVF_OUTPUT_DEVICE,
                PropertyValue::UInt(evf_output::PC),
            )
            .unwrap();

        probe.fail_live_view(Some(SdkError::COMM_DISCONNECTED));
        assert_eq!(camera.download_live_view(), Err(SdkError::COMM_DISCONNECTED));

        probe.fail_live_view(None);
        assert!(camera.download_live_view().is_ok());
    }

    #[test]
    fn test_sdk_lists_shared_cameras() {
        let sdk = SimulatedSdk::with_cameras(2);
        let cameras = sdk.list_cameras().unwrap();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[1].device_info().unwrap().port, "sim:1");
        assert!(sdk.probe(2).is_none());
    }
}

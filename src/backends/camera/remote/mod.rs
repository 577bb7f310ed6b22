// SPDX-License-Identifier: GPL-3.0-only

//! Network camera variant
//!
//! A [`RemoteCamera`] talks to a camera's HTTP control API instead of a USB
//! SDK. The concurrency shape is the tethered one: a dedicated thread owns
//! the transport, runs queued commands, polls the camera's event endpoint
//! and double-buffers downloaded photos for the caller thread.

pub mod codec;
pub mod transport;

pub use transport::{HttpTransport, RemoteTransport};

use super::double_buffer::DoubleBuffer;
use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::*;
use crate::constants::remote::{
    DEVICE_INFORMATION, EVENT_POLLING, POLL_INTERVAL, REQUEST_TIMEOUT, SHUTTER_BUTTON,
};
use crate::constants::timing::{CAMERA_LOOP_INTERVAL, DEFAULT_CAPTURE_TIMEOUT};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const REMOTE_THREAD_NAME: &str = "camera-remote";

/// Connection settings for a network camera
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// Host name or address of the camera
    pub host: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub capture_timeout: Duration,
    pub loop_interval: Duration,
    pub orientation: Orientation,
}

impl RemoteSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            poll_interval: POLL_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            loop_interval: CAMERA_LOOP_INTERVAL,
            orientation: Orientation::None,
        }
    }
}

/// Identity reported by the camera's device information endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteDeviceInfo {
    pub manufacturer: String,
    pub product_name: String,
    pub guid: String,
    pub serial_number: String,
    pub mac_address: String,
    pub firmware_version: String,
}

impl RemoteDeviceInfo {
    fn from_json(json: &Value) -> Self {
        let field = |key: &str| json[key].as_str().unwrap_or_default().to_string();
        Self {
            manufacturer: field("manufacturer"),
            product_name: field("productname"),
            guid: field("guid"),
            serial_number: field("serialnumber"),
            mac_address: field("macaddress"),
            firmware_version: field("firmwareversion"),
        }
    }

    pub fn description(&self) -> String {
        format!("{} {}", self.manufacturer, self.product_name)
            .trim()
            .to_string()
    }
}

/// Option strings the camera currently accepts
#[derive(Debug, Clone, Default)]
struct OptionLists {
    iso: Vec<String>,
    aperture: Vec<String>,
    shutter_speed: Vec<String>,
}

impl OptionLists {
    fn get(&self, kind: ParameterKind) -> &Vec<String> {
        match kind {
            ParameterKind::Iso => &self.iso,
            ParameterKind::Aperture => &self.aperture,
            ParameterKind::ShutterSpeed => &self.shutter_speed,
        }
    }

    fn get_mut(&mut self, kind: ParameterKind) -> &mut Vec<String> {
        match kind {
            ParameterKind::Iso => &mut self.iso,
            ParameterKind::Aperture => &mut self.aperture,
            ParameterKind::ShutterSpeed => &mut self.shutter_speed,
        }
    }
}

enum RemoteCommand {
    TakePhoto {
        auto_focus: bool,
    },
    SetParameter {
        value: Parameter,
        snap_to_option: bool,
        reply: SyncSender<BackendResult<Parameter>>,
    },
}

struct RemoteShared {
    orientation: Orientation,
    photo: DoubleBuffer<Option<CapturedPhoto>>,
    settings: RwLock<CameraSettings>,
    options: RwLock<OptionLists>,
    capture_status: Mutex<CaptureStatus>,
    last_error: Mutex<Option<CaptureError>>,
    info: RwLock<RemoteDeviceInfo>,
    iso_changed: AtomicBool,
    aperture_changed: AtomicBool,
    shutter_speed_changed: AtomicBool,
}

impl RemoteShared {
    fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            photo: DoubleBuffer::default(),
            settings: RwLock::new(CameraSettings::default()),
            options: RwLock::new(OptionLists::default()),
            capture_status: Mutex::new(CaptureStatus::NoCaptureTriggered),
            last_error: Mutex::new(None),
            info: RwLock::new(RemoteDeviceInfo::default()),
            iso_changed: AtomicBool::new(false),
            aperture_changed: AtomicBool::new(false),
            shutter_speed_changed: AtomicBool::new(false),
        }
    }

    fn capture_status(&self) -> CaptureStatus {
        *self
            .capture_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_capture_status(&self, status: CaptureStatus) {
        *self
            .capture_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn set_last_error(&self, error: Option<CaptureError>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    fn changed_flag(&self, kind: ParameterKind) -> &AtomicBool {
        match kind {
            ParameterKind::Iso => &self.iso_changed,
            ParameterKind::Aperture => &self.aperture_changed,
            ParameterKind::ShutterSpeed => &self.shutter_speed_changed,
        }
    }

    /// Cache a value; raises the change flag if it differs
    fn store(&self, value: Parameter) {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        if settings.get(value.kind()) != value {
            settings.set(value);
            self.changed_flag(value.kind()).store(true, Ordering::Release);
        }
    }
}

/// Thread-local state of the remote camera thread
struct RemoteWorker {
    transport: Box<dyn RemoteTransport>,
    shared: Arc<RemoteShared>,
    commands: Receiver<RemoteCommand>,
    poll_interval: Duration,
    loop_interval: Duration,
    capture_timeout: Duration,
    last_poll: Option<Instant>,
    capture_deadline: Option<Instant>,
}

impl RemoteWorker {
    fn connect(&mut self) -> BackendResult<RemoteDeviceInfo> {
        let json = self.transport.get_json(DEVICE_INFORMATION)?;
        let info = RemoteDeviceInfo::from_json(&json);

        for kind in ParameterKind::ALL {
            match self.transport.get_json(codec::endpoint_for(kind)) {
                Ok(setting) => self.apply_setting(kind, &setting),
                Err(e) => warn!(setting = kind.display_name(), error = %e, "Failed to read setting"),
            }
        }

        *self.shared.info.write().unwrap_or_else(PoisonError::into_inner) = info.clone();
        Ok(info)
    }

    fn tick(&mut self) -> LoopAction {
        loop {
            let Ok(command) = self.commands.try_recv() else {
                break;
            };
            self.execute(command);
        }

        let poll_due = self
            .last_poll
            .is_none_or(|last| last.elapsed() >= self.poll_interval);
        if poll_due {
            self.last_poll = Some(Instant::now());
            self.poll();
        }

        if let Some(deadline) = self.capture_deadline
            && Instant::now() >= deadline
        {
            warn!(timeout = ?self.capture_timeout, "Timed out waiting for remote photo");
            self.fail_capture(CaptureError::Timeout);
        }

        thread::sleep(self.loop_interval);
        LoopAction::Continue
    }

    fn execute(&mut self, command: RemoteCommand) {
        match command {
            RemoteCommand::TakePhoto { auto_focus } => self.take_photo(auto_focus),
            RemoteCommand::SetParameter {
                value,
                snap_to_option,
                reply,
            } => {
                let result = self.set_parameter(value, snap_to_option);
                let _ = reply.send(result);
            }
        }
    }

    fn take_photo(&mut self, auto_focus: bool) {
        if self.shared.capture_status() == CaptureStatus::WaitingForPhotoDownload {
            warn!("Remote capture already in progress, rejecting request");
            self.shared.set_last_error(Some(CaptureError::Busy));
            return;
        }

        self.shared
            .set_capture_status(CaptureStatus::WaitingForPhotoDownload);

        match self
            .transport
            .post_json(SHUTTER_BUTTON, &json!({ "af": auto_focus }))
        {
            Ok(_) => {
                debug!(auto_focus, "Remote shutter released");
                self.capture_deadline = Some(Instant::now() + self.capture_timeout);
                // Poll on the next tick
                self.last_poll = None;
            }
            Err(e) => {
                error!(error = %e, "Remote shutter failed");
                self.shared.set_capture_status(CaptureStatus::CaptureFailed);
                self.shared
                    .set_last_error(Some(CaptureError::Transport(e.to_string())));
            }
        }
    }

    fn fail_capture(&mut self, error: CaptureError) {
        self.capture_deadline = None;
        self.shared.set_capture_status(CaptureStatus::CaptureFailed);
        self.shared.set_last_error(Some(error));
    }

    fn set_parameter(&mut self, value: Parameter, snap_to_option: bool) -> BackendResult<Parameter> {
        let kind = value.kind();
        let text = if snap_to_option {
            let options = self
                .shared
                .options
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(kind)
                .clone();
            codec::snap_to_option(value, &options).unwrap_or_else(|| codec::encode(value))
        } else {
            codec::encode(value)
        };

        let written = codec::decode(kind, &text).ok_or_else(|| {
            BackendError::UnsupportedValue(format!("{} {}", kind.display_name(), text))
        })?;

        let response = self
            .transport
            .put_json(codec::endpoint_for(kind), &json!({ "value": text }))?;
        debug!(setting = kind.display_name(), value = %text, "Wrote remote setting");

        // The camera answers with the value it actually applied
        let written = response["value"]
            .as_str()
            .and_then(|applied| codec::decode(kind, applied))
            .unwrap_or(written);
        self.shared.store(written);
        Ok(written)
    }

    /// Apply a `{"value": ..., "ability": [...]}` setting object
    fn apply_setting(&self, kind: ParameterKind, setting: &Value) {
        if let Some(value) = setting["value"]
            .as_str()
            .and_then(|text| codec::decode(kind, text))
        {
            self.shared.store(value);
        }

        if let Some(ability) = setting["ability"].as_array() {
            let options: Vec<String> = ability
                .iter()
                .filter_map(|option| option.as_str().map(str::to_string))
                .collect();
            *self
                .shared
                .options
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .get_mut(kind) = options;
        }
    }

    fn poll(&mut self) {
        let json = match self.transport.get_json(EVENT_POLLING) {
            Ok(json) => json,
            Err(e) => {
                debug!(error = %e, "Event polling failed");
                return;
            }
        };

        for kind in ParameterKind::ALL {
            let setting = &json[codec::event_key(kind)];
            if !setting.is_null() {
                self.apply_setting(kind, setting);
            }
        }

        if let Some(added) = json["addedcontents"].as_array() {
            for address in added.iter().filter_map(Value::as_str) {
                self.fetch_photo(address);
            }
        }
    }

    fn fetch_photo(&mut self, address: &str) {
        let file_name = address.rsplit('/').next().unwrap_or(address).to_string();
        let is_jpeg = file_name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));
        if !is_jpeg {
            debug!(file = %file_name, "Skipping non-JPEG content");
            return;
        }

        let waiting = self.shared.capture_status() == CaptureStatus::WaitingForPhotoDownload;

        let encoded = match self.transport.get_bytes(address) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(file = %file_name, error = %e, "Remote download failed");
                if waiting {
                    self.fail_capture(CaptureError::Transport(e.to_string()));
                }
                return;
            }
        };

        let mut pixels = match Frame::decode(&encoded) {
            Ok(pixels) => pixels,
            Err(e) => {
                error!(file = %file_name, error = %e, "Remote photo decode failed");
                if waiting {
                    self.fail_capture(CaptureError::Decode(e.to_string()));
                }
                return;
            }
        };
        pixels.rotate(self.shared.orientation);

        info!(file = %file_name, width = pixels.width, height = pixels.height, "Remote photo downloaded");

        let photo = CapturedPhoto {
            encoded: Arc::from(encoded),
            pixels,
            metadata: None,
            file_name: Some(file_name),
        };
        self.shared.photo.publish(&mut Some(photo));

        if waiting {
            self.capture_deadline = None;
            self.shared
                .set_capture_status(CaptureStatus::CaptureSucceeded);
            self.shared.set_last_error(None);
        }
    }
}

type TransportFactory = Arc<dyn Fn() -> BackendResult<Box<dyn RemoteTransport>> + Send + Sync>;

/// A network camera driven from its own thread
pub struct RemoteCamera {
    settings: RemoteSettings,
    connect: TransportFactory,
    shared: Arc<RemoteShared>,
    controller: Option<CaptureLoopController>,
    commands: Option<Sender<RemoteCommand>>,
    /// Admits one blocking request at a time
    blocking_gate: Mutex<()>,
    photo: Option<CapturedPhoto>,
    photo_is_new: bool,
    iso_is_new: bool,
    aperture_is_new: bool,
    shutter_speed_is_new: bool,
}

impl RemoteCamera {
    /// Remote camera reached over HTTP at `settings.host`
    pub fn new(settings: RemoteSettings) -> Self {
        let host = settings.host.clone();
        let timeout = settings.request_timeout;
        Self::with_transport(settings, move || {
            Ok(Box::new(HttpTransport::new(&host, timeout)?) as Box<dyn RemoteTransport>)
        })
    }

    /// Remote camera on a custom transport, created on the camera thread at setup
    pub fn with_transport<F>(settings: RemoteSettings, connect: F) -> Self
    where
        F: Fn() -> BackendResult<Box<dyn RemoteTransport>> + Send + Sync + 'static,
    {
        let shared = Arc::new(RemoteShared::new(settings.orientation));
        Self {
            settings,
            connect: Arc::new(connect),
            shared,
            controller: None,
            commands: None,
            blocking_gate: Mutex::new(()),
            photo: None,
            photo_is_new: false,
            iso_is_new: false,
            aperture_is_new: false,
            shutter_speed_is_new: false,
        }
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    /// Start the remote thread and connect to the camera
    pub fn setup(&mut self) -> BackendResult<()> {
        self.close();

        let shared = Arc::new(RemoteShared::new(self.settings.orientation));
        let (commands_tx, commands_rx) = mpsc::channel();
        let connect = Arc::clone(&self.connect);
        let settings = self.settings.clone();
        let worker_shared = Arc::clone(&shared);

        let init = move || -> BackendResult<(RemoteWorker, RemoteDeviceInfo)> {
            let transport = connect()?;
            let mut worker = RemoteWorker {
                transport,
                shared: worker_shared,
                commands: commands_rx,
                poll_interval: settings.poll_interval,
                loop_interval: settings.loop_interval,
                capture_timeout: settings.capture_timeout,
                last_poll: None,
                capture_deadline: None,
            };
            let info = worker.connect()?;
            Ok((worker, info))
        };

        match CaptureLoopController::start_with_init(
            REMOTE_THREAD_NAME,
            init,
            RemoteWorker::tick,
            |_| {},
        ) {
            Ok((controller, info)) => {
                info!(host = %self.settings.host, device = %info.description(), "Remote camera connected");
                self.shared = shared;
                self.controller = Some(controller);
                self.commands = Some(commands_tx);
                Ok(())
            }
            Err(e) => {
                error!(host = %self.settings.host, error = %e, "Failed to connect to remote camera");
                Err(e)
            }
        }
    }

    /// Stop the remote thread; safe to call repeatedly
    pub fn close(&mut self) {
        self.commands = None;
        if let Some(mut controller) = self.controller.take() {
            info!(host = %self.settings.host, "Disconnecting remote camera");
            controller.stop();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.controller
            .as_ref()
            .is_some_and(CaptureLoopController::is_running)
    }

    fn send(&self, command: RemoteCommand) -> BackendResult<()> {
        self.commands
            .as_ref()
            .ok_or(BackendError::NotConnected)?
            .send(command)
            .map_err(|_| BackendError::Disconnected)
    }

    /// Pick up the photo and change flags published since the last call
    pub fn update(&mut self) {
        self.photo_is_new = self.shared.photo.take_new(&mut self.photo);
        self.iso_is_new = self.shared.iso_changed.swap(false, Ordering::AcqRel);
        self.aperture_is_new = self.shared.aperture_changed.swap(false, Ordering::AcqRel);
        self.shutter_speed_is_new = self
            .shared
            .shutter_speed_changed
            .swap(false, Ordering::AcqRel);
    }

    pub fn device_info(&self) -> RemoteDeviceInfo {
        self.shared
            .info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ===== Capture =====

    /// Release the shutter; the photo shows up through [`RemoteCamera::update`]
    pub fn take_photo(&self, auto_focus: bool) -> BackendResult<()> {
        self.send(RemoteCommand::TakePhoto { auto_focus })
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.shared.capture_status()
    }

    pub fn is_photo_new(&self) -> bool {
        self.photo_is_new
    }

    pub fn photo(&self) -> Option<&CapturedPhoto> {
        self.photo.as_ref()
    }

    pub fn last_capture_error(&self) -> Option<CaptureError> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ===== Settings =====

    pub fn camera_settings(&self) -> CameraSettings {
        *self
            .shared
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a setting and wait for the camera's answer
    pub fn set_parameter(&self, value: Parameter, snap_to_option: bool) -> BackendResult<Parameter> {
        let _turn = self
            .blocking_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (reply, done) = mpsc::sync_channel(1);
        self.send(RemoteCommand::SetParameter {
            value,
            snap_to_option,
            reply,
        })?;
        done.recv().map_err(|_| BackendError::Disconnected)?
    }

    /// Values the camera currently accepts for `kind`
    pub fn parameter_options(&self, kind: ParameterKind) -> BackendResult<Vec<Parameter>> {
        if !self.is_connected() {
            return Err(BackendError::NotConnected);
        }
        let options = self
            .shared
            .options
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(codec::decode_options(kind, options.get(kind)))
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
}

impl Drop for RemoteCamera {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::simulated::test_pattern_jpeg;
    use std::collections::{HashMap, VecDeque};

    #[derive(Default)]
    struct MockState {
        settings: HashMap<String, Value>,
        added_contents: VecDeque<Vec<String>>,
        files: HashMap<String, Vec<u8>>,
        requests: Vec<(String, String, Value)>,
        refuse_connection: bool,
        reject_puts: bool,
    }

    #[derive(Clone, Default)]
    struct MockCamera(Arc<Mutex<MockState>>);

    impl MockCamera {
        fn new() -> Self {
            let camera = Self::default();
            {
                let mut state = camera.state();
                state.settings.insert(
                    "shooting/settings/iso".to_string(),
                    json!({"value": "400", "ability": ["auto", "100", "200", "400", "800"]}),
                );
                state.settings.insert(
                    "shooting/settings/av".to_string(),
                    json!({"value": "f5.6", "ability": ["f4.0", "f5.6", "f8.0"]}),
                );
                state.settings.insert(
                    "shooting/settings/tv".to_string(),
                    json!({"value": "1/125", "ability": ["1/250", "1/125", "1/60", "0\"5"]}),
                );
            }
            camera
        }

        fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
            self.0.lock().unwrap()
        }

        fn requests(&self, method: &str, path: &str) -> Vec<Value> {
            self.state()
                .requests
                .iter()
                .filter(|(m, p, _)| m == method && p == path)
                .map(|(_, _, body)| body.clone())
                .collect()
        }

        fn camera(&self) -> RemoteCamera {
            let mock = self.clone();
            let mut settings = RemoteSettings::new("mock");
            settings.poll_interval = Duration::from_millis(5);
            settings.loop_interval = Duration::from_millis(1);
            RemoteCamera::with_transport(settings, move || {
                Ok(Box::new(mock.clone()) as Box<dyn RemoteTransport>)
            })
        }
    }

    impl RemoteTransport for MockCamera {
        fn get_json(&mut self, path: &str) -> BackendResult<Value> {
            let mut state = self.state();
            state
                .requests
                .push(("GET".to_string(), path.to_string(), Value::Null));
            match path {
                DEVICE_INFORMATION if state.refuse_connection => {
                    Err(BackendError::Transport("connection refused".to_string()))
                }
                DEVICE_INFORMATION => Ok(json!({
                    "manufacturer": "Canon",
                    "productname": "EOS R6",
                    "serialnumber": "0123",
                })),
                EVENT_POLLING => {
                    let added = state.added_contents.pop_front().unwrap_or_default();
                    Ok(json!({ "addedcontents": added }))
                }
                _ => state
                    .settings
                    .get(path)
                    .cloned()
                    .ok_or_else(|| BackendError::Transport(format!("{path}: HTTP 404"))),
            }
        }

        fn put_json(&mut self, path: &str, body: &Value) -> BackendResult<Value> {
            let mut state = self.state();
            state
                .requests
                .push(("PUT".to_string(), path.to_string(), body.clone()));
            if state.reject_puts {
                return Err(BackendError::Transport(format!("{path}: HTTP 400")));
            }
            if let Some(setting) = state.settings.get_mut(path) {
                setting["value"] = body["value"].clone();
            }
            Ok(json!({ "value": body["value"] }))
        }

        fn post_json(&mut self, path: &str, body: &Value) -> BackendResult<Value> {
            let mut state = self.state();
            state
                .requests
                .push(("POST".to_string(), path.to_string(), body.clone()));
            if path == SHUTTER_BUTTON {
                let address = "/ccapi/ver100/contents/sd/100CANON/IMG_0001.JPG".to_string();
                state.files.insert(address.clone(), test_pattern_jpeg(40, 30, 9));
                state
                    .added_contents
                    .push_back(vec![address, "/ccapi/ver100/contents/sd/100CANON/IMG_0001.CR3".to_string()]);
            }
            Ok(Value::Null)
        }

        fn get_bytes(&mut self, path: &str) -> BackendResult<Vec<u8>> {
            let mut state = self.state();
            state
                .requests
                .push(("GET".to_string(), path.to_string(), Value::Null));
            state
                .files
                .get(path)
                .cloned()
                .ok_or_else(|| BackendError::Transport(format!("{path}: HTTP 404")))
        }
    }

    fn wait_for<F: FnMut(&mut RemoteCamera) -> bool>(camera: &mut RemoteCamera, mut done: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            camera.update();
            if done(camera) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_setup_reads_identity_and_settings() {
        let mock = MockCamera::new();
        let mut camera = mock.camera();
        camera.setup().unwrap();

        assert!(camera.is_connected());
        assert_eq!(camera.device_info().description(), "Canon EOS R6");
        assert_eq!(camera.device_info().serial_number, "0123");

        let settings = camera.camera_settings();
        assert_eq!(settings.iso, 400);
        assert_eq!(settings.aperture, 5.6);
        assert_eq!(settings.shutter_speed, 1.0 / 125.0);

        assert_eq!(
            camera.parameter_options(ParameterKind::ShutterSpeed).unwrap(),
            vec![
                Parameter::ShutterSpeed(1.0 / 250.0),
                Parameter::ShutterSpeed(1.0 / 125.0),
                Parameter::ShutterSpeed(1.0 / 60.0),
                Parameter::ShutterSpeed(0.5),
            ]
        );
    }

    #[test]
    fn test_setup_failure_is_reported() {
        let mock = MockCamera::new();
        mock.state().refuse_connection = true;
        let mut camera = mock.camera();

        assert!(matches!(camera.setup(), Err(BackendError::Transport(_))));
        assert!(!camera.is_connected());
        assert_eq!(camera.take_photo(true), Err(BackendError::NotConnected));
        camera.close();
    }

    #[test]
    fn test_photo_is_downloaded_after_shutter() {
        let mock = MockCamera::new();
        let mut camera = mock.camera();
        camera.setup().unwrap();

        camera.take_photo(false).unwrap();
        assert!(wait_for(&mut camera, |camera| camera.is_photo_new()));

        let photo = camera.photo().unwrap();
        assert_eq!((photo.pixels.width, photo.pixels.height), (40, 30));
        assert_eq!(photo.file_name.as_deref(), Some("IMG_0001.JPG"));
        assert_eq!(camera.capture_status(), CaptureStatus::CaptureSucceeded);
        assert_eq!(
            mock.requests("POST", SHUTTER_BUTTON),
            vec![json!({ "af": false })]
        );
        // The RAW sibling is never downloaded
        assert!(
            mock.requests("GET", "/ccapi/ver100/contents/sd/100CANON/IMG_0001.CR3")
                .is_empty()
        );
    }

    #[test]
    fn test_set_parameter_snaps_to_listed_option() {
        let mock = MockCamera::new();
        let mut camera = mock.camera();
        camera.setup().unwrap();

        assert_eq!(
            camera.set_parameter(Parameter::ShutterSpeed(1.0 / 100.0), true),
            Ok(Parameter::ShutterSpeed(1.0 / 125.0))
        );
        assert_eq!(
            camera.set_parameter(Parameter::Iso(700), true),
            Ok(Parameter::Iso(800))
        );
        assert_eq!(
            mock.requests("PUT", "shooting/settings/iso"),
            vec![json!({ "value": "800" })]
        );
        assert_eq!(camera.camera_settings().iso, 800);

        assert!(wait_for(&mut camera, |camera| camera.is_iso_new()));
    }

    #[test]
    fn test_rejected_setting_leaves_cache() {
        let mock = MockCamera::new();
        mock.state().reject_puts = true;
        let mut camera = mock.camera();
        camera.setup().unwrap();

        assert!(matches!(
            camera.set_parameter(Parameter::Aperture(8.0), false),
            Err(BackendError::Transport(_))
        ));
        assert_eq!(camera.camera_settings().aperture, 5.6);
    }

    #[test]
    fn test_missing_photo_times_out() {
        let mock = MockCamera::new();
        let mut settings = RemoteSettings::new("mock");
        settings.poll_interval = Duration::from_millis(5);
        settings.loop_interval = Duration::from_millis(1);
        settings.capture_timeout = Duration::from_millis(30);

        // Shutter accepted but the file never shows up
        struct SilentCamera(MockCamera);
        impl RemoteTransport for SilentCamera {
            fn get_json(&mut self, path: &str) -> BackendResult<Value> {
                self.0.get_json(path)
            }
            fn put_json(&mut self, path: &str, body: &Value) -> BackendResult<Value> {
                self.0.put_json(path, body)
            }
            fn post_json(&mut self, _path: &str, _body: &Value) -> BackendResult<Value> {
                Ok(Value::Null)
            }
            fn get_bytes(&mut self, path: &str) -> BackendResult<Vec<u8>> {
                self.0.get_bytes(path)
            }
        }

        let mut camera = RemoteCamera::with_transport(settings, move || {
            Ok(Box::new(SilentCamera(mock.clone())) as Box<dyn RemoteTransport>)
        });
        camera.setup().unwrap();
        camera.take_photo(true).unwrap();

        assert!(wait_for(&mut camera, |camera| {
            camera.capture_status() == CaptureStatus::CaptureFailed
        }));
        assert_eq!(camera.last_capture_error(), Some(CaptureError::Timeout));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mock = MockCamera::new();
        let mut camera = mock.camera();
        camera.setup().unwrap();
        camera.close();
        camera.close();
        assert!(!camera.is_connected());
        assert_eq!(
            camera.set_parameter(Parameter::Iso(100), false),
            Err(BackendError::NotConnected)
        );
    }
}

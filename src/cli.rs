// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Taking photos
//! - Streaming live view
//! - Showing exposure settings and their options
//!
//! Tethered commands run against the virtual camera SDK.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tethercam::backends::camera::codec::format_parameter;
use tethercam::backends::camera::remote::codec::decode_shutter_speed;
use tethercam::backends::camera::sdk::CameraSdk;
use tethercam::backends::camera::simulated::SimulatedSdk;
use tethercam::backends::camera::{
    Camera, CameraBackendType, CameraControl, CaptureStatus, Parameter, ParameterKind,
};
use tethercam::{Config, storage};

/// Exposure settings requested on the command line
#[derive(Debug, Default, Clone, Copy)]
pub struct ExposureArgs {
    pub iso: Option<u32>,
    pub aperture: Option<f32>,
    pub shutter_speed: Option<f32>,
}

impl ExposureArgs {
    fn parameters(&self) -> Vec<Parameter> {
        let mut parameters = Vec::new();
        if let Some(iso) = self.iso {
            parameters.push(Parameter::Iso(iso));
        }
        if let Some(aperture) = self.aperture {
            parameters.push(Parameter::Aperture(aperture));
        }
        if let Some(seconds) = self.shutter_speed {
            parameters.push(Parameter::ShutterSpeed(seconds));
        }
        parameters
    }
}

/// Parse a shutter speed as `1/125`, `0"5`, `30"` or plain seconds
pub fn parse_shutter_speed(text: &str) -> Result<f32, String> {
    decode_shutter_speed(text)
        .or_else(|| text.trim().parse().ok())
        .ok_or_else(|| format!("invalid shutter speed '{}'", text))
}

fn simulated_sdk(cameras: usize) -> Arc<dyn CameraSdk> {
    Arc::new(SimulatedSdk::with_cameras(cameras))
}

/// Build the configured camera, with command line overrides applied
fn open_camera(
    config: &Config,
    backend: CameraBackendType,
    virtual_cameras: usize,
) -> Result<Camera, Box<dyn std::error::Error>> {
    let mut camera = match backend {
        CameraBackendType::Remote => {
            let settings = config
                .remote_settings()
                .ok_or("No remote host configured (use --remote HOST)")?;
            println!("Connecting to {}...", settings.host);
            Camera::remote(settings)
        }
        CameraBackendType::Tethered | CameraBackendType::LiveView => {
            let mut settings = config.camera_thread_settings();
            settings.live_view = backend == CameraBackendType::LiveView;
            Camera::tethered(simulated_sdk(virtual_cameras), settings)
        }
    };

    camera.setup()?;
    println!("Using camera: {}", camera.description());
    Ok(camera)
}

/// List all available cameras
pub fn list_cameras(config: &Config, virtual_cameras: usize) -> Result<(), Box<dyn std::error::Error>> {
    if config.backend == CameraBackendType::Remote {
        let camera = open_camera(config, CameraBackendType::Remote, virtual_cameras)?;
        if let Camera::Remote(remote) = &camera {
            let info = remote.device_info();
            println!("  Serial number:  {}", info.serial_number);
            println!("  Firmware:       {}", info.firmware_version);
            println!("  MAC address:    {}", info.mac_address);
        }
        return Ok(());
    }

    let cameras = simulated_sdk(virtual_cameras).list_cameras()?;
    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        match camera.device_info() {
            Ok(info) => println!("  [{}] {} ({})", index, info.description, info.port),
            Err(e) => println!("  [{}] <unavailable: {}>", index, e),
        }
    }

    Ok(())
}

/// Apply requested exposure settings, printing what the camera accepted
fn apply_exposure(
    camera: &mut Camera,
    exposure: ExposureArgs,
    snap_to_options: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    for parameter in exposure.parameters() {
        let written = camera.set_parameter(parameter, snap_to_options)?;
        println!(
            "{}: {}",
            parameter.kind().display_name(),
            format_parameter(written)
        );
    }
    Ok(())
}

/// Take a photo using the configured camera
pub fn take_photo(
    config: &Config,
    virtual_cameras: usize,
    exposure: ExposureArgs,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = match config.backend {
        CameraBackendType::LiveView => CameraBackendType::Tethered,
        other => other,
    };
    let mut camera = open_camera(config, backend, virtual_cameras)?;
    apply_exposure(&mut camera, exposure, config.snap_to_options)?;

    println!("Capturing...");
    camera.take_photo()?;

    let deadline = Instant::now() + config.capture_timeout() + Duration::from_secs(1);
    let photo = loop {
        camera.update();
        if camera.is_photo_new()
            && let Some(photo) = camera.photo()
        {
            break photo.clone();
        }
        if camera.capture_status() == CaptureStatus::CaptureFailed
            && let Some(error) = camera.last_capture_error()
        {
            return Err(format!("Capture failed: {}", error).into());
        }
        if Instant::now() >= deadline {
            return Err("Timed out waiting for photo".into());
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let default_dir = config
        .photo_dir
        .clone()
        .unwrap_or_else(storage::default_photo_dir);
    let path = storage::resolve_photo_path(output.as_deref(), &default_dir, &photo);
    storage::save_photo(&photo, &path)?;

    println!(
        "Photo saved: {} ({}x{})",
        path.display(),
        photo.pixels.width,
        photo.pixels.height
    );
    if let Some(metadata) = photo.metadata {
        println!(
            "Focal length: {}mm ({}-{}mm)",
            metadata.focal_length, metadata.focal_length_min, metadata.focal_length_max
        );
    }

    camera.close();
    Ok(())
}

/// Stream live view until the duration passes or Ctrl+C
pub fn live_view(
    config: &Config,
    virtual_cameras: usize,
    duration: Option<u64>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.backend == CameraBackendType::Remote {
        return Err("Live view is only available for tethered cameras".into());
    }
    let mut camera = open_camera(config, CameraBackendType::LiveView, virtual_cameras)?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!("Streaming live view (Ctrl+C to stop)...");

    let start = Instant::now();
    let target_duration = duration.map(Duration::from_secs);
    let mut last_report = Instant::now();
    let mut frames = 0u64;

    while !stop_flag.load(Ordering::SeqCst)
        && target_duration.is_none_or(|target| start.elapsed() < target)
    {
        camera.update();
        if let Camera::Tethered(thread) = &camera
            && thread.is_live_view_new()
        {
            frames += 1;
            if last_report.elapsed() >= Duration::from_secs(1) {
                let frame = thread.live_view();
                println!(
                    "  {} frames, {}x{} @ {:.1} fps",
                    frames,
                    frame.width,
                    frame.height,
                    thread.live_view_framerate()
                );
                last_report = Instant::now();
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    if let Some(path) = output {
        save_last_frame(&camera, &path)?;
    }

    camera.close();
    println!("Live view stopped after {} frames", frames);
    Ok(())
}

fn save_last_frame(camera: &Camera, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let frame = camera.live_view().ok_or("No live view frame received")?;
    let path = if path.is_dir() {
        path.join(storage::timestamped_file_name("LV", "png"))
    } else {
        path.to_path_buf()
    };
    storage::save_frame(frame, &path)?;
    println!("Last frame saved: {}", path.display());
    Ok(())
}

/// Show the current exposure settings and the values the camera accepts
pub fn show_options(
    config: &Config,
    virtual_cameras: usize,
    exposure: ExposureArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = match config.backend {
        CameraBackendType::LiveView => CameraBackendType::Tethered,
        other => other,
    };
    let mut camera = open_camera(config, backend, virtual_cameras)?;
    apply_exposure(&mut camera, exposure, config.snap_to_options)?;

    let settings = camera.camera_settings();
    println!();
    for kind in ParameterKind::ALL {
        let options = camera.parameter_options(kind)?;
        let labels: Vec<String> = options.into_iter().map(format_parameter).collect();
        println!(
            "{:<14} {:<8} [{}]",
            kind.display_name(),
            format_parameter(settings.get(kind)),
            labels.join(", ")
        );
    }

    camera.close();
    Ok(())
}

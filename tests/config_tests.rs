// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use std::time::Duration;
use tethercam::backends::camera::Orientation;
use tethercam::{CameraBackendType, Config};

fn scratch_file(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("tethercam-config-{}-{}", name, std::process::id()))
        .join("config.json")
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.backend, CameraBackendType::Tethered);
    assert_eq!(config.device_index, 0);
    assert!(config.remote_host.is_none());
    assert!(
        config.snap_to_options,
        "Requested settings should snap to camera options by default"
    );
}

#[test]
fn test_camera_thread_settings_follow_config() {
    let config = Config {
        backend: CameraBackendType::LiveView,
        device_index: 2,
        orientation: Orientation::Rotate180,
        loop_interval_ms: 20,
        capture_timeout_secs: 7,
        log_device_callbacks: true,
        ..Config::default()
    };

    let settings = config.camera_thread_settings();
    assert_eq!(settings.device_index, 2);
    assert!(settings.live_view);
    assert_eq!(settings.orientation, Orientation::Rotate180);
    assert_eq!(settings.loop_interval, Duration::from_millis(20));
    assert_eq!(settings.device.capture_timeout, Duration::from_secs(7));
    assert!(settings.device.log_device_callbacks);
}

#[test]
fn test_remote_settings_need_a_host() {
    let mut config = Config::default();
    assert!(config.remote_settings().is_none());

    config.remote_host = Some("192.168.0.20".to_string());
    config.remote_poll_interval_ms = 250;
    let settings = config.remote_settings().unwrap();
    assert_eq!(settings.host, "192.168.0.20");
    assert_eq!(settings.poll_interval, Duration::from_millis(250));
}

#[test]
fn test_config_save_and_load() {
    let path = scratch_file("roundtrip");
    let config = Config {
        backend: CameraBackendType::Remote,
        remote_host: Some("camera.local".to_string()),
        orientation: Orientation::Rotate90,
        ..Config::default()
    };

    config.save_to(&path).unwrap();
    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_partial_config_uses_defaults() {
    let path = scratch_file("partial");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "device_index": 3 }"#).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.device_index, 3);
    assert_eq!(loaded.backend, CameraBackendType::Tethered);
    assert_eq!(loaded.capture_timeout_secs, Config::default().capture_timeout_secs);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_malformed_config_is_an_error() {
    let path = scratch_file("malformed");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Config::load_from(&path).is_err());

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

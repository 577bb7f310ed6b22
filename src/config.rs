// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{
    CameraBackendType, CameraThreadSettings, DeviceSettings, Orientation, RemoteSettings,
};
use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, remote, timing};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Kind of camera connection
    pub backend: CameraBackendType,
    /// Index of the tethered camera to open
    pub device_index: usize,
    /// Host name or address of a network camera
    pub remote_host: Option<String>,
    /// Rotation applied to photos and live view
    pub orientation: Orientation,
    /// Move requested settings to the closest value the camera offers
    pub snap_to_options: bool,
    /// Sleep between camera thread iterations
    pub loop_interval_ms: u64,
    /// How long to wait for a photo after the shutter fired
    pub capture_timeout_secs: u64,
    /// Interval between network camera status polls
    pub remote_poll_interval_ms: u64,
    /// Where photos are saved (default: ~/Pictures/tethercam)
    pub photo_dir: Option<PathBuf>,
    /// Log every camera SDK callback
    pub log_device_callbacks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: CameraBackendType::default(),
            device_index: 0,
            remote_host: None,
            orientation: Orientation::None,
            snap_to_options: true,
            loop_interval_ms: timing::CAMERA_LOOP_INTERVAL.as_millis() as u64,
            capture_timeout_secs: timing::DEFAULT_CAPTURE_TIMEOUT.as_secs(),
            remote_poll_interval_ms: remote::POLL_INTERVAL.as_millis() as u64,
            photo_dir: None,
            log_device_callbacks: false,
        }
    }
}

impl Config {
    /// Location of the user's config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load the user's config, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("No config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Save to the user's config file
    pub fn save(&self) -> AppResult<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Config("No config directory".to_string()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    /// Settings for a tethered camera thread
    pub fn camera_thread_settings(&self) -> CameraThreadSettings {
        CameraThreadSettings {
            device_index: self.device_index,
            live_view: self.backend == CameraBackendType::LiveView,
            show_live_view_on_camera: false,
            orientation: self.orientation,
            loop_interval: Duration::from_millis(self.loop_interval_ms),
            device: DeviceSettings {
                capture_timeout: self.capture_timeout(),
                log_device_callbacks: self.log_device_callbacks,
            },
        }
    }

    /// Settings for a network camera, if a host is configured
    pub fn remote_settings(&self) -> Option<RemoteSettings> {
        let host = self.remote_host.as_ref()?;
        let mut settings = RemoteSettings::new(host.clone());
        settings.poll_interval = Duration::from_millis(self.remote_poll_interval_ms);
        settings.capture_timeout = self.capture_timeout();
        settings.loop_interval = Duration::from_millis(self.loop_interval_ms);
        settings.orientation = self.orientation;
        Some(settings)
    }
}

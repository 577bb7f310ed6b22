// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Timing of the device and camera thread loops
pub mod timing {
    use std::time::Duration;

    /// Sleep between iterations of the camera thread loop
    pub const CAMERA_LOOP_INTERVAL: Duration = Duration::from_millis(5);

    /// Sleep between checks while a blocking capture waits for its photo
    pub const BLOCKING_CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// How long a blocking capture waits before giving up
    pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Number of frames averaged for the live view frame rate
    pub const FRAMERATE_WINDOW: usize = 30;
}

/// Network camera protocol
pub mod remote {
    use std::time::Duration;

    /// Port of the camera control API
    pub const CONTROL_API_PORT: u16 = 8080;

    /// Path prefix of the camera control API
    pub const CONTROL_API_PREFIX: &str = "ccapi/ver100";

    /// Interval between status polls
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Timeout for a single HTTP request
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    pub const DEVICE_INFORMATION: &str = "deviceinformation";
    pub const EVENT_POLLING: &str = "event/polling";
    pub const SHUTTER_BUTTON: &str = "shooting/control/shutterbutton";
    pub const SETTING_ISO: &str = "shooting/settings/iso";
    pub const SETTING_AV: &str = "shooting/settings/av";
    pub const SETTING_TV: &str = "shooting/settings/tv";
}

/// Files written by the application
pub mod file_formats {
    /// Folder created inside the user's pictures directory
    pub const PHOTO_FOLDER: &str = "tethercam";

    /// Extension of saved photos when none is given
    pub const DEFAULT_PHOTO_EXTENSION: &str = "jpg";

    /// Extensions the `image` crate can write for decoded photos
    pub const WRITABLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];
}

/// Name of the application's config directory and file
pub const CONFIG_DIR_NAME: &str = "tethercam";
pub const CONFIG_FILE_NAME: &str = "config.json";

// SPDX-License-Identifier: GPL-3.0-only

//! tethercam - tethered camera control
//!
//! Drives photo cameras from a host: capture with download to the host,
//! live view streaming and exposure settings (ISO, aperture, shutter speed),
//! over a USB camera SDK or a camera's network control API.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera devices, their owning threads and the SDK boundary
//! - [`config`]: User configuration handling
//! - [`storage`]: Photo directory and file saving
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tethercam::backends::camera::simulated::SimulatedSdk;
//! use tethercam::backends::camera::{Camera, CameraControl, CameraThreadSettings};
//!
//! let mut camera = Camera::tethered(Arc::new(SimulatedSdk::default()), CameraThreadSettings::default());
//! camera.setup()?;
//! camera.take_photo()?;
//! loop {
//!     camera.update();
//!     if camera.is_photo_new() {
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! # Ok::<(), tethercam::backends::camera::BackendError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{Camera, CameraBackendType, CameraControl};
pub use config::Config;
pub use errors::{AppError, AppResult};

// SPDX-License-Identifier: GPL-3.0-only

//! Errors above the camera backends: config, photo files, images

use crate::backends::camera::{BackendError, CaptureError};
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone)]
pub enum AppError {
    /// Connecting to or driving a camera failed
    Camera(BackendError),
    /// A photo was requested but never arrived
    Capture(CaptureError),
    /// Config file unreadable, malformed or unwritable
    Config(String),
    /// Photo directory or file could not be written
    Storage(String),
    /// Pixels could not be encoded or decoded
    Image(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera: {}", e),
            AppError::Capture(e) => write!(f, "Capture: {}", e),
            AppError::Config(msg) => write!(f, "Config: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage: {}", msg),
            AppError::Image(msg) => write!(f, "Image: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Camera(e) => Some(e),
            AppError::Capture(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Camera(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

/// File system failures surface while saving photos or config
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Image(err.to_string())
    }
}

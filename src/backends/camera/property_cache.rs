// SPDX-License-Identifier: GPL-3.0-only

//! Thread-safe cache of exposure settings
//!
//! Values enter the cache along one of two paths:
//!
//! - [`PropertyCache::write_through`] for locally requested changes: the value
//!   is encoded and written to the camera first, and cached only if the
//!   camera accepted it.
//! - [`PropertyCache::apply_from_hardware`] for values read back after the
//!   camera reported a change: cached without any write, so a
//!   hardware-originated change never echoes back to the camera.

use super::codec::{self, INVALID_ENCODING, format_parameter};
use super::sdk::{PropertyValue, SdkCamera};
use super::types::{BackendError, BackendResult, CameraSettings, Parameter, ParameterKind};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct PropertyCache {
    settings: RwLock<CameraSettings>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all cached settings
    pub fn snapshot(&self) -> CameraSettings {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, kind: ParameterKind) -> Parameter {
        self.snapshot().get(kind)
    }

    pub fn iso(&self) -> u32 {
        self.snapshot().iso
    }

    pub fn aperture(&self) -> f32 {
        self.snapshot().aperture
    }

    pub fn shutter_speed(&self) -> f32 {
        self.snapshot().shutter_speed
    }

    /// Write a locally requested value to the camera, then cache it
    ///
    /// Values without a hardware code are rejected before any hardware call.
    pub(crate) fn write_through(
        &self,
        camera: &mut dyn SdkCamera,
        value: Parameter,
    ) -> BackendResult<()> {
        let code = codec::encode(value);
        if code == INVALID_ENCODING {
            warn!(value = %format_parameter(value), "No hardware encoding, not writing");
            return Err(BackendError::UnsupportedValue(format!(
                "{} {}",
                value.kind().display_name(),
                format_parameter(value)
            )));
        }

        let property = codec::property_for(value.kind());
        camera
            .set_property(property, PropertyValue::UInt(code))
            .map_err(|e| {
                warn!(property = %property, error = %e, "Failed to write property");
                BackendError::Sdk(e)
            })?;

        debug!(property = %property, code, "Wrote property");
        self.store(value);
        Ok(())
    }

    /// Cache a value read back from the camera without writing it
    pub(crate) fn apply_from_hardware(&self, value: Parameter) {
        self.store(value);
    }

    fn store(&self, value: Parameter) {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(value);
    }
}

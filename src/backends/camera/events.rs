// SPDX-License-Identifier: GPL-3.0-only

//! Event dispatcher
//!
//! The SDK calls back into [`EventDispatcher`] from whatever thread pumps its
//! events. The dispatcher never touches the camera: each callback becomes an
//! action on the owning device's queue and runs on the next
//! [`Device::update`](super::device::Device::update).
//!
//! The queue is only attached while the device is open. Callbacks arriving
//! before `open()` or after `close()` are dropped.

use super::device::{Action, Device};
use super::sdk::{DirectoryItem, ObjectEvent, PropertyEvent, PropertyId, SdkError, SdkEventHandler, StateEvent};
use super::types::{CaptureError, DeviceEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

#[derive(Default)]
pub struct EventDispatcher {
    queue: Mutex<Option<Sender<Action>>>,
    log_callbacks: AtomicBool,
}

impl EventDispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start forwarding callbacks into `queue`
    pub(crate) fn attach(&self, queue: Sender<Action>) {
        *self.queue.lock().unwrap_or_else(PoisonError::into_inner) = Some(queue);
    }

    /// Stop forwarding; later callbacks are ignored
    pub(crate) fn detach(&self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_attached(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Log every callback at info level
    pub fn set_log_callbacks(&self, enabled: bool) {
        self.log_callbacks.store(enabled, Ordering::Relaxed);
    }

    fn forward<F>(&self, what: &str, action: F)
    where
        F: FnOnce(&mut Device) + Send + 'static,
    {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.as_ref() {
            Some(queue) => {
                if queue.send(Box::new(action)).is_err() {
                    debug!(event = what, "Device gone, dropping event");
                }
            }
            None => debug!(event = what, "Device not open, ignoring event"),
        }
    }

    fn log(&self, message: std::fmt::Arguments<'_>) {
        if self.log_callbacks.load(Ordering::Relaxed) {
            info!("{}", message);
        }
    }
}

impl SdkEventHandler for EventDispatcher {
    fn handle_object_event(&self, event: ObjectEvent, item: Option<DirectoryItem>) {
        self.log(format_args!("Object event {:?} {:?}", event, item));

        match (event, item) {
            (ObjectEvent::DirItemRequestTransfer | ObjectEvent::DirItemCreated, Some(item)) => {
                self.forward("object", move |device| device.download(item));
            }
            (ObjectEvent::DirItemRequestTransfer | ObjectEvent::DirItemCreated, None) => {
                debug!(?event, "Object event without directory item");
            }
            _ => {}
        }
    }

    fn handle_property_event(&self, event: PropertyEvent, property: PropertyId, param: u32) {
        self.log(format_args!(
            "Property event {:?} {} param {}",
            event, property, param
        ));

        match event {
            PropertyEvent::PropertyChanged => {
                self.forward("property", move |device| device.refresh_property(property));
            }
            PropertyEvent::PropertyDescChanged => {
                self.forward("property-desc", move |device| {
                    device.notify(DeviceEvent::OptionsChanged(property))
                });
            }
            PropertyEvent::Other(_) => {}
        }
    }

    fn handle_state_event(&self, event: StateEvent, param: u32) {
        self.log(format_args!("State event {:?} param {}", event, param));

        match event {
            StateEvent::WillSoonShutDown => {
                self.forward("state", |device| device.extend_shutdown_timer());
            }
            StateEvent::CaptureError => {
                self.forward("state", move |device| {
                    device.fail_capture(CaptureError::Hardware(SdkError(param)))
                });
            }
            StateEvent::Shutdown => {
                self.forward("state", |device| device.close());
            }
            StateEvent::ShutDownTimerUpdate | StateEvent::Other(_) => {}
        }
    }
}

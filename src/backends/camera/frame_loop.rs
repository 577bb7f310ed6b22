// SPDX-License-Identifier: GPL-3.0-only
//! Owner threads for camera loops
//!
//! A [`CaptureLoopController`] owns one named thread. The thread builds its
//! state with an init closure, so state that must never leave the thread
//! (such as a [`Device`](super::device::Device)) is created there. The init
//! outcome comes back to the caller through a rendezvous channel before
//! `start_with_init` returns; after that the loop closure runs until it asks
//! to stop or the controller is stopped, and the exit closure tears the
//! state down on the same thread.

use super::types::{BackendError, BackendResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// What the loop closure wants after one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    /// Leave the loop; the exit closure still runs
    Stop,
}

/// Stop request shared with the owner thread
#[derive(Debug, Default)]
struct LoopSignal {
    stop: AtomicBool,
}

impl LoopSignal {
    fn raise(&self) {
        self.stop.store(true, Ordering::Release);
    }

    fn is_raised(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Handle to an owner thread running a camera loop
pub struct CaptureLoopController {
    name: String,
    signal: Arc<LoopSignal>,
    thread: Option<JoinHandle<()>>,
}

/// Body of the owner thread: init, report, loop, exit
fn run_owned<S, R, I, F, E>(
    name: &str,
    signal: &LoopSignal,
    ready: SyncSender<BackendResult<R>>,
    init_fn: I,
    mut loop_fn: F,
    exit_fn: E,
) where
    I: FnOnce() -> BackendResult<(S, R)>,
    F: FnMut(&mut S) -> LoopAction,
    E: FnOnce(S),
{
    let mut state = match init_fn() {
        Ok((state, reply)) => {
            if ready.send(Ok(reply)).is_err() {
                warn!(name, "Starter went away before init finished");
            }
            state
        }
        Err(e) => {
            warn!(name, error = %e, "Owner thread init failed");
            let _ = ready.send(Err(e));
            return;
        }
    };
    // Nobody waits on the rendezvous past this point
    drop(ready);

    let mut iterations: u64 = 0;
    while !signal.is_raised() {
        iterations += 1;
        if loop_fn(&mut state) == LoopAction::Stop {
            debug!(name, iterations, "Loop finished on its own");
            break;
        }
    }

    exit_fn(state);
    info!(name, iterations, "Owner thread done");
}

impl CaptureLoopController {
    /// Spawn the owner thread and wait until its state is built
    ///
    /// `init_fn` runs first on the new thread and returns the thread-local
    /// state plus a value for the caller (usually a handle into that state).
    /// `loop_fn` is one iteration; `exit_fn` consumes the state afterwards.
    ///
    /// # Returns
    /// * `Ok((controller, reply))` - init succeeded and the loop is running
    /// * `Err(e)` - init failed or panicked; the thread is already joined
    pub fn start_with_init<S, R, I, F, E>(
        name: &str,
        init_fn: I,
        loop_fn: F,
        exit_fn: E,
    ) -> BackendResult<(Self, R)>
    where
        S: 'static,
        R: Send + 'static,
        I: FnOnce() -> BackendResult<(S, R)> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
        E: FnOnce(S) + Send + 'static,
    {
        let signal = Arc::new(LoopSignal::default());
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let thread = {
            let signal = Arc::clone(&signal);
            let name = name.to_string();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_owned(&name, &signal, ready_tx, init_fn, loop_fn, exit_fn))
                .map_err(|e| {
                    BackendError::InitializationFailed(format!("cannot spawn thread: {}", e))
                })?
        };
        info!(name, "Owner thread spawned");

        let mut controller = Self {
            name: name.to_string(),
            signal,
            thread: Some(thread),
        };

        let outcome = ready_rx.recv();
        match outcome {
            Ok(Ok(reply)) => Ok((controller, reply)),
            Ok(Err(e)) => {
                controller.join();
                Err(e)
            }
            Err(_) => {
                controller.join();
                Err(BackendError::Crashed(format!("{} died during init", name)))
            }
        }
    }

    /// Whether the owner thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Ask the loop to stop after its current iteration
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Stop requested");
        self.signal.raise();
    }

    /// Ask the loop to stop and wait for the exit closure to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the owner thread without asking it to stop
    pub fn join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.join().is_err() {
            error!(name = %self.name, "Owner thread panicked");
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        self.stop();
    }
}

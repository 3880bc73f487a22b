// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle for frame loops
//!
//! Synthetic capture streams and the frame analysis stage both run a
//! closure repeatedly on a dedicated thread until asked to stop. This
//! module owns that thread and its stop signal.

use super::ActiveStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the loop body to control the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run another iteration
    Continue,
    /// Exit the loop
    Stop,
}

/// Controller for a loop running on its own thread
///
/// Dropping the controller stops the loop and joins the thread.
///
/// # Example
///
/// ```ignore
/// let controller = CaptureLoopController::start("pattern", move || {
///     sink.send_replace(Some(next_frame()));
///     std::thread::sleep(interval);
///     LoopAction::Continue
/// });
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Start `loop_fn` on a new thread
    ///
    /// The closure is called until it returns `LoopAction::Stop` or the
    /// controller is stopped.
    pub fn start<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::start_with_init(name, || Ok(()), move |_: &mut ()| loop_fn())
    }

    /// Start a loop whose state is built on the loop thread
    ///
    /// `init_fn` runs once on the new thread, which lets the state hold
    /// values that cannot cross threads. If it fails the thread exits
    /// without running `loop_fn`.
    pub fn start_with_init<S, I, F>(name: &str, init_fn: I, mut loop_fn: F) -> Self
    where
        S: 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting frame loop");

        let spawn_result = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = match init_fn() {
                    Ok(state) => state,
                    Err(e) => {
                        warn!(name = %thread_name, error = %e, "Loop initialization failed");
                        return;
                    }
                };

                while !thread_stop.load(Ordering::SeqCst) {
                    if loop_fn(&mut state) == LoopAction::Stop {
                        debug!(name = %thread_name, "Loop requested stop");
                        break;
                    }
                }

                info!(name = %thread_name, "Frame loop thread exiting");
            });

        let thread_handle = match spawn_result {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn frame loop thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting frame loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take()
            && handle.join().is_err()
        {
            warn!(name = %self.name, "Frame loop thread panicked");
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.stop();
        }
    }
}

impl ActiveStream for CaptureLoopController {
    fn stop(mut self: Box<Self>) {
        CaptureLoopController::stop(&mut self);
    }

    fn is_running(&self) -> bool {
        CaptureLoopController::is_running(self)
    }
}

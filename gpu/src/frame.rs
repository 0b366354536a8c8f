//! Next-frame scheduling.
//!
//! The host owns the display refresh loop. It exposes it through
//! [`FrameScheduler`], and [`wait_for_next_frame`] turns one scheduled
//! callback into a future.

use std::fmt::Display;

use parking_lot::Mutex;

use crate::error::{GpuError, GpuResult};

/// Callback run on the next display refresh.
pub type FrameCallback = Box<dyn FnOnce() + Send + 'static>;

/// Host hook that runs a callback on the next display refresh.
pub trait FrameScheduler {
    fn request_frame(&self, callback: FrameCallback);
}

/// Run `work` on the next frame of `scheduler` and yield its value.
///
/// A failure of `work` is logged and surfaces as
/// [`GpuError::FrameRejected`], without the cause. A scheduler that drops
/// the callback without running it rejects the same way.
pub async fn wait_for_next_frame<S, F, T, E>(scheduler: &S, work: F) -> GpuResult<T>
where
    S: FrameScheduler + ?Sized,
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Display,
{
    let (sender, receiver) = futures_channel::oneshot::channel();
    scheduler.request_frame(Box::new(move || {
        let result = work().map_err(|e| {
            log::error!("Frame work failed: {}", e);
            GpuError::FrameRejected
        });
        let _ = sender.send(result);
    }));

    receiver.await.map_err(|_| {
        log::error!("Frame callback dropped before running");
        GpuError::FrameRejected
    })?
}

/// Scheduler whose frames are driven by the host calling [`run_frame`].
///
/// [`run_frame`]: ManualFrameScheduler::run_frame
#[derive(Default)]
pub struct ManualFrameScheduler {
    pending: Mutex<Vec<FrameCallback>>,
}

impl ManualFrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every callback queued before this call. Returns how many ran.
    ///
    /// Callbacks queued while the frame runs wait for the next frame.
    pub fn run_frame(&self) -> usize {
        let callbacks = std::mem::take(&mut *self.pending.lock());
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    /// Number of callbacks waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

impl std::fmt::Debug for ManualFrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualFrameScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl FrameScheduler for ManualFrameScheduler {
    fn request_frame(&self, callback: FrameCallback) {
        self.pending.lock().push(callback);
    }
}

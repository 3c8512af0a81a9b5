//! The thread-pool collaborator from spec.md §6.
//!
//! The C original's contract is three verbs: `request_thread` (start a
//! background task), `release_thread` (ask it to stop, cooperatively),
//! `wait_for_thread` (block until it has). `store` and `event` are both
//! native-threaded (spec.md §5: "parallel native threads on both cores"),
//! so this is expressed directly over `std::thread` rather than an async
//! runtime — matching the teacher's choice to keep its lowest-level
//! concurrency primitives (`coredb::lock::QuickLock`) independent of
//! `tokio`.
//!
//! Cancellation is cooperative and polled only at sleep/wake points
//! (spec.md §9: "mid-iteration cancellation inside the trie walk is
//! disallowed") — the stop flag is an `Arc<AtomicBool>` the background body
//! is handed directly, not a signal that can interrupt it mid-computation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A named background task with a cooperative stop flag. `request_thread`
/// is [`Background::spawn`], `release_thread` is [`Background::request_stop`],
/// `wait_for_thread` is [`Background::join`].
pub struct Background {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Background {
    /// Spawn `body` on a new OS thread named `name`. `body` is handed the
    /// stop flag and is responsible for checking it at its own poll points
    /// (typically around a sleep in a maintenance loop).
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_body = stop.clone();
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || body(stop_for_body))
            .expect("failed to spawn background thread");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Ask the background body to stop at its next poll point. Does not
    /// block.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Block until the background thread has exited. Implicitly requests a
    /// stop first, matching `terminate`/`destroy`'s synchronous shutdown
    /// contract (spec.md §5).
    pub fn join(mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Background {
    fn drop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Sleep for `total`, checking `stop` roughly every `poll_interval` so a
/// maintenance loop notices a shutdown request promptly instead of only at
/// the end of a long sleep. Returns `false` if a stop was observed.
pub fn interruptible_sleep(total: Duration, stop: &AtomicBool, poll_interval: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let step = remaining.min(poll_interval);
        thread::sleep(step);
        remaining -= step;
    }
    !stop.load(Ordering::Acquire)
}

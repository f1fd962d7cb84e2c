//! A pausable background loop running a body at a fixed interval.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::common::Result;

#[derive(Debug, Default)]
struct LoopState {
    stopped: bool,
    paused: bool,
}

#[derive(Debug, Default)]
struct LoopShared {
    state: Mutex<LoopState>,
    wakeup: Condvar,
    cycles: AtomicU64,
}

impl LoopShared {
    /// Block until the next cycle is due. Returns `false` once stopped.
    ///
    /// Resuming after a pause restarts the interval.
    fn wait_for_next_cycle(&self, interval: Duration) -> bool {
        let mut state = self.state.lock();
        let mut deadline = Instant::now() + interval;
        loop {
            if state.stopped {
                return false;
            }
            if state.paused {
                self.wakeup.wait(&mut state);
                deadline = Instant::now() + interval;
                continue;
            }
            if Instant::now() >= deadline {
                return true;
            }
            self.wakeup.wait_until(&mut state, deadline);
        }
    }
}

/// Runs `body` on a dedicated thread every `interval`.
///
/// The body receives the zero-based cycle number. A cycle always runs to
/// completion; `stop` waits for an in-flight cycle before returning.
/// Returning `ControlFlow::Break` from the body ends the loop.
///
/// ```text
///   spawn ──► wait(interval) ──► body(n) ──► wait(interval) ──► ...
///                 ▲    │
///          resume │    │ pause
///                 └────┘
/// ```
pub struct PeriodicLoop {
    name: String,
    shared: Arc<LoopShared>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicLoop {
    /// Spawn the loop thread. The first cycle runs after one interval.
    ///
    /// # Errors
    /// `Error::Io` if the thread cannot be spawned.
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, mut body: F) -> Result<Self>
    where
        F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
    {
        let name = name.into();
        let shared = Arc::new(LoopShared::default());

        let thread_shared = Arc::clone(&shared);
        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            debug!(name = %thread_name, ?interval, "periodic loop started");
            while thread_shared.wait_for_next_cycle(interval) {
                let cycle = thread_shared.cycles.fetch_add(1, Ordering::Relaxed);
                if body(cycle).is_break() {
                    warn!(name = %thread_name, cycle, "periodic loop body requested stop");
                    thread_shared.state.lock().stopped = true;
                    break;
                }
            }
            debug!(name = %thread_name, "periodic loop finished");
        })?;

        Ok(Self {
            name,
            shared,
            handle: Some(handle),
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }

    /// Skip cycles until [`resume`](Self::resume). An in-flight cycle finishes.
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
        self.shared.wakeup.notify_all();
    }

    /// Continue after a pause; the next cycle runs one interval from now.
    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        self.shared.wakeup.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Whether the thread is still looping.
    pub fn is_running(&self) -> bool {
        !self.shared.state.lock().stopped
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and join it. Idempotent.
    pub fn stop(&mut self) {
        self.shared.state.lock().stopped = true;
        self.shared.wakeup.notify_all();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(name = %self.name, "periodic loop thread panicked");
            }
        }
    }
}

impl Drop for PeriodicLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PeriodicLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicLoop")
            .field("name", &self.name)
            .field("cycles", &self.cycles())
            .field("paused", &self.is_paused())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_runs_cycles_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut periodic = PeriodicLoop::spawn("test-loop", Duration::from_millis(5), move |n| {
            sink.lock().push(n);
            ControlFlow::Continue(())
        })
        .unwrap();

        assert!(wait_until(|| seen.lock().len() >= 3));
        periodic.stop();
        assert!(!periodic.is_running());

        let seen = seen.lock();
        assert_eq!(&seen[..3], &[0, 1, 2]);
    }

    #[test]
    fn test_break_stops_loop() {
        let periodic = PeriodicLoop::spawn("test-break", Duration::from_millis(1), |n| {
            if n == 1 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();

        assert!(wait_until(|| !periodic.is_running()));
        assert_eq!(periodic.cycles(), 2);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut periodic =
            PeriodicLoop::spawn("test-pause", Duration::from_millis(2), |_| ControlFlow::Continue(()))
                .unwrap();
        assert!(wait_until(|| periodic.cycles() >= 1));

        periodic.pause();
        assert!(periodic.is_paused());
        // Allow an in-flight cycle to finish before sampling
        thread::sleep(Duration::from_millis(10));
        let paused_at = periodic.cycles();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(periodic.cycles(), paused_at);

        periodic.resume();
        assert!(wait_until(|| periodic.cycles() > paused_at));
        periodic.stop();
    }

    #[test]
    fn test_stop_wakes_long_interval() {
        let mut periodic =
            PeriodicLoop::spawn("test-stop", Duration::from_secs(3600), |_| ControlFlow::Continue(()))
                .unwrap();
        let started = Instant::now();
        periodic.stop();
        periodic.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(periodic.cycles(), 0);
    }
}

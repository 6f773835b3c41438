//! Background tasks with a bounded stop handshake.
//!
//! A [`ShutdownCoordinator`] owns one OS thread. The thread runs a task that
//! receives a [`StopToken`]; the coordinator can wake the task or ask it to
//! stop, then waits (with a bound) for the acknowledgement that is raised
//! automatically when the task returns or unwinds.
//!
//! A task that never acknowledges is logged and abandoned: its thread is
//! detached rather than torn down under its feet, so a hung device cannot
//! block process exit forever.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::{Condvar, Mutex};

use crate::error::{DriverError, DriverResult};

#[derive(Debug, Default)]
struct SignalState {
    stop: bool,
    wake: bool,
    done: bool,
}

#[derive(Debug, Default)]
struct Signal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl Signal {
    fn update(&self, f: impl FnOnce(&mut SignalState)) {
        let mut state = self.state.lock();
        f(&mut state);
        self.cond.notify_all();
    }
}

/// Why [`StopToken::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Stop was requested; the task should return.
    Stop,
    /// The owner called [`ShutdownCoordinator::wake`].
    Woken,
    /// The wait bound expired.
    TimedOut,
}

/// Task-side view of the stop signal.
#[derive(Debug, Clone)]
pub struct StopToken(Arc<Signal>);

impl StopToken {
    /// Whether stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.0.state.lock().stop
    }

    /// Blocks until stop, a wake-up, or the optional timeout.
    ///
    /// Stop takes precedence over a pending wake-up. A wake-up is consumed by
    /// the wait that observes it.
    pub fn wait(&self, timeout: Option<Duration>) -> Wake {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.0.state.lock();
        loop {
            if state.stop {
                return Wake::Stop;
            }
            if state.wake {
                state.wake = false;
                return Wake::Woken;
            }
            match deadline {
                Some(deadline) => {
                    if self.0.cond.wait_until(&mut state, deadline).timed_out() {
                        return if state.stop { Wake::Stop } else { Wake::TimedOut };
                    }
                }
                None => self.0.cond.wait(&mut state),
            }
        }
    }
}

/// Raises the acknowledgement when the task returns or unwinds.
struct DoneGuard(Arc<Signal>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.update(|s| s.done = true);
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every task acknowledged within the bound.
    Completed,
    /// At least one task did not acknowledge in time and was detached.
    TimedOut,
    /// Stop had already been requested; nothing was done.
    AlreadyRequested,
}

impl ShutdownOutcome {
    /// Maps [`ShutdownOutcome::TimedOut`] to [`DriverError::Timeout`] for
    /// callers that treat a hung task as a failure.
    pub fn into_result(self) -> DriverResult {
        match self {
            ShutdownOutcome::TimedOut => Err(DriverError::Timeout),
            ShutdownOutcome::Completed | ShutdownOutcome::AlreadyRequested => Ok(()),
        }
    }
}

/// Owner side of one background task.
pub struct ShutdownCoordinator {
    name: String,
    signal: Arc<Signal>,
    handle: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
    stopped: AtomicBool,
}

impl ShutdownCoordinator {
    /// Spawns `task` on a new thread.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Internal`] if the thread cannot be created.
    pub fn spawn<F>(
        name: impl Into<String>,
        stack_size: Option<usize>,
        timeout: Duration,
        task: F,
    ) -> DriverResult<Self>
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let name = name.into();
        let signal = Arc::new(Signal::default());

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(stack_size) = stack_size {
            builder = builder.stack_size(stack_size);
        }

        let token = StopToken(Arc::clone(&signal));
        let guard = DoneGuard(Arc::clone(&signal));
        let handle = builder
            .spawn(move || {
                let _guard = guard;
                task(token);
            })
            .map_err(|e| DriverError::Internal(format!("cannot spawn thread '{name}': {e}")))?;

        debug!("Spawned background task '{}'", name);
        Ok(Self {
            name,
            signal,
            handle: Mutex::new(Some(handle)),
            timeout,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wakes the task once.
    pub fn wake(&self) {
        self.signal.update(|s| s.wake = true);
    }

    /// Whether the task has returned.
    pub fn is_finished(&self) -> bool {
        self.signal.state.lock().done
    }

    /// Requests stop and waits up to the configured bound for the task to
    /// acknowledge. Only the first call does anything.
    pub fn stop(&self) -> ShutdownOutcome {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return ShutdownOutcome::AlreadyRequested;
        }

        let own_thread = self
            .handle
            .lock()
            .as_ref()
            .is_some_and(|h| h.thread().id() == thread::current().id());

        self.signal.update(|s| s.stop = true);

        // The task is stopping itself; it returns once this call does.
        if own_thread {
            debug!("Background task '{}' stopped from its own thread", self.name);
            return ShutdownOutcome::Completed;
        }

        let deadline = Instant::now() + self.timeout;
        let done = {
            let mut state = self.signal.state.lock();
            while !state.done {
                if self.signal.cond.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            state.done
        };

        let handle = self.handle.lock().take();
        if done {
            if let Some(handle) = handle {
                let _ = handle.join();
            }
            debug!("Background task '{}' stopped", self.name);
            ShutdownOutcome::Completed
        } else {
            error!(
                "Background task '{}' did not stop within {:?}; detaching it",
                self.name, self.timeout
            );
            ShutdownOutcome::TimedOut
        }
    }
}

impl Drop for ShutdownCoordinator {
    fn drop(&mut self) {
        // The thread is detached, never joined here: the last owner may be
        // the task itself.
        if !self.stopped.load(Ordering::Acquire) {
            self.signal.update(|s| s.stop = true);
        }
    }
}

impl core::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_stop_cooperative_task() {
        let coordinator = ShutdownCoordinator::spawn("coop", None, Duration::from_secs(5), |token| {
            while token.wait(None) != Wake::Stop {}
        })
        .unwrap();

        assert!(!coordinator.is_finished());
        assert_eq!(coordinator.stop(), ShutdownOutcome::Completed);
        assert!(coordinator.is_finished());
        assert_eq!(coordinator.stop(), ShutdownOutcome::AlreadyRequested);
    }

    #[test]
    fn test_wake_reaches_task() {
        let (tx, rx) = mpsc::channel();
        let coordinator = ShutdownCoordinator::spawn("wake", None, Duration::from_secs(5), move |token| {
            loop {
                match token.wait(None) {
                    Wake::Woken => tx.send(()).unwrap(),
                    Wake::Stop => break,
                    Wake::TimedOut => {}
                }
            }
        })
        .unwrap();

        coordinator.wake();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(coordinator.stop(), ShutdownOutcome::Completed);
    }

    #[test]
    fn test_hung_task_times_out() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let coordinator = ShutdownCoordinator::spawn("hung", None, Duration::from_millis(50), move |_token| {
            // Ignores the stop request until released.
            let _ = release_rx.recv();
        })
        .unwrap();

        let started = Instant::now();
        assert_eq!(coordinator.stop(), ShutdownOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!coordinator.is_finished());

        release_tx.send(()).unwrap();
    }

    #[test]
    fn test_panicking_task_acknowledges() {
        let coordinator = ShutdownCoordinator::spawn("panics", None, Duration::from_secs(5), |_token| {
            panic!("task failure");
        })
        .unwrap();
        assert_eq!(coordinator.stop(), ShutdownOutcome::Completed);
    }

    #[test]
    fn test_task_stops_itself() {
        let (coordinator_tx, coordinator_rx) = mpsc::channel::<Arc<ShutdownCoordinator>>();
        let (outcome_tx, outcome_rx) = mpsc::channel();
        let coordinator = Arc::new(
            ShutdownCoordinator::spawn("self-stop", None, Duration::from_secs(30), move |token| {
                let own = coordinator_rx.recv().unwrap();
                let started = Instant::now();
                let outcome = own.stop();
                outcome_tx.send((outcome, started.elapsed(), token.is_stopped())).unwrap();
            })
            .unwrap(),
        );
        coordinator_tx.send(Arc::clone(&coordinator)).unwrap();

        let (outcome, elapsed, stopped) = outcome_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome, ShutdownOutcome::Completed);
        assert!(elapsed < Duration::from_secs(5));
        assert!(stopped);
        assert_eq!(coordinator.stop(), ShutdownOutcome::AlreadyRequested);
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(ShutdownOutcome::Completed.into_result(), Ok(()));
        assert_eq!(ShutdownOutcome::AlreadyRequested.into_result(), Ok(()));
        assert_eq!(ShutdownOutcome::TimedOut.into_result(), Err(DriverError::Timeout));
    }

    #[test]
    fn test_token_wait_timeout() {
        let signal = Arc::new(Signal::default());
        let token = StopToken(Arc::clone(&signal));
        assert_eq!(token.wait(Some(Duration::from_millis(10))), Wake::TimedOut);
        signal.update(|s| s.wake = true);
        assert_eq!(token.wait(Some(Duration::from_millis(10))), Wake::Woken);
        signal.update(|s| {
            s.wake = true;
            s.stop = true;
        });
        assert_eq!(token.wait(None), Wake::Stop);
        assert!(token.is_stopped());
    }
}

//! Port lifecycle state machine.
//!
//! The whole state lives in a single `AtomicU8` so the shutdown path and the
//! background notification thread never race on it: every transition is a
//! compare-and-swap from an explicit source state.
//!
//! ```text
//! ┌─────────────┐ create_param ┌─────────────┐ accept_interrupts ┌─────────┐
//! │ Constructed │ ───────────> │ Initialized │ ────────────────> │ Running │
//! └─────────────┘              └─────────────┘                   └─────────┘
//!        │                            │                               │
//!        └────────────────────────────┴───────── request_shutdown() ──┘
//!                                                       │
//!                                                       ▼
//!                       ┌──────────────────┐  complete  ┌───────────────────┐
//!                       │ ShutdownComplete │ <───────── │ ShutdownRequested │
//!                       └──────────────────┘            └───────────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Port lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum DriverState {
    /// Built, no parameters declared yet.
    Constructed = 0,
    /// Parameters declared.
    Initialized = 1,
    /// The host runtime accepts interrupts; I/O and callbacks are live.
    Running = 2,
    /// Shutdown was requested; background activity is stopping.
    ShutdownRequested = 3,
    /// Background activity has stopped (or was abandoned after a timeout).
    ShutdownComplete = 4,
}

impl DriverState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => DriverState::Constructed,
            1 => DriverState::Initialized,
            2 => DriverState::Running,
            3 => DriverState::ShutdownRequested,
            _ => DriverState::ShutdownComplete,
        }
    }
}

/// The tri-state shutdown flag, as seen by derived drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    NotRequested,
    Requested,
    Completed,
}

/// Atomic lifecycle tracker of one port.
pub struct DriverLifecycle(AtomicU8);

impl DriverLifecycle {
    /// Creates a lifecycle in the `Constructed` state.
    pub const fn new() -> Self {
        Self(AtomicU8::new(DriverState::Constructed as u8))
    }

    #[inline]
    pub fn state(&self) -> DriverState {
        DriverState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Projection onto the tri-state shutdown flag.
    pub fn shutdown_state(&self) -> ShutdownState {
        match self.state() {
            DriverState::ShutdownRequested => ShutdownState::Requested,
            DriverState::ShutdownComplete => ShutdownState::Completed,
            _ => ShutdownState::NotRequested,
        }
    }

    /// Moves `from` to `to` atomically. Returns `false` if the state was not
    /// `from`.
    fn transition(&self, from: DriverState, to: DriverState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Constructed → Initialized`; no-op in any other state.
    pub fn mark_initialized(&self) -> bool {
        self.transition(DriverState::Constructed, DriverState::Initialized)
    }

    /// `Constructed | Initialized → Running`.
    pub fn mark_running(&self) -> bool {
        self.transition(DriverState::Initialized, DriverState::Running)
            || self.transition(DriverState::Constructed, DriverState::Running)
    }

    /// Moves any pre-shutdown state to `ShutdownRequested`.
    ///
    /// Returns `true` only for the call that performed the transition, so the
    /// stop sequence runs exactly once however often shutdown is requested.
    pub fn request_shutdown(&self) -> bool {
        loop {
            let current = self.0.load(Ordering::Acquire);
            if current >= DriverState::ShutdownRequested as u8 {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                DriverState::ShutdownRequested as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    /// `ShutdownRequested → ShutdownComplete`.
    pub fn complete_shutdown(&self) -> bool {
        self.transition(DriverState::ShutdownRequested, DriverState::ShutdownComplete)
    }

    /// Shutdown was requested but has not completed yet.
    #[inline]
    pub fn needs_shutdown(&self) -> bool {
        self.state() == DriverState::ShutdownRequested
    }

    /// Shutdown has not been requested.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.state() < DriverState::ShutdownRequested
    }
}

impl Default for DriverLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DriverLifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DriverLifecycle")
            .field("state", &self.state())
            .finish()
    }
}

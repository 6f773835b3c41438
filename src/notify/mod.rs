//! Interrupt listeners and dispatch.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ set_param / status / alarm
//! │ Port driver  │ ─────────────────────────────┐
//! └──────┬───────┘                              ▼
//!        │ call_param_callbacks       ┌───────────────────┐
//!        │                            │ ParamTable (dirty)│
//!        ▼                            └─────────┬─────────┘
//! ┌───────────────────────────┐  under the lock │ drain_dirty
//! │ DriverCore                │ <───────────────┘
//! │  snapshot events          │
//! │  InterruptRegistry        │  targets(type, addr, reason)
//! └──────┬────────────────────┘
//!        │ lock released
//!        ▼
//! ┌───────────────────────────┐
//! │ dispatch::deliver         │  each listener isolated
//! └───────────────────────────┘
//! ```

pub(crate) mod dispatch;
mod listener;
mod registry;

pub use dispatch::{DispatchStats, DispatchSummary, deliver};
pub use listener::{InterruptEvent, Listener, ListenerId, ListenerRecord, ListenerSpec};
pub use registry::InterruptRegistry;

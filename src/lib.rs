//! # Port driver base
//!
//! Shared machinery for control-system port drivers: a typed parameter
//! cache per device address, interrupt listeners notified of value changes,
//! a bounded shutdown protocol for background threads, and a process-wide
//! registry of ports by name.
//!
//! ## Architecture
//!
//! ### Parameters
//! - [`ParamTable`]: ordered, name-indexed entries for one address, with dirty tracking
//! - [`ParamValue`] / [`ParamType`]: the tagged value space
//! - [`ParamSet`]: a reusable list of declarations
//!
//! ### Interrupts
//! - [`InterruptRegistry`]: listeners keyed by (type, address)
//! - [`Listener`] / [`ListenerSpec`]: callback and filter
//! - [`InterruptEvent`]: what listeners receive
//!
//! ### Ports
//! - [`DriverCore`]: lock, parameter lists, dispatch and lifecycle of one port
//! - [`PortDriver`]: the trait concrete drivers implement
//! - [`PortRegistry`]: name lookup and exit-time teardown
//! - [`ShutdownCoordinator`]: one background thread with a bounded stop
//!
//! ## Example
//!
//! ```rust,ignore
//! use portdriver::{DriverConfig, DriverCore, Listener, ListenerSpec, ParamType};
//!
//! let core = DriverCore::new(DriverConfig::new("PS1"))?;
//! let temperature = core.create_param_all("Temperature", ParamType::Float64)?;
//!
//! core.register_interrupt(
//!     ListenerSpec::new(ParamType::Float64, 0).for_reason(temperature),
//!     Listener::infallible(|event| println!("T = {}", event.value)),
//! )?;
//!
//! // One I/O cycle: update the cache, then notify.
//! core.set_param(0, temperature, 23.5f64)?;
//! core.call_param_callbacks(0, 0)?;
//! ```

#[macro_use]
extern crate log;

mod config;
mod driver;
mod error;
mod lifecycle;
mod notify;
mod param;
mod port;
mod registry;
mod shutdown;

pub use config::{DEFAULT_SHUTDOWN_TIMEOUT, DriverConfig, InterfaceMask, PortFlags, ThreadOptions};
pub use driver::{ParamHandle, PortDriver};
pub use error::{DriverError, DriverResult, ListenerError, ParamStatus};
pub use lifecycle::{DriverLifecycle, DriverState, ShutdownState};
pub use port::{DriverCore, PortGuard};
pub use registry::PortRegistry;
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome, StopToken, Wake};

pub use param::{
    DigitalReason, EnumChoice, EnumChoices, GenericPointer, MAX_ENUM_STATES, ParamDef, ParamEntry,
    ParamKind, ParamSet, ParamSnapshot, ParamTable, ParamType, ParamValue,
};

pub use notify::{
    DispatchStats, DispatchSummary, InterruptEvent, InterruptRegistry, Listener, ListenerId,
    ListenerRecord, ListenerSpec,
};

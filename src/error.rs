//! Error and status types shared by the parameter library, the dispatcher and
//! the port registry.

use thiserror::Error;

use crate::param::ParamType;

/// Errors returned by port driver operations.
///
/// Every per-call failure is reported through this type; none of the
/// accessors panic on bad input. Listener failures never surface here, they
/// are isolated by the dispatcher (see [`ListenerError`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// No parameter with this name exists in the addressed list.
    #[error("parameter '{name}' not found")]
    ParamNotFound { name: String },

    /// A parameter with this name already exists in the addressed list.
    #[error("parameter '{name}' already exists")]
    DuplicateName { name: String },

    /// Typed access against an entry of a different type.
    #[error("parameter {index} is {actual:?}, not {requested:?}")]
    TypeMismatch {
        index: usize,
        requested: ParamType,
        actual: ParamType,
    },

    /// The parameter index is not present in the addressed list.
    #[error("parameter index {index} out of range for list {list}")]
    IndexOutOfRange { list: usize, index: usize },

    /// The list (address) is not below the port's `max_addr`.
    #[error("list {list} out of range (max_addr = {max_addr})")]
    ListOutOfRange { list: usize, max_addr: usize },

    /// An array does not fit into the destination buffer.
    #[error("array of {len} elements exceeds capacity {capacity}")]
    ArrayTooLarge { len: usize, capacity: usize },

    /// The parameter has never been given a value.
    #[error("parameter {index} in list {list} is undefined")]
    Undefined { list: usize, index: usize },

    /// The driver does not implement this interface.
    #[error("interface {interface} not supported by this port")]
    Unsupported { interface: &'static str },

    /// The same listener is already registered for this key.
    #[error("listener already registered")]
    DuplicateListener,

    /// A port with this name is already registered.
    #[error("port '{name}' already registered")]
    DuplicatePort { name: String },

    /// No port with this name is registered.
    #[error("port '{name}' not found")]
    PortNotFound { name: String },

    /// The addressed device is not connected.
    #[error("address {addr} is disconnected")]
    Disconnected { addr: usize },

    /// A bounded wait expired.
    #[error("operation timed out")]
    Timeout,

    /// Programming-contract violation.
    #[error("internal inconsistency: {0}")]
    Internal(String),
}

/// Result alias used throughout the crate.
pub type DriverResult<T = ()> = Result<T, DriverError>;

/// Failure reported by an interrupt listener.
///
/// Returned by listeners, or synthesized by the dispatcher when a listener
/// panics or rejects an array length. Failures are logged and counted, never
/// propagated to the code that triggered the callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    /// The listener refused the update.
    #[error("listener rejected update: {0}")]
    Rejected(String),

    /// The array is longer than the listener accepts.
    #[error("array length {len} exceeds listener capacity {max}")]
    LengthMismatch { len: usize, max: usize },

    /// The listener panicked.
    #[error("listener panicked")]
    Panicked,
}

/// Result code attached to every cached parameter.
///
/// Reads return the entry's status alongside the value so the record layer
/// can raise an alarm while still showing the last value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamStatus {
    #[default]
    Success,
    Timeout,
    Overflow,
    Error,
    Disconnected,
    Disabled,
}

impl ParamStatus {
    /// Returns `true` for [`ParamStatus::Success`].
    #[inline]
    pub fn is_success(self) -> bool {
        self == ParamStatus::Success
    }
}

impl core::fmt::Display for ParamStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ParamStatus::Success => "success",
            ParamStatus::Timeout => "timeout",
            ParamStatus::Overflow => "overflow",
            ParamStatus::Error => "error",
            ParamStatus::Disconnected => "disconnected",
            ParamStatus::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::TypeMismatch {
            index: 3,
            requested: ParamType::Int32,
            actual: ParamType::Float64,
        };
        assert_eq!(err.to_string(), "parameter 3 is Float64, not Int32");

        let err = DriverError::ListOutOfRange { list: 4, max_addr: 2 };
        assert_eq!(err.to_string(), "list 4 out of range (max_addr = 2)");
    }

    #[test]
    fn test_status_default_is_success() {
        assert!(ParamStatus::default().is_success());
        assert!(!ParamStatus::Timeout.is_success());
        assert_eq!(ParamStatus::Disconnected.to_string(), "disconnected");
    }
}

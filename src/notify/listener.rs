//! Listener records and the event passed to them.

use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{ListenerError, ParamStatus};
use crate::param::{ParamType, ParamValue};

/// A value change delivered to interrupt listeners.
///
/// The value is a snapshot taken under the port lock; by the time a listener
/// runs the cached value may already have moved on, in which case another
/// event follows.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptEvent {
    pub data_type: ParamType,
    pub addr: usize,
    /// Parameter index that changed.
    pub reason: usize,
    pub value: ParamValue,
    pub status: ParamStatus,
    pub alarm_status: i32,
    pub alarm_severity: i32,
    pub timestamp: SystemTime,
    /// Digital bits that triggered the event; zero for other types.
    pub digital_bits: u32,
}

type ListenerFn = dyn Fn(&InterruptEvent) -> Result<(), ListenerError> + Send + Sync;

/// A registered callback.
///
/// The closure captures whatever context the listener needs. Identity is the
/// allocation: clones of one `Listener` are the same listener.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&InterruptEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wraps an infallible closure.
    pub fn infallible<F>(f: F) -> Self
    where
        F: Fn(&InterruptEvent) + Send + Sync + 'static,
    {
        Self::new(move |event| {
            f(event);
            Ok(())
        })
    }

    #[inline]
    pub fn call(&self, event: &InterruptEvent) -> Result<(), ListenerError> {
        (self.0)(event)
    }

    #[inline]
    pub fn same_as(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl core::fmt::Debug for Listener {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0))
    }
}

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// What a listener wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSpec {
    pub data_type: ParamType,
    pub addr: usize,
    /// Only this parameter; `None` accepts every parameter of the type.
    pub reason: Option<usize>,
    /// Longest array the listener accepts.
    pub max_elements: Option<usize>,
    /// Digital bits the listener watches.
    pub digital_mask: u32,
}

impl ListenerSpec {
    pub fn new(data_type: ParamType, addr: usize) -> Self {
        Self {
            data_type,
            addr,
            reason: None,
            max_elements: None,
            digital_mask: u32::MAX,
        }
    }

    pub fn for_reason(mut self, reason: usize) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = Some(max_elements);
        self
    }

    pub fn with_digital_mask(mut self, mask: u32) -> Self {
        self.digital_mask = mask;
        self
    }

    /// Whether an event for `reason` with `digital_bits` concerns this
    /// listener.
    pub fn accepts(&self, reason: usize, digital_bits: u32) -> bool {
        if self.reason.is_some_and(|r| r != reason) {
            return false;
        }
        self.data_type != ParamType::UInt32Digital || self.digital_mask & digital_bits != 0
    }
}

/// A listener together with its registration.
#[derive(Debug, Clone)]
pub struct ListenerRecord {
    pub id: ListenerId,
    pub spec: ListenerSpec,
    pub listener: Listener,
}

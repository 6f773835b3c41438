//! Fan-out of parameter changes to listeners.
//!
//! Callers snapshot the event and the target list while holding the port
//! lock, release it, then call [`deliver`]. Listeners may therefore call
//! back into the port. Each listener runs in isolation: an error result or a
//! panic is logged and counted and the remaining listeners still run.

use core::sync::atomic::{AtomicU64, Ordering};
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::ListenerError;

use super::listener::{InterruptEvent, ListenerRecord};

/// Outcome of one or more dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchSummary {
    /// Parameter changes dispatched.
    pub events: usize,
    /// Successful listener invocations.
    pub delivered: usize,
    /// Failed listener invocations.
    pub failed: usize,
}

impl core::ops::AddAssign for DispatchSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.events += rhs.events;
        self.delivered += rhs.delivered;
        self.failed += rhs.failed;
    }
}

/// Dispatch counters of a port.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Callback sweeps run.
    pub sweep_count: AtomicU64,
    /// Events dispatched.
    pub event_count: AtomicU64,
    /// Successful listener invocations.
    pub delivery_count: AtomicU64,
    /// Failed listener invocations.
    pub failure_count: AtomicU64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_sweep(&self) {
        self.sweep_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record(&self, summary: &DispatchSummary) {
        self.event_count
            .fetch_add(summary.events as u64, Ordering::Relaxed);
        self.delivery_count
            .fetch_add(summary.delivered as u64, Ordering::Relaxed);
        self.failure_count
            .fetch_add(summary.failed as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn sweeps(&self) -> u64 {
        self.sweep_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn deliveries(&self) -> u64 {
        self.delivery_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failures(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }
}

/// Invokes one listener, turning a panic or an oversized array into a
/// listener failure.
fn invoke(record: &ListenerRecord, event: &InterruptEvent) -> Result<(), ListenerError> {
    if let (Some(max), Some(len)) = (record.spec.max_elements, event.value.len()) {
        if len > max {
            return Err(ListenerError::LengthMismatch { len, max });
        }
    }
    match catch_unwind(AssertUnwindSafe(|| record.listener.call(event))) {
        Ok(result) => result,
        Err(_) => Err(ListenerError::Panicked),
    }
}

/// Delivers `event` to every target, in order.
///
/// Must be called without the port's data borrowed. Failures are logged
/// against `port` and reflected in the returned summary only.
pub fn deliver(port: &str, event: &InterruptEvent, targets: &[ListenerRecord]) -> DispatchSummary {
    let mut summary = DispatchSummary {
        events: 1,
        ..DispatchSummary::default()
    };
    for record in targets {
        match invoke(record, event) {
            Ok(()) => summary.delivered += 1,
            Err(err) => {
                summary.failed += 1;
                warn!(
                    "{}: listener {:?} failed on {} addr {} reason {}: {}",
                    port, record.id, event.data_type, event.addr, event.reason, err
                );
            }
        }
    }
    trace!(
        "{}: {} addr {} reason {} -> {} delivered, {} failed",
        port, event.data_type, event.addr, event.reason, summary.delivered, summary.failed
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParamStatus;
    use crate::notify::{Listener, ListenerId, ListenerSpec};
    use crate::param::{ParamType, ParamValue};
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::SystemTime;

    fn event(value: ParamValue) -> InterruptEvent {
        InterruptEvent {
            data_type: value.param_type(),
            addr: 0,
            reason: 0,
            value,
            status: ParamStatus::Success,
            alarm_status: 0,
            alarm_severity: 0,
            timestamp: SystemTime::now(),
            digital_bits: 0,
        }
    }

    fn record(id: u64, spec: ListenerSpec, listener: Listener) -> ListenerRecord {
        ListenerRecord {
            id: ListenerId(id),
            spec,
            listener,
        }
    }

    #[test]
    fn test_deliver_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let targets: Vec<ListenerRecord> = (1..=3)
            .map(|i| {
                let seen = Arc::clone(&seen);
                record(
                    i,
                    ListenerSpec::new(ParamType::Int32, 0),
                    Listener::infallible(move |_| seen.lock().unwrap().push(i)),
                )
            })
            .collect();

        let summary = deliver("test", &event(ParamValue::Int32(1)), &targets);
        assert_eq!(summary, DispatchSummary { events: 1, delivered: 3, failed: 0 });
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_deliver_isolates_failures() {
        let hits = Arc::new(Mutex::new(0));
        let hits_clone = Arc::clone(&hits);
        let spec = ListenerSpec::new(ParamType::Float64, 0);
        let targets = vec![
            record(1, spec, Listener::new(|_| Err(ListenerError::Rejected("busy".into())))),
            record(2, spec, Listener::infallible(|_| panic!("listener bug"))),
            record(3, spec, Listener::infallible(move |_| *hits_clone.lock().unwrap() += 1)),
        ];

        let summary = deliver("test", &event(ParamValue::Float64(2.0)), &targets);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.delivered, 1);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_deliver_array_length_per_listener() {
        let spec = ListenerSpec::new(ParamType::Int32Array, 0);
        let targets = vec![
            record(1, spec.with_max_elements(2), Listener::infallible(|_| {})),
            record(2, spec.with_max_elements(8), Listener::infallible(|_| {})),
        ];
        let summary = deliver("test", &event(ParamValue::Int32Array(vec![1, 2, 3])), &targets);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.delivered, 1);
    }

    #[test]
    fn test_stats_accumulate() {
        let stats = DispatchStats::new();
        stats.record_sweep();
        stats.record(&DispatchSummary { events: 2, delivered: 3, failed: 1 });
        stats.record(&DispatchSummary { events: 1, delivered: 1, failed: 0 });
        assert_eq!(stats.sweeps(), 1);
        assert_eq!(stats.events(), 3);
        assert_eq!(stats.deliveries(), 4);
        assert_eq!(stats.failures(), 1);
    }
}

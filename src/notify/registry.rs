//! Interrupt listener registry.
//!
//! Maps `(data type, address)` to the listeners registered for it, in
//! registration order. The registry belongs to a port and is guarded by the
//! port lock, like the parameter tables.

use std::collections::{BTreeMap, HashMap};

use crate::error::{DriverError, DriverResult};
use crate::param::ParamType;

use super::listener::{Listener, ListenerId, ListenerRecord, ListenerSpec};

/// Listener registry of one port.
#[derive(Debug, Default)]
pub struct InterruptRegistry {
    /// Listeners indexed by `(data type, address)`.
    table: BTreeMap<(ParamType, usize), Vec<ListenerRecord>>,
    /// Reverse index used by `unregister`.
    keys: HashMap<ListenerId, (ParamType, usize)>,
    next_id: u64,
}

impl InterruptRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DuplicateListener`] if the same listener is
    /// already registered for the same data type, address and reason.
    pub fn register(&mut self, spec: ListenerSpec, listener: Listener) -> DriverResult<ListenerId> {
        let key = (spec.data_type, spec.addr);
        let records = self.table.entry(key).or_default();

        if records
            .iter()
            .any(|r| r.spec.reason == spec.reason && r.listener.same_as(&listener))
        {
            return Err(DriverError::DuplicateListener);
        }

        self.next_id += 1;
        let id = ListenerId(self.next_id);
        records.push(ListenerRecord { id, spec, listener });
        self.keys.insert(id, key);

        debug!(
            "Registered listener {:?} for {} addr {} reason {:?}",
            id, spec.data_type, spec.addr, spec.reason
        );
        Ok(id)
    }

    /// Removes a listener. Unknown or already removed ids are ignored.
    ///
    /// Returns whether a listener was removed.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let Some(key) = self.keys.remove(&id) else {
            return false;
        };
        if let Some(records) = self.table.get_mut(&key) {
            records.retain(|r| r.id != id);
            if records.is_empty() {
                self.table.remove(&key);
            }
        }
        debug!("Unregistered listener {:?}", id);
        true
    }

    /// Listeners for `(data_type, addr)` in registration order.
    pub fn listeners(&self, data_type: ParamType, addr: usize) -> &[ListenerRecord] {
        self.table
            .get(&(data_type, addr))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Clones the listeners interested in one parameter change.
    pub fn targets(
        &self,
        data_type: ParamType,
        addr: usize,
        reason: usize,
        digital_bits: u32,
    ) -> Vec<ListenerRecord> {
        self.listeners(data_type, addr)
            .iter()
            .filter(|r| r.spec.accepts(reason, digital_bits))
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.keys.contains_key(&id)
    }

    /// Total number of registered listeners.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Every record, grouped by data type then address.
    pub fn iter(&self) -> impl Iterator<Item = &ListenerRecord> {
        self.table.values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener() -> Listener {
        Listener::infallible(|_| {})
    }

    #[test]
    fn test_registry_register_and_lookup() {
        let mut registry = InterruptRegistry::new();
        assert!(registry.is_empty());

        let a = registry
            .register(ListenerSpec::new(ParamType::Float64, 0), listener())
            .unwrap();
        let b = registry
            .register(ListenerSpec::new(ParamType::Float64, 0), listener())
            .unwrap();
        registry
            .register(ListenerSpec::new(ParamType::Float64, 1), listener())
            .unwrap();

        assert_eq!(registry.len(), 3);
        let ids: Vec<ListenerId> = registry
            .listeners(ParamType::Float64, 0)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![a, b]);
        assert!(registry.listeners(ParamType::Int32, 0).is_empty());
    }

    #[test]
    fn test_registry_duplicate_register() {
        let mut registry = InterruptRegistry::new();
        let l = listener();
        let spec = ListenerSpec::new(ParamType::Int32, 0);

        registry.register(spec, l.clone()).unwrap();
        assert_eq!(registry.register(spec, l.clone()), Err(DriverError::DuplicateListener));

        // Same listener on another reason or address is a distinct registration.
        registry.register(spec.for_reason(2), l.clone()).unwrap();
        registry.register(ListenerSpec::new(ParamType::Int32, 1), l).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_registry_unregister_idempotent() {
        let mut registry = InterruptRegistry::new();
        let id = registry
            .register(ListenerSpec::new(ParamType::Octet, 0), listener())
            .unwrap();

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(!registry.unregister(ListenerId(999)));
        assert!(registry.is_empty());
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_registry_targets_filter() {
        let mut registry = InterruptRegistry::new();
        let any = registry
            .register(ListenerSpec::new(ParamType::Int32, 0), listener())
            .unwrap();
        registry
            .register(ListenerSpec::new(ParamType::Int32, 0).for_reason(7), listener())
            .unwrap();

        let targets = registry.targets(ParamType::Int32, 0, 3, 0);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, any);
        assert_eq!(registry.targets(ParamType::Int32, 0, 7, 0).len(), 2);
    }
}

//! Process-wide port registry.
//!
//! Ports are looked up by name by the record layer, by shell commands and by
//! other drivers. The registry also owns the exit-time teardown: destructible
//! ports are shut down and erased in reverse registration order, so a port
//! built on top of another one stops first.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use core::sync::atomic::{AtomicU64, Ordering};
use spin::RwLock;

use crate::driver::PortDriver;
use crate::error::{DriverError, DriverResult};
use crate::shutdown::ShutdownOutcome;

#[derive(Clone)]
struct PortEntry {
    seq: u64,
    driver: Arc<dyn PortDriver>,
    /// Same allocation as `driver`, kept for downcasting.
    any: Arc<dyn Any + Send + Sync>,
}

/// Name to driver map.
///
/// Lookups take a read lock; registration and removal take the write lock.
/// Driver calls never happen while the lock is held.
pub struct PortRegistry {
    ports: RwLock<BTreeMap<String, PortEntry>>,
    /// Registration counter, used to order teardown.
    next_seq: AtomicU64,
}

static GLOBAL_PORTS: spin::Once<PortRegistry> = spin::Once::new();

impl PortRegistry {
    pub fn new() -> Self {
        Self {
            ports: RwLock::new(BTreeMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static PortRegistry {
        GLOBAL_PORTS.call_once(PortRegistry::new)
    }

    /// Registers a driver under its port name.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DuplicatePort`] if the name is taken.
    pub fn register<T: PortDriver>(&self, driver: Arc<T>) -> DriverResult {
        let name = driver.port_name().to_owned();
        let mut ports = self.ports.write();
        if ports.contains_key(&name) {
            return Err(DriverError::DuplicatePort { name });
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let entry = PortEntry {
            seq,
            driver: driver.clone(),
            any: driver,
        };
        ports.insert(name.clone(), entry);
        info!("Registered port '{}'", name);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn PortDriver>> {
        self.ports.read().get(name).map(|e| Arc::clone(&e.driver))
    }

    /// Looks a port up as its concrete driver type.
    ///
    /// Returns `None` if the name is unknown or the driver is another type.
    pub fn find_as<T: PortDriver>(&self, name: &str) -> Option<Arc<T>> {
        let any = self.ports.read().get(name).map(|e| Arc::clone(&e.any))?;
        any.downcast::<T>().ok()
    }

    /// Like [`find`](Self::find), with an error naming the port.
    pub fn get(&self, name: &str) -> DriverResult<Arc<dyn PortDriver>> {
        self.find(name).ok_or_else(|| DriverError::PortNotFound { name: name.into() })
    }

    /// Removes a port without shutting it down.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn PortDriver>> {
        let entry = self.ports.write().remove(name)?;
        debug!("Removed port '{}'", name);
        Some(entry.driver)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.ports.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ports.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.read().is_empty()
    }

    /// Shuts down and erases every destructible port, most recently
    /// registered first. Other ports are left registered.
    ///
    /// Meant for the host's exit path; safe to call more than once.
    pub fn shutdown_all(&self) -> Vec<(String, ShutdownOutcome)> {
        let mut targets: Vec<(String, PortEntry)> = self
            .ports
            .read()
            .iter()
            .filter(|(_, e)| e.driver.core().config().is_destructible())
            .map(|(name, e)| (name.clone(), e.clone()))
            .collect();
        targets.sort_by(|a, b| b.1.seq.cmp(&a.1.seq));

        let mut outcomes = Vec::with_capacity(targets.len());
        for (name, entry) in targets {
            let outcome = entry.driver.shutdown();
            if outcome == ShutdownOutcome::TimedOut {
                warn!("Port '{}' did not shut down cleanly", name);
            }
            self.ports.write().remove(&name);
            debug!("Port '{}' shut down: {:?}", name, outcome);
            outcomes.push((name, outcome));
        }
        outcomes
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PortRegistry")
            .field("ports", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DriverConfig, PortFlags};
    use crate::port::DriverCore;

    struct MockPort {
        core: Arc<DriverCore>,
    }

    impl MockPort {
        fn new(name: &str, flags: PortFlags) -> Arc<Self> {
            let core = DriverCore::new(DriverConfig::new(name).with_flags(flags)).unwrap();
            Arc::new(Self { core })
        }
    }

    impl PortDriver for MockPort {
        fn core(&self) -> &DriverCore {
            &self.core
        }
    }

    struct OtherPort {
        core: Arc<DriverCore>,
    }

    impl PortDriver for OtherPort {
        fn core(&self) -> &DriverCore {
            &self.core
        }
    }

    #[test]
    fn test_registry_register_and_find() {
        let registry = PortRegistry::new();
        registry.register(MockPort::new("PS1", PortFlags::empty())).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("PS1").unwrap().port_name(), "PS1");
        assert!(registry.find("PS2").is_none());
        assert_eq!(
            registry.get("PS2").err(),
            Some(DriverError::PortNotFound { name: "PS2".into() })
        );
    }

    #[test]
    fn test_registry_duplicate_name() {
        let registry = PortRegistry::new();
        registry.register(MockPort::new("PS1", PortFlags::empty())).unwrap();
        assert_eq!(
            registry.register(MockPort::new("PS1", PortFlags::empty())),
            Err(DriverError::DuplicatePort { name: "PS1".into() })
        );
    }

    #[test]
    fn test_registry_downcast() {
        let registry = PortRegistry::new();
        registry.register(MockPort::new("PS1", PortFlags::empty())).unwrap();

        assert!(registry.find_as::<MockPort>("PS1").is_some());
        assert!(registry.find_as::<OtherPort>("PS1").is_none());
    }

    #[test]
    fn test_registry_shutdown_all() {
        let registry = PortRegistry::new();
        let first = MockPort::new("first", PortFlags::DESTRUCTIBLE);
        let second = MockPort::new("second", PortFlags::DESTRUCTIBLE);
        registry.register(first.clone()).unwrap();
        registry.register(second.clone()).unwrap();
        registry.register(MockPort::new("static", PortFlags::empty())).unwrap();

        let outcomes = registry.shutdown_all();
        let names: Vec<&str> = outcomes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["second", "first"]);
        assert!(outcomes.iter().all(|(_, o)| *o == ShutdownOutcome::Completed));

        assert_eq!(registry.names(), ["static"]);
        assert!(!first.core.needs_shutdown());
        assert!(registry.shutdown_all().is_empty());
    }
}

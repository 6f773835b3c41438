//! The port driver core: parameter cache, interrupt dispatch and lifecycle.

use std::cell::RefCell;
use std::io::Write;
use std::sync::Arc;
use std::sync::Weak;
use std::time::SystemTime;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::config::DriverConfig;
use crate::error::{DriverError, DriverResult, ParamStatus};
use crate::lifecycle::{DriverLifecycle, DriverState, ShutdownState};
use crate::notify::{
    DispatchStats, DispatchSummary, InterruptEvent, InterruptRegistry, Listener, ListenerId,
    ListenerRecord, ListenerSpec, deliver,
};
use crate::param::{
    DigitalReason, EnumChoices, GenericPointer, ParamKind, ParamSet, ParamSnapshot, ParamTable,
    ParamType, ParamValue,
};
use crate::shutdown::{ShutdownCoordinator, ShutdownOutcome, StopToken, Wake};

type TimestampSource = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// Everything guarded by the port lock.
struct PortState {
    lists: Vec<ParamTable>,
    /// Declarations made for every list. Tables created on demand start
    /// from it, so a list sees the same shared parameters whenever it is
    /// first touched.
    shared: ParamTable,
    interrupts: InterruptRegistry,
    timestamp: SystemTime,
    timestamp_source: Option<TimestampSource>,
    connected: Vec<bool>,
}

impl PortState {
    /// Returns the table for `list`, creating tables up to it on demand.
    fn list_mut(&mut self, list: usize, max_addr: usize) -> DriverResult<&mut ParamTable> {
        if list >= max_addr {
            return Err(DriverError::ListOutOfRange { list, max_addr });
        }
        while self.lists.len() <= list {
            let table = ParamTable::with_declarations_of(self.lists.len(), &self.shared);
            self.lists.push(table);
        }
        Ok(&mut self.lists[list])
    }

    /// Declares `name` in the shared template and every existing list, or in
    /// none of them.
    ///
    /// The parameter takes the same index everywhere, which requires every
    /// existing list to hold exactly the shared declarations so far.
    fn create_shared(&mut self, name: &str, ty: ParamType) -> DriverResult<usize> {
        let index = self.shared.len();
        let taken = self.shared.find(name).is_ok() || self.lists.iter().any(|t| t.find(name).is_ok());
        if taken {
            return Err(DriverError::DuplicateName { name: name.into() });
        }
        if let Some(table) = self.lists.iter().find(|t| t.len() != index) {
            return Err(DriverError::Internal(format!(
                "cannot declare '{name}' in all lists: list {} holds {} parameters, the shared set {index}",
                table.list(),
                table.len()
            )));
        }
        self.shared.create(name, ty)?;
        for table in self.lists.iter_mut() {
            table.create(name, ty)?;
        }
        Ok(index)
    }
}

/// An event ready for delivery, with its listeners.
struct Pending {
    event: InterruptEvent,
    targets: Vec<ListenerRecord>,
}

/// Holds the port lock until dropped or [`unlock`](Self::unlock)ed.
///
/// The lock is reentrant: every accessor of the core can be called while the
/// guard is held, which makes a whole I/O transaction atomic with respect to
/// other threads.
pub struct PortGuard<'a>(ReentrantMutexGuard<'a, RefCell<PortState>>);

impl PortGuard<'_> {
    pub fn unlock(self) {}
}

/// Parameter cache and interrupt engine shared by every port driver.
///
/// A concrete driver embeds an `Arc<DriverCore>`, declares its parameters at
/// construction, updates cached values while doing I/O, then calls
/// [`call_param_callbacks`](Self::call_param_callbacks) once per I/O cycle
/// to notify listeners of everything that changed.
///
/// # Locking
///
/// One reentrant mutex guards the parameter tables, the listener registry,
/// the timestamp and the connection state. Listener callbacks run after the
/// state has been released, so they may call back into the core.
///
/// # Shutdown
///
/// Ports created with [`PortFlags::DESTRUCTIBLE`](crate::PortFlags) run a
/// background notification thread and must be shut down with
/// [`shutdown`](Self::shutdown) before being dropped;
/// [`PortRegistry::shutdown_all`](crate::PortRegistry::shutdown_all) does
/// this at process exit.
pub struct DriverCore {
    config: DriverConfig,
    state: ReentrantMutex<RefCell<PortState>>,
    lifecycle: DriverLifecycle,
    stats: DispatchStats,
    /// Background tasks in spawn order; the notification task comes first.
    tasks: Mutex<Vec<ShutdownCoordinator>>,
}

impl DriverCore {
    /// Creates a port core.
    ///
    /// Destructible ports also get their notification thread here.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification thread cannot be spawned.
    pub fn new(config: DriverConfig) -> DriverResult<Arc<Self>> {
        let max_addr = config.max_addr.max(1);
        let config = DriverConfig { max_addr, ..config };

        let state = PortState {
            lists: vec![ParamTable::new(0)],
            shared: ParamTable::new(0),
            interrupts: InterruptRegistry::new(),
            timestamp: SystemTime::now(),
            timestamp_source: None,
            connected: vec![config.auto_connect; max_addr],
        };

        let port = Arc::new(Self {
            config,
            state: ReentrantMutex::new(RefCell::new(state)),
            lifecycle: DriverLifecycle::new(),
            stats: DispatchStats::new(),
            tasks: Mutex::new(Vec::new()),
        });

        if port.config.is_destructible() {
            let weak = Arc::downgrade(&port);
            let coordinator = ShutdownCoordinator::spawn(
                port.config.thread_name(),
                port.config.callback_thread.stack_size,
                port.config.shutdown_timeout,
                move |token| notification_task(weak, token),
            )?;
            port.tasks.lock().push(coordinator);
        }

        debug!(
            "Created port '{}' (max_addr={}, flags={:?})",
            port.config.port_name, port.config.max_addr, port.config.flags
        );
        Ok(port)
    }

    #[inline]
    pub fn port_name(&self) -> &str {
        &self.config.port_name
    }

    #[inline]
    pub fn max_addr(&self) -> usize {
        self.config.max_addr
    }

    #[inline]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Takes the port lock for a multi-step transaction.
    pub fn lock(&self) -> PortGuard<'_> {
        PortGuard(self.state.lock())
    }

    /// Runs `f` on the port state under the lock.
    fn with_state<R>(&self, f: impl FnOnce(&mut PortState) -> DriverResult<R>) -> DriverResult<R> {
        let guard = self.state.lock();
        let mut state = guard
            .try_borrow_mut()
            .map_err(|_| DriverError::Internal("port state re-entered while borrowed".into()))?;
        f(&mut state)
    }

    fn with_list<R>(
        &self,
        list: usize,
        f: impl FnOnce(&mut ParamTable) -> DriverResult<R>,
    ) -> DriverResult<R> {
        let max_addr = self.config.max_addr;
        self.with_state(|s| f(s.list_mut(list, max_addr)?))
    }

    /// Fails with [`DriverError::Unsupported`] unless the port serves `ty`.
    pub fn check_interface(&self, ty: ParamType) -> DriverResult {
        if self.config.interfaces.contains(ty.interface()) {
            Ok(())
        } else {
            Err(DriverError::Unsupported {
                interface: ty.name(),
            })
        }
    }

    // ---------------------------------------------------------------------
    // Parameter declaration

    /// Declares a parameter in one list and returns its index.
    pub fn create_param(&self, list: usize, name: &str, ty: ParamType) -> DriverResult<usize> {
        let index = self.with_list(list, |t| t.create(name, ty))?;
        self.lifecycle.mark_initialized();
        debug!(
            "{}: created parameter '{}' ({}) list {} index {}",
            self.port_name(),
            name,
            ty,
            list,
            index
        );
        Ok(index)
    }

    /// Declares a parameter in every list, so its index names the same
    /// parameter at every address.
    ///
    /// # Errors
    ///
    /// - [`DriverError::DuplicateName`] if any list already has the name
    /// - [`DriverError::Internal`] if a list holds per-list declarations,
    ///   which would give the parameter different indices
    ///
    /// On error no list is modified.
    pub fn create_param_all(&self, name: &str, ty: ParamType) -> DriverResult<usize> {
        let index = self.with_state(|s| s.create_shared(name, ty))?;
        self.lifecycle.mark_initialized();
        debug!(
            "{}: created parameter '{}' ({}) index {} in all lists",
            self.port_name(),
            name,
            ty,
            index
        );
        Ok(index)
    }

    /// Declares every parameter of `set` in every list.
    pub fn create_params(&self, set: &ParamSet) -> DriverResult<Vec<usize>> {
        set.iter()
            .map(|def| self.create_param_all(&def.name, def.ty))
            .collect()
    }

    pub fn find_param(&self, list: usize, name: &str) -> DriverResult<usize> {
        self.with_list(list, |t| t.find(name))
    }

    pub fn num_params(&self, list: usize) -> DriverResult<usize> {
        self.with_list(list, |t| Ok(t.len()))
    }

    pub fn param_name(&self, list: usize, index: usize) -> DriverResult<String> {
        self.with_list(list, |t| Ok(t.entry(index)?.name().to_owned()))
    }

    pub fn param_type(&self, list: usize, index: usize) -> DriverResult<ParamType> {
        self.with_list(list, |t| Ok(t.entry(index)?.param_type()))
    }

    // ---------------------------------------------------------------------
    // Typed access

    /// Stores a typed value. Returns whether the cached value changed.
    ///
    /// Listeners are notified by the next
    /// [`call_param_callbacks`](Self::call_param_callbacks), or right away
    /// if the port was configured with immediate callbacks.
    pub fn set_param<T: ParamKind>(&self, list: usize, index: usize, value: T) -> DriverResult<bool> {
        self.set_value(list, index, value.into_value())
    }

    /// Stores a tagged value. Returns whether the cached value changed.
    pub fn set_value(&self, list: usize, index: usize, value: ParamValue) -> DriverResult<bool> {
        self.store(list, index, |t| t.set_value(index, value))
    }

    /// Writes the bits of `value` selected by `value_mask` into a digital
    /// parameter. Bits in `interrupt_mask` are reported to listeners on the
    /// next sweep whether or not they changed.
    pub fn set_uint_digital(
        &self,
        list: usize,
        index: usize,
        value: u32,
        value_mask: u32,
        interrupt_mask: u32,
    ) -> DriverResult<bool> {
        self.store(list, index, |t| {
            t.set_uint_digital(index, value, value_mask, interrupt_mask)
        })
    }

    fn store(
        &self,
        list: usize,
        index: usize,
        f: impl FnOnce(&mut ParamTable) -> DriverResult<bool>,
    ) -> DriverResult<bool> {
        let immediate = self.config.immediate_callbacks;
        let max_addr = self.config.max_addr;
        let (changed, pending) = self.with_state(|s| {
            let table = s.list_mut(list, max_addr)?;
            let changed = f(table)?;
            let snapshot = if immediate {
                table.take_dirty(index)?
            } else {
                None
            };
            let pending = self.prepare(s, list, snapshot.into_iter().collect());
            Ok((changed, pending))
        })?;
        if !pending.is_empty() {
            self.fan_out(pending);
        }
        Ok(changed)
    }

    /// Reads a typed value and the parameter's status.
    pub fn get_param<T: ParamKind>(&self, list: usize, index: usize) -> DriverResult<(T, ParamStatus)> {
        self.with_list(list, |t| t.get::<T>(index))
    }

    /// Reads the tagged value and the parameter's status.
    pub fn get_value(&self, list: usize, index: usize) -> DriverResult<(ParamValue, ParamStatus)> {
        self.with_list(list, |t| {
            let (value, status) = t.get_value(index)?;
            Ok((value.clone(), status))
        })
    }

    pub fn get_uint_digital(&self, list: usize, index: usize, mask: u32) -> DriverResult<(u32, ParamStatus)> {
        self.with_list(list, |t| t.get_uint_digital(index, mask))
    }

    /// Enables interrupts for the bits of `mask` on the given transitions.
    pub fn set_digital_interrupt(
        &self,
        list: usize,
        index: usize,
        mask: u32,
        reason: DigitalReason,
    ) -> DriverResult {
        self.with_list(list, |t| t.set_digital_interrupt(index, mask, reason))
    }

    pub fn clear_digital_interrupt(&self, list: usize, index: usize, mask: u32) -> DriverResult {
        self.with_list(list, |t| t.clear_digital_interrupt(index, mask))
    }

    pub fn digital_interrupt(&self, list: usize, index: usize, reason: DigitalReason) -> DriverResult<u32> {
        self.with_list(list, |t| t.digital_interrupt(index, reason))
    }

    pub fn set_param_status(&self, list: usize, index: usize, status: ParamStatus) -> DriverResult {
        self.with_list(list, |t| t.set_status(index, status))
    }

    pub fn param_status(&self, list: usize, index: usize) -> DriverResult<ParamStatus> {
        self.with_list(list, |t| t.status(index))
    }

    pub fn set_param_alarm(&self, list: usize, index: usize, alarm_status: i32, alarm_severity: i32) -> DriverResult {
        self.with_list(list, |t| t.set_alarm(index, alarm_status, alarm_severity))
    }

    /// Returns `(alarm_status, alarm_severity)`.
    pub fn param_alarm(&self, list: usize, index: usize) -> DriverResult<(i32, i32)> {
        self.with_list(list, |t| t.alarm(index))
    }

    // ---------------------------------------------------------------------
    // Interrupts

    /// Registers an interrupt listener.
    ///
    /// # Errors
    ///
    /// - [`DriverError::ListOutOfRange`] if the address is not below `max_addr`
    /// - [`DriverError::Unsupported`] if the port raises no interrupts for the type
    /// - [`DriverError::DuplicateListener`] if already registered
    pub fn register_interrupt(&self, spec: ListenerSpec, listener: Listener) -> DriverResult<ListenerId> {
        if spec.addr >= self.config.max_addr {
            return Err(DriverError::ListOutOfRange {
                list: spec.addr,
                max_addr: self.config.max_addr,
            });
        }
        if !self.config.interrupts.contains(spec.data_type.interface()) {
            return Err(DriverError::Unsupported {
                interface: spec.data_type.name(),
            });
        }
        self.with_state(|s| s.interrupts.register(spec, listener))
    }

    /// Removes a listener; unknown ids are ignored.
    pub fn unregister_interrupt(&self, id: ListenerId) -> bool {
        self.with_state(|s| Ok(s.interrupts.unregister(id)))
            .unwrap_or(false)
    }

    pub fn listener_count(&self) -> usize {
        self.with_state(|s| Ok(s.interrupts.len())).unwrap_or(0)
    }

    /// Turns snapshots of `addr` into events paired with their listeners.
    fn prepare(&self, state: &PortState, addr: usize, snapshots: Vec<ParamSnapshot>) -> Vec<Pending> {
        snapshots
            .into_iter()
            .filter_map(|snap| {
                let data_type = snap.value.param_type();
                if !self.config.interrupts.contains(data_type.interface()) {
                    return None;
                }
                let targets = state
                    .interrupts
                    .targets(data_type, addr, snap.reason, snap.digital_bits);
                Some(Pending {
                    event: InterruptEvent {
                        data_type,
                        addr,
                        reason: snap.reason,
                        value: snap.value,
                        status: snap.status,
                        alarm_status: snap.alarm_status,
                        alarm_severity: snap.alarm_severity,
                        timestamp: state.timestamp,
                        digital_bits: snap.digital_bits,
                    },
                    targets,
                })
            })
            .collect()
    }

    /// Delivers prepared events. Must run with the port state released.
    fn fan_out(&self, pending: Vec<Pending>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for p in &pending {
            summary += deliver(self.port_name(), &p.event, &p.targets);
        }
        self.stats.record(&summary);
        summary
    }

    /// Notifies listeners at `addr` of every parameter of `list` changed
    /// since the previous sweep, in the order the parameters first changed.
    ///
    /// Listener failures are logged and counted in the returned summary;
    /// they never make this call fail.
    pub fn call_param_callbacks(&self, list: usize, addr: usize) -> DriverResult<DispatchSummary> {
        if addr >= self.config.max_addr {
            return Err(DriverError::ListOutOfRange {
                list: addr,
                max_addr: self.config.max_addr,
            });
        }
        let max_addr = self.config.max_addr;
        let pending = self.with_state(|s| {
            let snapshots = s.list_mut(list, max_addr)?.drain_dirty();
            Ok(self.prepare(s, addr, snapshots))
        })?;
        self.stats.record_sweep();
        Ok(self.fan_out(pending))
    }

    /// Sweep of list `addr` to listeners at `addr`.
    pub fn call_callbacks(&self, addr: usize) -> DriverResult<DispatchSummary> {
        self.call_param_callbacks(addr, addr)
    }

    /// Sends the current value of every defined parameter of every list to
    /// its listeners.
    pub fn sweep_all(&self) -> DispatchSummary {
        let pending = self.with_state(|s| {
            let mut pending = Vec::new();
            for list in 0..s.lists.len() {
                let snapshots = s.lists[list].snapshot_all();
                pending.extend(self.prepare(s, list, snapshots));
            }
            Ok(pending)
        });
        match pending {
            Ok(pending) => {
                self.stats.record_sweep();
                self.fan_out(pending)
            }
            Err(err) => {
                error!("{}: initial callback sweep failed: {}", self.port_name(), err);
                DispatchSummary::default()
            }
        }
    }

    /// Dispatches a value that is not cached, such as a waveform acquired
    /// straight from the device. Status and alarm are taken from the
    /// parameter `reason` of list `addr` when it exists.
    fn do_callbacks_value(&self, value: ParamValue, reason: usize, addr: usize) -> DriverResult<DispatchSummary> {
        let max_addr = self.config.max_addr;
        let data_type = value.param_type();
        let pending = self.with_state(|s| {
            let table = s.list_mut(addr, max_addr)?;
            let (status, (alarm_status, alarm_severity)) = match table.entry(reason) {
                Ok(entry) => (entry.status(), entry.alarm()),
                Err(_) => (ParamStatus::Success, (0, 0)),
            };
            let snapshot = ParamSnapshot {
                reason,
                value,
                status,
                alarm_status,
                alarm_severity,
                digital_bits: 0,
            };
            Ok(self.prepare(s, addr, vec![snapshot]))
        })?;
        trace!(
            "{}: direct {} callback reason {} addr {}",
            self.port_name(),
            data_type,
            reason,
            addr
        );
        Ok(self.fan_out(pending))
    }

    /// Dispatches an array to listeners without caching it.
    pub fn do_callbacks_array<T>(&self, values: &[T], reason: usize, addr: usize) -> DriverResult<DispatchSummary>
    where
        T: Clone,
        Vec<T>: ParamKind,
    {
        self.do_callbacks_value(values.to_vec().into_value(), reason, addr)
    }

    pub fn do_callbacks_generic_pointer(
        &self,
        pointer: GenericPointer,
        reason: usize,
        addr: usize,
    ) -> DriverResult<DispatchSummary> {
        self.do_callbacks_value(ParamValue::GenericPointer(pointer), reason, addr)
    }

    pub fn do_callbacks_enum(&self, choices: EnumChoices, reason: usize, addr: usize) -> DriverResult<DispatchSummary> {
        self.do_callbacks_value(ParamValue::Enum(choices), reason, addr)
    }

    // ---------------------------------------------------------------------
    // Timestamps

    /// Installs a function consulted by [`update_timestamp`](Self::update_timestamp).
    ///
    /// The source runs with the port lock held but the port state released,
    /// so it may read back through the core.
    pub fn set_timestamp_source<F>(&self, source: F)
    where
        F: Fn() -> SystemTime + Send + Sync + 'static,
    {
        let source: TimestampSource = Arc::new(source);
        if let Err(err) = self.with_state(|s| {
            s.timestamp_source = Some(source);
            Ok(())
        }) {
            warn!("{}: cannot install timestamp source: {}", self.port_name(), err);
        }
    }

    /// Refreshes the port timestamp from the source or the system clock.
    pub fn update_timestamp(&self) {
        let _guard = self.state.lock();
        let source = match self.with_state(|s| Ok(s.timestamp_source.clone())) {
            Ok(source) => source,
            Err(err) => {
                warn!("{}: cannot update timestamp: {}", self.port_name(), err);
                return;
            }
        };
        let now = match source {
            Some(source) => source(),
            None => SystemTime::now(),
        };
        self.set_timestamp(now);
    }

    pub fn set_timestamp(&self, timestamp: SystemTime) {
        if let Err(err) = self.with_state(|s| {
            s.timestamp = timestamp;
            Ok(())
        }) {
            warn!("{}: cannot set timestamp: {}", self.port_name(), err);
        }
    }

    /// The port timestamp; `UNIX_EPOCH` if the state cannot be read.
    pub fn timestamp(&self) -> SystemTime {
        self.with_state(|s| Ok(s.timestamp)).unwrap_or_else(|err| {
            warn!("{}: cannot read timestamp: {}", self.port_name(), err);
            SystemTime::UNIX_EPOCH
        })
    }

    // ---------------------------------------------------------------------
    // Connection state

    pub fn connect(&self, addr: usize) -> DriverResult {
        self.set_connected(addr, true)
    }

    pub fn disconnect(&self, addr: usize) -> DriverResult {
        self.set_connected(addr, false)
    }

    fn set_connected(&self, addr: usize, connected: bool) -> DriverResult {
        let max_addr = self.config.max_addr;
        self.with_state(|s| {
            let slot = s
                .connected
                .get_mut(addr)
                .ok_or(DriverError::ListOutOfRange { list: addr, max_addr })?;
            if *slot != connected {
                info!(
                    "{}: addr {} {}",
                    self.config.port_name,
                    addr,
                    if connected { "connected" } else { "disconnected" }
                );
            }
            *slot = connected;
            Ok(())
        })
    }

    pub fn is_connected(&self, addr: usize) -> bool {
        self.with_state(|s| Ok(s.connected.get(addr).copied().unwrap_or(false)))
            .unwrap_or(false)
    }

    // ---------------------------------------------------------------------
    // Lifecycle

    #[inline]
    pub fn state(&self) -> DriverState {
        self.lifecycle.state()
    }

    #[inline]
    pub fn shutdown_state(&self) -> ShutdownState {
        self.lifecycle.shutdown_state()
    }

    /// Shutdown was requested and has not completed.
    #[inline]
    pub fn needs_shutdown(&self) -> bool {
        self.lifecycle.needs_shutdown()
    }

    /// Called by the host runtime once it accepts interrupts. Moves the port
    /// to `Running` and sends every defined value to its listeners, on the
    /// notification thread when the port has one.
    pub fn accept_interrupts(&self) {
        if !self.lifecycle.mark_running() {
            return;
        }
        if self.config.is_destructible() {
            if let Some(notifier) = self.tasks.lock().first() {
                notifier.wake();
                return;
            }
        }
        self.sweep_all();
    }

    /// Runs `task` on a background thread stopped by [`shutdown`](Self::shutdown).
    ///
    /// The task should return promptly once its [`StopToken`] reports
    /// [`Wake::Stop`].
    pub fn spawn_task<F>(&self, name: &str, task: F) -> DriverResult
    where
        F: FnOnce(StopToken) + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        if !self.lifecycle.is_live() {
            return Err(DriverError::Internal(format!(
                "{}: cannot start '{}' after shutdown",
                self.port_name(),
                name
            )));
        }
        let coordinator = ShutdownCoordinator::spawn(
            format!("{}-{}", self.port_name(), name),
            self.config.callback_thread.stack_size,
            self.config.shutdown_timeout,
            task,
        )?;
        tasks.push(coordinator);
        Ok(())
    }

    /// Stops every background task, most recently spawned first, each with
    /// the configured bound. Only the first call does anything.
    pub fn shutdown(&self) -> ShutdownOutcome {
        if !self.lifecycle.request_shutdown() {
            return ShutdownOutcome::AlreadyRequested;
        }
        debug!("{}: shutdown requested", self.port_name());

        let tasks = core::mem::take(&mut *self.tasks.lock());
        let mut outcome = ShutdownOutcome::Completed;
        for task in tasks.iter().rev() {
            if task.stop() == ShutdownOutcome::TimedOut {
                outcome = ShutdownOutcome::TimedOut;
            }
        }

        self.lifecycle.complete_shutdown();
        debug!("{}: shutdown complete ({:?})", self.port_name(), outcome);
        outcome
    }

    // ---------------------------------------------------------------------
    // Diagnostics

    /// Writes a human-readable dump of the port.
    ///
    /// `details` 0 prints the summary line, 1 adds per-address state, 2 adds
    /// every parameter, 3 adds the listeners. Write errors are ignored.
    pub fn report(&self, out: &mut dyn Write, details: u32) {
        let _ = writeln!(
            out,
            "Port {}: max_addr={} state={:?} flags={:?}",
            self.config.port_name,
            self.config.max_addr,
            self.state(),
            self.config.flags
        );
        let _ = writeln!(
            out,
            "  callbacks: sweeps={} events={} delivered={} failed={}",
            self.stats.sweeps(),
            self.stats.events(),
            self.stats.deliveries(),
            self.stats.failures()
        );
        if details == 0 {
            return;
        }

        let written = self.with_state(|s| {
            for table in &s.lists {
                let list = table.list();
                let connected = s.connected.get(list).copied().unwrap_or(false);
                let _ = writeln!(
                    out,
                    "  addr {}: {} parameters, {}",
                    list,
                    table.len(),
                    if connected { "connected" } else { "disconnected" }
                );
                if details < 2 {
                    continue;
                }
                for entry in table.entries() {
                    let value = match entry.value() {
                        Some(v) => v.to_string(),
                        None => "undefined".into(),
                    };
                    let (alarm_status, alarm_severity) = entry.alarm();
                    let _ = writeln!(
                        out,
                        "    [{}] {} {}: {} status={} alarm={}/{}",
                        entry.index(),
                        entry.name(),
                        entry.param_type(),
                        value,
                        entry.status(),
                        alarm_status,
                        alarm_severity
                    );
                }
            }
            if details >= 3 {
                let _ = writeln!(out, "  listeners: {}", s.interrupts.len());
                for record in s.interrupts.iter() {
                    let _ = writeln!(
                        out,
                        "    {:?} {} addr {} reason {:?}",
                        record.id, record.spec.data_type, record.spec.addr, record.spec.reason
                    );
                }
            }
            Ok(())
        });
        if let Err(err) = written {
            let _ = writeln!(out, "  report incomplete: {err}");
        }
    }
}

impl Drop for DriverCore {
    fn drop(&mut self) {
        if self.config.is_destructible() && self.lifecycle.is_live() {
            warn!(
                "{}: dropped without shutdown; background tasks are detached",
                self.config.port_name
            );
        }
    }
}

impl core::fmt::Debug for DriverCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DriverCore")
            .field("port_name", &self.config.port_name)
            .field("max_addr", &self.config.max_addr)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// Body of the notification thread: an initial sweep whenever woken, exit on
/// stop. Holds the core weakly so it never keeps a port alive.
fn notification_task(port: Weak<DriverCore>, token: StopToken) {
    loop {
        match token.wait(None) {
            Wake::Stop => break,
            Wake::Woken => {
                let Some(port) = port.upgrade() else {
                    break;
                };
                let summary = port.sweep_all();
                debug!(
                    "{}: initial callbacks delivered={} failed={}",
                    port.port_name(),
                    summary.delivered,
                    summary.failed
                );
            }
            Wake::TimedOut => {}
        }
    }
}

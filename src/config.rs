//! Port construction parameters: interface masks, behaviour flags and the
//! builder-style [`DriverConfig`].

use std::time::Duration;

use bitflags::bitflags;

bitflags! {
    /// Interfaces a port implements, or raises interrupts for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InterfaceMask: u32 {
        const COMMON          = 0x0000_0001;
        const DRV_USER        = 0x0000_0002;
        const OPTION          = 0x0000_0004;
        const INT32           = 0x0000_0008;
        const UINT32_DIGITAL  = 0x0000_0010;
        const FLOAT64         = 0x0000_0020;
        const OCTET           = 0x0000_0040;
        const INT8_ARRAY      = 0x0000_0080;
        const INT16_ARRAY     = 0x0000_0100;
        const INT32_ARRAY     = 0x0000_0200;
        const FLOAT32_ARRAY   = 0x0000_0400;
        const FLOAT64_ARRAY   = 0x0000_0800;
        const GENERIC_POINTER = 0x0000_1000;
        const ENUM            = 0x0000_2000;
        const INT64           = 0x0000_4000;
        const INT64_ARRAY     = 0x0000_8000;
    }
}

bitflags! {
    /// Port behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PortFlags: u32 {
        /// The port serves more than one address.
        const MULTI_DEVICE = 0x0001;
        /// Calls may block on device I/O.
        const CAN_BLOCK    = 0x0002;
        /// The port takes part in the shutdown protocol and is destroyed by
        /// its registry at process exit.
        const DESTRUCTIBLE = 0x0004;
    }
}

/// Options for the port's background notification thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadOptions {
    /// Thread name; defaults to `<port>-callbacks`.
    pub name: Option<String>,
    /// Stack size in bytes; `None` keeps the platform default.
    pub stack_size: Option<usize>,
}

/// Default bound on the shutdown handshake.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Construction parameters of a port.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Unique port name, the registry key.
    pub port_name: String,
    /// Number of addresses (parameter lists); at least 1.
    pub max_addr: usize,
    /// Interfaces the port serves.
    pub interfaces: InterfaceMask,
    /// Interfaces the port raises interrupts for.
    pub interrupts: InterfaceMask,
    pub flags: PortFlags,
    /// Mark every address connected at construction.
    pub auto_connect: bool,
    pub callback_thread: ThreadOptions,
    /// Bound on the wait for the background thread during shutdown.
    pub shutdown_timeout: Duration,
    /// Dispatch each changed parameter as soon as it is set instead of
    /// waiting for an explicit callback sweep.
    pub immediate_callbacks: bool,
}

impl DriverConfig {
    /// A single-address port serving every interface.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            max_addr: 1,
            interfaces: InterfaceMask::all(),
            interrupts: InterfaceMask::all(),
            flags: PortFlags::empty(),
            auto_connect: true,
            callback_thread: ThreadOptions {
                name: None,
                stack_size: None,
            },
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            immediate_callbacks: false,
        }
    }

    /// Sets the address count. Values above 1 also set
    /// [`PortFlags::MULTI_DEVICE`].
    pub fn with_max_addr(mut self, max_addr: usize) -> Self {
        self.max_addr = max_addr.max(1);
        if self.max_addr > 1 {
            self.flags |= PortFlags::MULTI_DEVICE;
        }
        self
    }

    pub fn with_interfaces(mut self, interfaces: InterfaceMask) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn with_interrupts(mut self, interrupts: InterfaceMask) -> Self {
        self.interrupts = interrupts;
        self
    }

    pub fn with_flags(mut self, flags: PortFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.callback_thread.name = Some(name.into());
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.callback_thread.stack_size = Some(stack_size);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_immediate_callbacks(mut self, immediate: bool) -> Self {
        self.immediate_callbacks = immediate;
        self
    }

    #[inline]
    pub fn is_destructible(&self) -> bool {
        self.flags.contains(PortFlags::DESTRUCTIBLE)
    }

    /// Name of the background notification thread.
    pub fn thread_name(&self) -> String {
        self.callback_thread
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-callbacks", self.port_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DriverConfig::new("PS1");
        assert_eq!(config.max_addr, 1);
        assert!(config.interfaces.contains(InterfaceMask::FLOAT64));
        assert!(!config.is_destructible());
        assert_eq!(config.thread_name(), "PS1-callbacks");
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn test_config_builders() {
        let config = DriverConfig::new("MCA")
            .with_max_addr(8)
            .with_flags(PortFlags::DESTRUCTIBLE | PortFlags::CAN_BLOCK)
            .with_interfaces(InterfaceMask::INT32 | InterfaceMask::INT32_ARRAY)
            .with_thread_name("mca-cb")
            .with_max_addr(0);
        assert_eq!(config.max_addr, 1);
        assert!(config.flags.contains(PortFlags::MULTI_DEVICE));
        assert!(config.is_destructible());
        assert!(!config.interfaces.contains(InterfaceMask::FLOAT64));
        assert_eq!(config.thread_name(), "mca-cb");
    }
}

//! The driver-facing trait.

use std::io::Write;

use crate::error::{DriverError, DriverResult, ParamStatus};
use crate::param::{ParamType, ParamValue};
use crate::port::DriverCore;
use crate::shutdown::ShutdownOutcome;

/// Resolved parameter reference carried by every I/O request.
///
/// Produced once by [`PortDriver::drv_user_create`] when a client binds to a
/// parameter by name, then reused for each read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamHandle {
    /// Parameter index.
    pub reason: usize,
    /// Device address, which is also the parameter list.
    pub addr: usize,
    pub data_type: ParamType,
}

/// A port driver.
///
/// Implementors provide [`core`](Self::core) and override the operations
/// that talk to hardware. The defaults serve everything from the parameter
/// cache, so a driver whose values are pushed by a polling task only needs
/// to override the writes it acts on.
///
/// ```rust,ignore
/// struct PowerSupply {
///     core: Arc<DriverCore>,
///     voltage: usize,
/// }
///
/// impl PortDriver for PowerSupply {
///     fn core(&self) -> &DriverCore {
///         &self.core
///     }
///
///     fn write(&self, handle: &ParamHandle, value: ParamValue) -> DriverResult {
///         if handle.reason == self.voltage {
///             // program the device first
///         }
///         self.core.set_value(handle.addr, handle.reason, value)?;
///         self.core.call_callbacks(handle.addr).map(|_| ())
///     }
/// }
/// ```
pub trait PortDriver: Send + Sync + 'static {
    fn core(&self) -> &DriverCore;

    fn port_name(&self) -> &str {
        self.core().port_name()
    }

    /// Binds a parameter name at `addr` to a handle.
    fn drv_user_create(&self, addr: usize, name: &str) -> DriverResult<ParamHandle> {
        let core = self.core();
        let reason = core.find_param(addr, name)?;
        let data_type = core.param_type(addr, reason)?;
        core.check_interface(data_type)?;
        Ok(ParamHandle {
            reason,
            addr,
            data_type,
        })
    }

    /// Reads the cached value.
    fn read(&self, handle: &ParamHandle) -> DriverResult<(ParamValue, ParamStatus)> {
        let core = self.core();
        core.check_interface(handle.data_type)?;
        if !core.is_connected(handle.addr) {
            return Err(DriverError::Disconnected { addr: handle.addr });
        }
        core.get_value(handle.addr, handle.reason)
    }

    /// Stores the value and notifies listeners of the address.
    fn write(&self, handle: &ParamHandle, value: ParamValue) -> DriverResult {
        let core = self.core();
        core.check_interface(handle.data_type)?;
        if !core.is_connected(handle.addr) {
            return Err(DriverError::Disconnected { addr: handle.addr });
        }
        core.set_value(handle.addr, handle.reason, value)?;
        core.call_callbacks(handle.addr)?;
        Ok(())
    }

    /// Writes the masked bits of a digital parameter and notifies listeners.
    fn write_digital(&self, handle: &ParamHandle, value: u32, mask: u32) -> DriverResult {
        let core = self.core();
        core.check_interface(ParamType::UInt32Digital)?;
        if !core.is_connected(handle.addr) {
            return Err(DriverError::Disconnected { addr: handle.addr });
        }
        core.set_uint_digital(handle.addr, handle.reason, value, mask, 0)?;
        core.call_callbacks(handle.addr)?;
        Ok(())
    }

    /// Reads the masked bits of a digital parameter.
    fn read_digital(&self, handle: &ParamHandle, mask: u32) -> DriverResult<(u32, ParamStatus)> {
        let core = self.core();
        core.check_interface(ParamType::UInt32Digital)?;
        core.get_uint_digital(handle.addr, handle.reason, mask)
    }

    /// Range of an integer parameter for clients converting raw values.
    /// `(0, 0)` means no range.
    fn get_bounds(&self, _handle: &ParamHandle) -> DriverResult<(i32, i32)> {
        Ok((0, 0))
    }

    /// [`get_bounds`](Self::get_bounds) for 64-bit parameters.
    fn get_bounds64(&self, _handle: &ParamHandle) -> DriverResult<(i64, i64)> {
        Ok((0, 0))
    }

    /// Type of the parameter behind a handle, as currently declared.
    fn drv_user_get_type(&self, handle: &ParamHandle) -> DriverResult<ParamType> {
        self.core().param_type(handle.addr, handle.reason)
    }

    /// Reads a driver-specific option such as a baud rate.
    fn read_option(&self, _addr: usize, _key: &str) -> DriverResult<String> {
        Err(DriverError::Unsupported { interface: "Option" })
    }

    fn write_option(&self, _addr: usize, _key: &str, _value: &str) -> DriverResult {
        Err(DriverError::Unsupported { interface: "Option" })
    }

    fn connect(&self, addr: usize) -> DriverResult {
        self.core().connect(addr)
    }

    fn disconnect(&self, addr: usize) -> DriverResult {
        self.core().disconnect(addr)
    }

    fn report(&self, out: &mut dyn Write, details: u32) {
        self.core().report(out, details);
    }

    /// Stops background activity. Drivers with threads of their own stop
    /// them before delegating here.
    fn shutdown(&self) -> ShutdownOutcome {
        self.core().shutdown()
    }
}

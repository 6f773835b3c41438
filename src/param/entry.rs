//! A single cached parameter.

use crate::error::ParamStatus;

use super::types::{DigitalReason, ParamType, ParamValue};

/// One named, typed value with status and alarm metadata.
///
/// Entries are created by [`ParamTable::create`](super::ParamTable::create)
/// and live as long as the table. The type never changes after creation.
#[derive(Debug, Clone)]
pub struct ParamEntry {
    index: usize,
    name: String,
    ty: ParamType,
    value: Option<ParamValue>,
    status: ParamStatus,
    alarm_status: i32,
    alarm_severity: i32,
    /// Bits raising an interrupt on a 0 -> 1 transition.
    rising_mask: u32,
    /// Bits raising an interrupt on a 1 -> 0 transition.
    falling_mask: u32,
    /// Digital bits accumulated for the next callback sweep.
    pending_bits: u32,
    pub(super) dirty: bool,
}

/// Copy of an entry taken under the port lock for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSnapshot {
    pub reason: usize,
    pub value: ParamValue,
    pub status: ParamStatus,
    pub alarm_status: i32,
    pub alarm_severity: i32,
    /// Digital bits that triggered this update; zero for other types.
    pub digital_bits: u32,
}

impl ParamEntry {
    pub(super) fn new(index: usize, name: &str, ty: ParamType) -> Self {
        Self {
            index,
            name: name.into(),
            ty,
            value: None,
            status: ParamStatus::Success,
            alarm_status: 0,
            alarm_severity: 0,
            rising_mask: 0,
            falling_mask: 0,
            pending_bits: 0,
            dirty: false,
        }
    }

    /// Copies the declaration (name, type) without the value or metadata.
    pub(super) fn declaration(&self) -> Self {
        Self::new(self.index, &self.name, self.ty)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn param_type(&self) -> ParamType {
        self.ty
    }

    #[inline]
    pub fn value(&self) -> Option<&ParamValue> {
        self.value.as_ref()
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }

    #[inline]
    pub fn status(&self) -> ParamStatus {
        self.status
    }

    #[inline]
    pub fn alarm(&self) -> (i32, i32) {
        (self.alarm_status, self.alarm_severity)
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Stores a value of the entry's type. Returns whether it changed.
    ///
    /// The caller has already checked the type. Status is left alone; see
    /// [`reset_status`](Self::reset_status).
    pub(super) fn store(&mut self, value: ParamValue) -> bool {
        debug_assert_eq!(value.param_type(), self.ty);
        if self.value.as_ref() == Some(&value) {
            return false;
        }
        self.value = Some(value);
        true
    }

    /// Writes the bits of `value` selected by `value_mask`.
    ///
    /// Bits forced through `interrupt_mask` and bits whose transition matches
    /// the rising/falling masks are accumulated for the next sweep. Returns
    /// whether the stored word changed.
    pub(super) fn store_digital(&mut self, value: u32, value_mask: u32, interrupt_mask: u32) -> bool {
        let defined = self.value.is_some();
        let old = match self.value {
            Some(ParamValue::UInt32Digital(v)) => v,
            _ => 0,
        };
        let new = (old & !value_mask) | (value & value_mask);

        let rising = !old & new & self.rising_mask;
        let falling = old & !new & self.falling_mask;
        self.pending_bits |= interrupt_mask | rising | falling;

        self.value = Some(ParamValue::UInt32Digital(new));
        !defined || new != old || interrupt_mask != 0
    }

    /// Puts the status back to success after a write. Returns `true` if it
    /// was anything else, which listeners must hear about even when the
    /// value itself is unchanged.
    pub(super) fn reset_status(&mut self) -> bool {
        self.set_status(ParamStatus::Success)
    }

    pub(super) fn set_status(&mut self, status: ParamStatus) -> bool {
        let changed = self.status != status;
        self.status = status;
        if changed {
            self.touch_digital();
        }
        changed
    }

    pub(super) fn set_alarm(&mut self, alarm_status: i32, alarm_severity: i32) -> bool {
        let changed = (self.alarm_status, self.alarm_severity) != (alarm_status, alarm_severity);
        self.alarm_status = alarm_status;
        self.alarm_severity = alarm_severity;
        if changed {
            self.touch_digital();
        }
        changed
    }

    /// A metadata change on a digital entry is delivered to every digital
    /// listener, whatever its bit mask.
    fn touch_digital(&mut self) {
        if self.ty == ParamType::UInt32Digital {
            self.pending_bits = u32::MAX;
        }
    }

    pub(super) fn set_digital_interrupt(&mut self, mask: u32, reason: DigitalReason) {
        match reason {
            DigitalReason::ZeroToOne => self.rising_mask |= mask,
            DigitalReason::OneToZero => self.falling_mask |= mask,
            DigitalReason::Both => {
                self.rising_mask |= mask;
                self.falling_mask |= mask;
            }
        }
    }

    pub(super) fn clear_digital_interrupt(&mut self, mask: u32) {
        self.rising_mask &= !mask;
        self.falling_mask &= !mask;
    }

    pub(super) fn digital_interrupt(&self, reason: DigitalReason) -> u32 {
        match reason {
            DigitalReason::ZeroToOne => self.rising_mask,
            DigitalReason::OneToZero => self.falling_mask,
            DigitalReason::Both => self.rising_mask | self.falling_mask,
        }
    }

    /// Takes a dispatch snapshot and resets the pending digital bits.
    ///
    /// Undefined entries and digital entries with nothing to report yield
    /// `None`.
    pub(super) fn snapshot(&mut self) -> Option<ParamSnapshot> {
        let value = self.value.clone()?;
        let digital_bits = core::mem::take(&mut self.pending_bits);
        if self.ty == ParamType::UInt32Digital && digital_bits == 0 {
            return None;
        }
        Some(ParamSnapshot {
            reason: self.index,
            value,
            status: self.status,
            alarm_status: self.alarm_status,
            alarm_severity: self.alarm_severity,
            digital_bits,
        })
    }

    /// Snapshot of a defined entry for an initial sweep; digital entries
    /// report every bit.
    pub(super) fn full_snapshot(&mut self) -> Option<ParamSnapshot> {
        let value = self.value.clone()?;
        let digital_bits = if self.ty == ParamType::UInt32Digital {
            self.pending_bits = 0;
            u32::MAX
        } else {
            0
        };
        Some(ParamSnapshot {
            reason: self.index,
            value,
            status: self.status,
            alarm_status: self.alarm_status,
            alarm_severity: self.alarm_severity,
            digital_bits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_reports_change() {
        let mut entry = ParamEntry::new(0, "Gain", ParamType::Int32);
        assert!(!entry.is_defined());
        assert!(entry.store(ParamValue::Int32(3)));
        assert!(!entry.store(ParamValue::Int32(3)));
        assert!(entry.store(ParamValue::Int32(4)));
    }

    #[test]
    fn test_reset_status_reports_recovery() {
        let mut entry = ParamEntry::new(0, "Gain", ParamType::Int32);
        entry.store(ParamValue::Int32(1));
        assert!(!entry.reset_status());

        entry.set_status(ParamStatus::Timeout);
        assert!(!entry.store(ParamValue::Int32(1)));
        assert_eq!(entry.status(), ParamStatus::Timeout);
        assert!(entry.reset_status());
        assert_eq!(entry.status(), ParamStatus::Success);
    }

    #[test]
    fn test_digital_value_mask() {
        let mut entry = ParamEntry::new(0, "Bits", ParamType::UInt32Digital);
        entry.store_digital(0xFF, 0x0F, 0);
        assert_eq!(entry.value(), Some(&ParamValue::UInt32Digital(0x0F)));
        entry.store_digital(0x00, 0x03, 0);
        assert_eq!(entry.value(), Some(&ParamValue::UInt32Digital(0x0C)));
    }

    #[test]
    fn test_digital_edges() {
        let mut entry = ParamEntry::new(0, "Bits", ParamType::UInt32Digital);
        entry.set_digital_interrupt(0x1, DigitalReason::ZeroToOne);
        entry.set_digital_interrupt(0x2, DigitalReason::OneToZero);
        assert_eq!(entry.digital_interrupt(DigitalReason::Both), 0x3);

        entry.store_digital(0x3, u32::MAX, 0);
        // Bit 0 rose; bit 1 rose but only falling edges are watched.
        assert_eq!(entry.snapshot().unwrap().digital_bits, 0x1);

        entry.store_digital(0x0, u32::MAX, 0);
        assert_eq!(entry.snapshot().unwrap().digital_bits, 0x2);

        entry.clear_digital_interrupt(0x3);
        entry.store_digital(0x3, u32::MAX, 0);
        assert!(entry.snapshot().is_none());
    }

    #[test]
    fn test_snapshot_skips_undefined() {
        let mut entry = ParamEntry::new(2, "Name", ParamType::Octet);
        assert!(entry.snapshot().is_none());
        entry.store(ParamValue::Octet("abc".into()));
        entry.set_alarm(1, 2);
        let snap = entry.snapshot().unwrap();
        assert_eq!(snap.reason, 2);
        assert_eq!((snap.alarm_status, snap.alarm_severity), (1, 2));
    }
}

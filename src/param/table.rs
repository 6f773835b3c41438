//! Name-indexed parameter table with dirty tracking.

use std::collections::HashMap;

use crate::error::{DriverError, DriverResult, ParamStatus};

use super::entry::{ParamEntry, ParamSnapshot};
use super::types::{DigitalReason, ParamKind, ParamType, ParamValue};

/// Ordered collection of parameters for one address.
///
/// Entries are appended and never removed, so an index stays valid for the
/// table's lifetime. Changed entries are queued on a de-duplicated dirty list
/// in the order they first changed; [`drain_dirty`](Self::drain_dirty) turns
/// that list into dispatch snapshots.
///
/// The table is not synchronized: the owning port serializes access through
/// its lock.
#[derive(Debug, Default)]
pub struct ParamTable {
    list: usize,
    entries: Vec<ParamEntry>,
    by_name: HashMap<String, usize>,
    dirty: Vec<usize>,
}

impl ParamTable {
    /// Creates an empty table for address `list`.
    pub fn new(list: usize) -> Self {
        Self {
            list,
            ..Self::default()
        }
    }

    /// Creates a table for `list` carrying the declarations of `other`.
    ///
    /// Values, status and alarms are not copied; every entry starts undefined.
    pub fn with_declarations_of(list: usize, other: &ParamTable) -> Self {
        Self {
            list,
            entries: other.entries.iter().map(ParamEntry::declaration).collect(),
            by_name: other.by_name.clone(),
            dirty: Vec::new(),
        }
    }

    #[inline]
    pub fn list(&self) -> usize {
        self.list
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ParamEntry> {
        self.entries.iter()
    }

    /// Appends a new parameter and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DuplicateName`] if the name is already taken.
    pub fn create(&mut self, name: &str, ty: ParamType) -> DriverResult<usize> {
        if self.by_name.contains_key(name) {
            return Err(DriverError::DuplicateName { name: name.into() });
        }
        let index = self.entries.len();
        self.entries.push(ParamEntry::new(index, name, ty));
        self.by_name.insert(name.into(), index);
        Ok(index)
    }

    /// Resolves a parameter name to its index.
    pub fn find(&self, name: &str) -> DriverResult<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| DriverError::ParamNotFound { name: name.into() })
    }

    pub fn entry(&self, index: usize) -> DriverResult<&ParamEntry> {
        self.entries.get(index).ok_or(DriverError::IndexOutOfRange {
            list: self.list,
            index,
        })
    }

    fn entry_mut(&mut self, index: usize) -> DriverResult<&mut ParamEntry> {
        self.entries.get_mut(index).ok_or(DriverError::IndexOutOfRange {
            list: self.list,
            index,
        })
    }

    fn typed_entry_mut(&mut self, index: usize, requested: ParamType) -> DriverResult<&mut ParamEntry> {
        let entry = self.entry_mut(index)?;
        if entry.param_type() != requested {
            return Err(DriverError::TypeMismatch {
                index,
                requested,
                actual: entry.param_type(),
            });
        }
        Ok(entry)
    }

    fn mark_dirty(&mut self, index: usize) {
        let entry = &mut self.entries[index];
        if !entry.dirty {
            entry.dirty = true;
            self.dirty.push(index);
        }
    }

    /// Reads the raw value and status of an entry.
    pub fn get_value(&self, index: usize) -> DriverResult<(&ParamValue, ParamStatus)> {
        let entry = self.entry(index)?;
        let value = entry.value().ok_or(DriverError::Undefined {
            list: self.list,
            index,
        })?;
        Ok((value, entry.status()))
    }

    /// Reads a typed value and the entry's status.
    pub fn get<T: ParamKind>(&self, index: usize) -> DriverResult<(T, ParamStatus)> {
        let actual = self.entry(index)?.param_type();
        if actual != T::TYPE {
            return Err(DriverError::TypeMismatch {
                index,
                requested: T::TYPE,
                actual,
            });
        }
        let (value, status) = self.get_value(index)?;
        let value = T::from_value(value)
            .ok_or_else(|| DriverError::Internal(format!("entry {index} holds a foreign value")))?;
        Ok((value, status))
    }

    /// Stores a tagged value. Returns whether the value changed.
    ///
    /// A changed entry is queued on the dirty list. The entry status is reset
    /// to success whether or not the value changed; an entry recovering from
    /// a failure status is queued too, so listeners see the recovery.
    pub fn set_value(&mut self, index: usize, value: ParamValue) -> DriverResult<bool> {
        let entry = self.typed_entry_mut(index, value.param_type())?;
        let recovered = entry.reset_status();
        let changed = match value {
            ParamValue::UInt32Digital(bits) => entry.store_digital(bits, u32::MAX, 0),
            value => entry.store(value),
        };
        if changed || recovered {
            self.mark_dirty(index);
        }
        Ok(changed)
    }

    /// Stores a typed value. Returns whether the value changed.
    pub fn set<T: ParamKind>(&mut self, index: usize, value: T) -> DriverResult<bool> {
        self.set_value(index, value.into_value())
    }

    /// Writes the bits of `value` selected by `value_mask` into a digital
    /// entry; bits in `interrupt_mask` are reported on the next sweep even
    /// if they did not change.
    pub fn set_uint_digital(
        &mut self,
        index: usize,
        value: u32,
        value_mask: u32,
        interrupt_mask: u32,
    ) -> DriverResult<bool> {
        let entry = self.typed_entry_mut(index, ParamType::UInt32Digital)?;
        let recovered = entry.reset_status();
        let changed = entry.store_digital(value, value_mask, interrupt_mask);
        if changed || recovered {
            self.mark_dirty(index);
        }
        Ok(changed)
    }

    /// Reads the bits of a digital entry selected by `mask`.
    pub fn get_uint_digital(&self, index: usize, mask: u32) -> DriverResult<(u32, ParamStatus)> {
        let (value, status) = self.get::<u32>(index)?;
        Ok((value & mask, status))
    }

    pub fn set_digital_interrupt(&mut self, index: usize, mask: u32, reason: DigitalReason) -> DriverResult {
        self.typed_entry_mut(index, ParamType::UInt32Digital)?
            .set_digital_interrupt(mask, reason);
        Ok(())
    }

    pub fn clear_digital_interrupt(&mut self, index: usize, mask: u32) -> DriverResult {
        self.typed_entry_mut(index, ParamType::UInt32Digital)?
            .clear_digital_interrupt(mask);
        Ok(())
    }

    pub fn digital_interrupt(&self, index: usize, reason: DigitalReason) -> DriverResult<u32> {
        let entry = self.entry(index)?;
        if entry.param_type() != ParamType::UInt32Digital {
            return Err(DriverError::TypeMismatch {
                index,
                requested: ParamType::UInt32Digital,
                actual: entry.param_type(),
            });
        }
        Ok(entry.digital_interrupt(reason))
    }

    pub fn set_status(&mut self, index: usize, status: ParamStatus) -> DriverResult {
        if self.entry_mut(index)?.set_status(status) {
            self.mark_dirty(index);
        }
        Ok(())
    }

    pub fn status(&self, index: usize) -> DriverResult<ParamStatus> {
        Ok(self.entry(index)?.status())
    }

    pub fn set_alarm(&mut self, index: usize, alarm_status: i32, alarm_severity: i32) -> DriverResult {
        if self.entry_mut(index)?.set_alarm(alarm_status, alarm_severity) {
            self.mark_dirty(index);
        }
        Ok(())
    }

    /// Returns `(alarm_status, alarm_severity)`.
    pub fn alarm(&self, index: usize) -> DriverResult<(i32, i32)> {
        Ok(self.entry(index)?.alarm())
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Empties the dirty list and snapshots every entry on it, in the order
    /// the entries first changed.
    pub fn drain_dirty(&mut self) -> Vec<ParamSnapshot> {
        let dirty = core::mem::take(&mut self.dirty);
        let mut snapshots = Vec::with_capacity(dirty.len());
        for index in dirty {
            let entry = &mut self.entries[index];
            entry.dirty = false;
            if let Some(snapshot) = entry.snapshot() {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    /// Snapshots one entry and removes it from the dirty list.
    pub fn take_dirty(&mut self, index: usize) -> DriverResult<Option<ParamSnapshot>> {
        let entry = self.entry_mut(index)?;
        if !entry.dirty {
            return Ok(None);
        }
        entry.dirty = false;
        let snapshot = entry.snapshot();
        self.dirty.retain(|&i| i != index);
        Ok(snapshot)
    }

    /// Snapshots every defined entry regardless of the dirty list and clears
    /// it. Digital entries report all bits.
    pub fn snapshot_all(&mut self) -> Vec<ParamSnapshot> {
        self.dirty.clear();
        self.entries
            .iter_mut()
            .filter_map(|entry| {
                entry.dirty = false;
                entry.full_snapshot()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (ParamTable, usize, usize) {
        let mut table = ParamTable::new(0);
        let temp = table.create("Temperature", ParamType::Float64).unwrap();
        let gain = table.create("Gain", ParamType::Int32).unwrap();
        (table, temp, gain)
    }

    #[test]
    fn test_create_and_find() {
        let (table, temp, gain) = table();
        assert_eq!(temp, 0);
        assert_eq!(gain, 1);
        assert_eq!(table.find("Gain").unwrap(), gain);
        assert_eq!(
            table.find("Missing"),
            Err(DriverError::ParamNotFound { name: "Missing".into() })
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (mut table, _, _) = table();
        assert_eq!(
            table.create("Gain", ParamType::Float64),
            Err(DriverError::DuplicateName { name: "Gain".into() })
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_type_mismatch_leaves_value() {
        let (mut table, temp, _) = table();
        table.set(temp, 1.5f64).unwrap();
        assert!(matches!(
            table.set(temp, 3i32),
            Err(DriverError::TypeMismatch { .. })
        ));
        assert_eq!(table.get::<f64>(temp).unwrap().0, 1.5);
        assert!(matches!(
            table.get::<i32>(temp),
            Err(DriverError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_get_errors() {
        let (table, temp, _) = table();
        assert_eq!(
            table.get::<f64>(temp),
            Err(DriverError::Undefined { list: 0, index: temp })
        );
        assert_eq!(
            table.get::<f64>(9),
            Err(DriverError::IndexOutOfRange { list: 0, index: 9 })
        );
    }

    #[test]
    fn test_change_detection_and_dirty_order() {
        let (mut table, temp, gain) = table();
        assert!(table.set(gain, 1i32).unwrap());
        assert!(table.set(temp, 23.5f64).unwrap());
        assert!(!table.set(temp, 23.5f64).unwrap());
        assert!(table.set(gain, 2i32).unwrap());
        assert_eq!(table.dirty_count(), 2);

        let snaps = table.drain_dirty();
        let reasons: Vec<usize> = snaps.iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec![gain, temp]);
        assert_eq!(snaps[0].value, ParamValue::Int32(2));
        assert_eq!(table.dirty_count(), 0);
        assert!(table.drain_dirty().is_empty());
    }

    #[test]
    fn test_status_and_alarm_mark_dirty() {
        let (mut table, temp, _) = table();
        table.set(temp, 1.0f64).unwrap();
        table.drain_dirty();

        table.set_status(temp, ParamStatus::Timeout).unwrap();
        table.set_alarm(temp, 3, 2).unwrap();
        assert_eq!(table.dirty_count(), 1);
        assert_eq!(table.get::<f64>(temp).unwrap().1, ParamStatus::Timeout);
        assert_eq!(table.alarm(temp).unwrap(), (3, 2));

        let snaps = table.drain_dirty();
        assert_eq!(snaps[0].status, ParamStatus::Timeout);
        assert_eq!(snaps[0].alarm_severity, 2);
    }

    #[test]
    fn test_recovery_with_same_value_is_dispatched() {
        let (mut table, temp, _) = table();
        table.set(temp, 20.0f64).unwrap();
        table.set_status(temp, ParamStatus::Timeout).unwrap();
        assert_eq!(table.drain_dirty()[0].status, ParamStatus::Timeout);

        // Same reading after the device came back.
        assert!(!table.set(temp, 20.0f64).unwrap());
        assert_eq!(table.status(temp).unwrap(), ParamStatus::Success);
        let snaps = table.drain_dirty();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].status, ParamStatus::Success);
        assert_eq!(snaps[0].value, ParamValue::Float64(20.0));

        // A healthy repeat stays quiet.
        assert!(!table.set(temp, 20.0f64).unwrap());
        assert_eq!(table.dirty_count(), 0);
    }

    #[test]
    fn test_declarations_copied_without_values() {
        let (mut table, temp, _) = table();
        table.set(temp, 4.0f64).unwrap();
        let other = ParamTable::with_declarations_of(3, &table);
        assert_eq!(other.list(), 3);
        assert_eq!(other.find("Temperature").unwrap(), temp);
        assert_eq!(
            other.get::<f64>(temp),
            Err(DriverError::Undefined { list: 3, index: temp })
        );
    }

    #[test]
    fn test_uint_digital_mask() {
        let mut table = ParamTable::new(0);
        let bits = table.create("Bits", ParamType::UInt32Digital).unwrap();
        table.set_uint_digital(bits, 0xF0, 0xFF, 0).unwrap();
        assert_eq!(table.get_uint_digital(bits, 0x30).unwrap().0, 0x30);
        assert!(!table.set_uint_digital(bits, 0x00, 0x0F, 0).unwrap());

        table.set_digital_interrupt(bits, 0x01, DigitalReason::Both).unwrap();
        assert_eq!(table.digital_interrupt(bits, DigitalReason::ZeroToOne).unwrap(), 0x01);
        table.clear_digital_interrupt(bits, 0x01).unwrap();
        assert_eq!(table.digital_interrupt(bits, DigitalReason::Both).unwrap(), 0);
        assert!(matches!(
            table.set_digital_interrupt(99, 1, DigitalReason::Both),
            Err(DriverError::IndexOutOfRange { .. })
        ));
    }
}

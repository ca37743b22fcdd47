//! Value Ledger
//!
//! Each node keeps a two-slot history of its computed value: the current
//! entry (age 0) and the previous one (age 1). Entries may be null.
//!
//! Two write paths exist:
//!
//! - [`ValueLedger::set`] pushes a new current value. The old current value
//!   shifts to the previous slot and the oldest entry is dropped.
//! - [`ValueLedger::nullify`] blanks the current slot in place, leaving the
//!   previous slot untouched. Cancellation uses this path.
//!
//! Setting null over an already-null current entry is a no-op, so the last
//! known-good value is never pushed out by repeated nulls.

use parking_lot::Mutex;
use serde_json::Value;
use smallvec::SmallVec;

/// Number of entries a ledger retains.
pub const LEDGER_CAPACITY: usize = 2;

type Entries = SmallVec<[Option<Value>; LEDGER_CAPACITY + 1]>;

/// Fixed-capacity history of a node's value, guarded by a single lock.
#[derive(Debug)]
pub struct ValueLedger {
    entries: Mutex<Entries>,
}

impl ValueLedger {
    /// Create a ledger holding `LEDGER_CAPACITY` null entries.
    pub fn new() -> Self {
        let mut entries = Entries::new();
        entries.resize(LEDGER_CAPACITY, None);
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Push a new current value.
    ///
    /// Returns `false` when the write was skipped (null over null).
    pub fn set(&self, value: Option<Value>) -> bool {
        let mut entries = self.entries.lock();

        if value.is_none() && entries.first().map_or(true, Option::is_none) {
            return false;
        }

        entries.insert(0, value);
        entries.truncate(LEDGER_CAPACITY);
        true
    }

    /// Null the current entry without shifting it into the previous slot.
    ///
    /// Returns `true` if a non-null value was cleared.
    pub fn nullify(&self) -> bool {
        let mut entries = self.entries.lock();
        match entries.first_mut() {
            Some(current) if current.is_some() => {
                *current = None;
                true
            }
            _ => false,
        }
    }

    /// The entry `age` slots back (0 = current, 1 = previous).
    ///
    /// Returns `None` for null entries and for ages beyond the capacity.
    pub fn get(&self, age: usize) -> Option<Value> {
        self.entries.lock().get(age).cloned().flatten()
    }

    /// Current value.
    pub fn current(&self) -> Option<Value> {
        self.get(0)
    }

    /// Previous value.
    pub fn previous(&self) -> Option<Value> {
        self.get(1)
    }

    /// `true` iff the current value is non-null and differs from the previous.
    pub fn changed(&self) -> bool {
        let entries = self.entries.lock();
        match entries.first() {
            Some(Some(current)) => entries.get(1).map_or(true, |prev| prev.as_ref() != Some(current)),
            _ => false,
        }
    }

    /// Reset to `LEDGER_CAPACITY` null entries.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        entries.resize(LEDGER_CAPACITY, None);
    }
}

impl Default for ValueLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_ledger_is_empty() {
        let ledger = ValueLedger::new();
        assert_eq!(ledger.get(0), None);
        assert_eq!(ledger.get(1), None);
        assert!(!ledger.changed());
    }

    #[test]
    fn set_shifts_current_into_previous() {
        let ledger = ValueLedger::new();
        ledger.set(Some(json!(1)));
        ledger.set(Some(json!(2)));
        ledger.set(Some(json!(3)));

        assert_eq!(ledger.current(), Some(json!(3)));
        assert_eq!(ledger.previous(), Some(json!(2)));
        assert_eq!(ledger.get(2), None);
    }

    #[test]
    fn set_null_keeps_last_value_as_previous() {
        let ledger = ValueLedger::new();
        ledger.set(Some(json!("v")));
        assert_eq!(ledger.get(0), Some(json!("v")));

        assert!(ledger.set(None));
        assert_eq!(ledger.get(0), None);
        assert_eq!(ledger.get(1), Some(json!("v")));

        // a second null must not push the known-good value out
        assert!(!ledger.set(None));
        assert_eq!(ledger.get(1), Some(json!("v")));
    }

    #[test]
    fn nullify_does_not_shift() {
        let ledger = ValueLedger::new();
        ledger.set(Some(json!("a")));
        ledger.set(Some(json!("b")));

        assert!(ledger.nullify());
        assert_eq!(ledger.current(), None);
        assert_eq!(ledger.previous(), Some(json!("a")));

        assert!(!ledger.nullify());
        assert_eq!(ledger.previous(), Some(json!("a")));
    }

    #[test]
    fn changed_semantics() {
        let ledger = ValueLedger::new();

        // null current is never a change
        assert!(!ledger.changed());

        ledger.set(Some(json!("a")));
        assert!(ledger.changed());

        ledger.set(Some(json!("a")));
        assert!(!ledger.changed());

        ledger.set(Some(json!("b")));
        assert!(ledger.changed());

        ledger.nullify();
        assert!(!ledger.changed());
    }

    #[test]
    fn clear_resets_history() {
        let ledger = ValueLedger::new();
        ledger.set(Some(json!(1)));
        ledger.set(Some(json!(2)));
        ledger.clear();
        assert_eq!(ledger.current(), None);
        assert_eq!(ledger.previous(), None);
    }
}

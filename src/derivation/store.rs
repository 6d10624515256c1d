//! Property override store - per-field reactive records of derived values.
//!
//! One reactive cell per field key, created lazily on first access. The
//! rendering layer reads a field's record and merges it over the field's
//! static properties; reading from a derived or effect creates a dependency
//! on just that field's cell, so one field's recomputation never re-renders
//! another.
//!
//! Constructed fresh per form instance and threaded explicitly through the
//! applicator and orchestrator - never process-wide state, so one form's
//! overrides can't leak into another's.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use serde_json::Value;
use spark_signals::{Signal, signal};

use crate::types::ValueMap;

pub struct PropertyOverrideStore {
    cells: RefCell<HashMap<String, Signal<ValueMap>>>,
    /// Plain (non-reactive) membership set: "does this field have any
    /// derivations at all" - the fast path consumers check before touching
    /// a cell.
    registered: RefCell<HashSet<String>>,
}

impl PropertyOverrideStore {
    pub fn new() -> Self {
        Self {
            cells: RefCell::new(HashMap::new()),
            registered: RefCell::new(HashSet::new()),
        }
    }

    /// Write one derived property. `None` removes the property entirely -
    /// a record never maps a key to an "absent" marker.
    ///
    /// Writes are suppressed when nothing changes: setting a deeply-equal
    /// value, or removing a property that is already absent, leaves the
    /// cell untouched so dependents don't re-run.
    pub fn set_override(&self, field_key: &str, property: &str, value: Option<Value>) {
        let cell = self.cell(field_key);
        let mut record = cell.get();

        match value {
            Some(new_value) => {
                if record.get(property) == Some(&new_value) {
                    return;
                }
                record.insert(property.to_string(), new_value);
            }
            None => {
                if record.remove(property).is_none() {
                    return;
                }
            }
        }
        cell.set(record);
    }

    /// Read a field's override record. Creates a reactive dependency on the
    /// field's cell when called from a derived or effect.
    pub fn overrides(&self, field_key: &str) -> ValueMap {
        self.cell(field_key).get()
    }

    /// The field's cell itself, for callers that hold onto it.
    pub fn override_signal(&self, field_key: &str) -> Signal<ValueMap> {
        self.cell(field_key)
    }

    /// Mark a field as carrying derivations.
    pub fn register_field(&self, field_key: &str) {
        self.registered.borrow_mut().insert(field_key.to_string());
    }

    /// O(1), non-reactive existence check.
    pub fn has_field(&self, field_key: &str) -> bool {
        self.registered.borrow().contains(field_key)
    }

    pub fn registered_count(&self) -> usize {
        self.registered.borrow().len()
    }

    /// Discard all cells and membership in one step. Used whenever the
    /// active collection is rebuilt wholesale.
    pub fn clear(&self) {
        self.cells.borrow_mut().clear();
        self.registered.borrow_mut().clear();
    }

    fn cell(&self, field_key: &str) -> Signal<ValueMap> {
        let mut cells = self.cells.borrow_mut();
        cells
            .entry(field_key.to_string())
            .or_insert_with(|| signal(ValueMap::new()))
            .clone()
    }
}

impl Default for PropertyOverrideStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Derivation orchestrator - wires collector, applicator, and store into
//! the two reactive pipelines.
//!
//! Collection is a pure read from the active field tree; a reaction watching
//! the collection (and the raw schema field count, to avoid acting on stale
//! data) resets the store whenever the tree changes. Two pipelines consume
//! the collection:
//!
//! - **Immediate**: form-value changes mark the pipeline dirty; a short
//!   sampling window coalesces bursts into one evaluation pass, and a
//!   re-entrancy guard keeps passes from overlapping. Every `OnChange`
//!   entry is applied each pass.
//! - **Debounced**: consecutive value snapshots are pairwise-diffed into a
//!   changed-key set; `Debounced` entries are grouped by their configured
//!   duration (several distinct durations run concurrently), each group
//!   accumulating changed keys until its window elapses, then re-applying
//!   only its own entries against the latest collection.
//!
//! Timer bookkeeping is cooperative: the host calls
//! [`DerivationOrchestrator::tick`] from its loop, the same way the render
//! loop ticks input polling.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::Value;
use spark_signals::{Signal, effect, signal};

use crate::types::{DerivationTrigger, FormSetup, FormValue};

use super::applicator::PropertyDerivationApplicator;
use super::collector::collect_entries;
use super::entry::{PropertyDerivationCollection, PropertyDerivationEntry};
use super::store::PropertyOverrideStore;

/// Sampling window of the immediate pipeline: value changes landing within
/// one window share a single evaluation pass.
pub const SAMPLE_WINDOW_MS: u64 = 16;

// =============================================================================
// Orchestrator
// =============================================================================

pub struct DerivationOrchestrator {
    inner: Rc<OrchestratorInner>,
    stop_fns: RefCell<Vec<Box<dyn FnOnce()>>>,
}

struct OrchestratorInner {
    store: Rc<PropertyOverrideStore>,
    applicator: PropertyDerivationApplicator,
    collection: Signal<Rc<PropertyDerivationCollection>>,
    /// Latest value snapshot kept outside the signal graph: tick-time reads
    /// must not create reactive dependencies.
    latest_value: RefCell<FormValue>,
    immediate: RefCell<ImmediateState>,
    debounced: RefCell<DebouncedState>,
    /// Set when the collection was rebuilt; the next tick re-applies
    /// everything to repopulate the freshly cleared store.
    full_apply_pending: Cell<bool>,
    /// Re-entrancy guard: a new pass never starts while one is running.
    pass_running: Cell<bool>,
    /// Entries already warned about (per instance, so one form's
    /// diagnostics never leak into another's).
    warned_wildcard: RefCell<HashSet<String>>,
}

struct ImmediateState {
    dirty: bool,
    deadline: Option<Instant>,
}

struct DebouncedState {
    previous: FormValue,
    groups: HashMap<u64, DebounceGroup>,
}

#[derive(Default)]
struct DebounceGroup {
    changed: HashSet<String>,
    touched: bool,
    deadline: Option<Instant>,
}

impl DerivationOrchestrator {
    /// Wire the pipelines to a form setup signal and a form value signal.
    /// Initial overrides are populated synchronously before this returns.
    pub fn new(
        form_setup: Signal<Option<Rc<FormSetup>>>,
        form_value: Signal<FormValue>,
        applicator: PropertyDerivationApplicator,
        store: Rc<PropertyOverrideStore>,
    ) -> Self {
        let inner = Rc::new(OrchestratorInner {
            store,
            applicator,
            collection: signal(Rc::new(Vec::new())),
            latest_value: RefCell::new(form_value.get()),
            immediate: RefCell::new(ImmediateState { dirty: false, deadline: None }),
            debounced: RefCell::new(DebouncedState {
                previous: form_value.get(),
                groups: HashMap::new(),
            }),
            full_apply_pending: Cell::new(false),
            pass_running: Cell::new(false),
            warned_wildcard: RefCell::new(HashSet::new()),
        });

        let mut stop_fns: Vec<Box<dyn FnOnce()>> = Vec::new();

        // Collection rebuild: pure read of the active field tree.
        {
            let inner = inner.clone();
            let setup_signal = form_setup.clone();
            stop_fns.push(Box::new(effect(move || {
                let entries = match setup_signal.get() {
                    Some(setup) => collect_entries(&setup.fields),
                    None => Vec::new(),
                };
                inner.collection.set(Rc::new(entries));
            })));
        }

        // Registration reaction: reset the store for the new collection.
        {
            let inner = inner.clone();
            let setup_signal = form_setup.clone();
            stop_fns.push(Box::new(effect(move || {
                let entries = inner.collection.get();
                let field_count = setup_signal
                    .get()
                    .map(|setup| setup.schema_fields.len())
                    .unwrap_or(0);

                inner.store.clear();
                for entry in entries.iter() {
                    inner.store.register_field(&entry.field_key);
                }
                log::debug!(
                    "derivation: registered {} entries across {} schema fields",
                    entries.len(),
                    field_count
                );

                if cfg!(debug_assertions) {
                    inner.warn_wildcard_entries(&entries);
                }

                // Pending debounce bookkeeping belongs to the old tree.
                inner.debounced.borrow_mut().groups.clear();
                inner.full_apply_pending.set(true);
            })));
        }

        // Immediate pipeline: mark dirty, keep the untracked snapshot fresh.
        {
            let inner = inner.clone();
            let value_signal = form_value.clone();
            stop_fns.push(Box::new(effect(move || {
                let value = value_signal.get();
                *inner.latest_value.borrow_mut() = value;
                inner.immediate.borrow_mut().dirty = true;
            })));
        }

        // Debounced pipeline: pairwise diff into per-duration groups.
        {
            let inner = inner.clone();
            let value_signal = form_value.clone();
            stop_fns.push(Box::new(effect(move || {
                let value = value_signal.get();
                let entries = inner.collection.get();

                let mut state = inner.debounced.borrow_mut();
                let changed = diff_top_level_keys(&state.previous, &value);
                state.previous = value;
                if changed.is_empty() {
                    return;
                }

                for entry in entries
                    .iter()
                    .filter(|e| e.trigger == DerivationTrigger::Debounced)
                {
                    if entry.depends_on.matches(&changed) {
                        let group = state
                            .groups
                            .entry(entry.debounce_duration_ms())
                            .or_default();
                        group.changed.extend(changed.iter().cloned());
                        group.touched = true;
                    }
                }
            })));
        }

        let orchestrator = Self { inner, stop_fns: RefCell::new(stop_fns) };
        orchestrator.inner.flush_initial();
        orchestrator
    }

    /// Pump both pipelines. Call from the host loop with the current time;
    /// sampling windows and debounce timers resolve against it.
    pub fn tick(&self, now: Instant) {
        self.inner.tick(now);
    }

    /// Number of entries in the active collection.
    pub fn entry_count(&self) -> usize {
        self.inner.collection.get().len()
    }

    /// Stop all reactions. Pending timer state is abandoned; no further
    /// pass will run.
    pub fn stop(&self) {
        for stop in self.stop_fns.borrow_mut().drain(..) {
            stop();
        }
    }
}

// =============================================================================
// Pass Execution
// =============================================================================

impl OrchestratorInner {
    /// Synchronous initial population: the registration reaction has just
    /// run for the initial collection, so consume its pending full apply.
    fn flush_initial(&self) {
        self.full_apply_pending.set(false);
        self.immediate.borrow_mut().dirty = false;
        self.run_pass(|_| true);
    }

    fn tick(&self, now: Instant) {
        if self.full_apply_pending.replace(false) {
            let mut immediate = self.immediate.borrow_mut();
            immediate.dirty = false;
            immediate.deadline = None;
            drop(immediate);
            self.run_pass(|_| true);
        }

        self.tick_immediate(now);
        self.tick_debounced(now);
    }

    fn tick_immediate(&self, now: Instant) {
        let due = {
            let mut immediate = self.immediate.borrow_mut();
            if immediate.dirty {
                immediate.dirty = false;
                if immediate.deadline.is_none() {
                    immediate.deadline = Some(now + Duration::from_millis(SAMPLE_WINDOW_MS));
                }
            }
            let due = immediate.deadline.is_some_and(|deadline| now >= deadline);
            if due {
                immediate.deadline = None;
            }
            due
        };

        if due {
            self.run_pass(|entry| entry.trigger == DerivationTrigger::OnChange);
        }
    }

    fn tick_debounced(&self, now: Instant) {
        let due_groups: Vec<(u64, HashSet<String>)> = {
            let mut state = self.debounced.borrow_mut();
            let mut due = Vec::new();
            for (&duration, group) in state.groups.iter_mut() {
                if group.touched {
                    // A change landed since the last tick: (re)start the
                    // window from here.
                    group.touched = false;
                    group.deadline = Some(now + Duration::from_millis(duration));
                } else if group.deadline.is_some_and(|deadline| now >= deadline) {
                    group.deadline = None;
                    due.push((duration, std::mem::take(&mut group.changed)));
                }
            }
            due
        };

        for (duration, changed) in due_groups {
            // Re-read the collection: the wait may have outlived the tree
            // it was scheduled under.
            let entries = self.collection.get();
            let value = self.latest_value.borrow().clone();
            let outcome = self.applicator.apply_changed(
                entries.iter().filter(|entry| {
                    entry.trigger == DerivationTrigger::Debounced
                        && entry.debounce_duration_ms() == duration
                }),
                &changed,
                &value,
                &self.store,
            );
            log::debug!(
                "derivation: debounced({duration}ms) pass applied={} skipped={} errored={}",
                outcome.applied,
                outcome.skipped,
                outcome.errored
            );
        }
    }

    fn run_pass(&self, filter: impl Fn(&PropertyDerivationEntry) -> bool) {
        if self.pass_running.get() {
            // A pass is in flight; its caller re-marks dirty as needed.
            return;
        }
        self.pass_running.set(true);

        let entries = self.collection.get();
        let value = self.latest_value.borrow().clone();
        let outcome = self
            .applicator
            .apply(entries.iter().filter(|e| filter(e)), &value, &self.store);
        log::debug!(
            "derivation: pass applied={} skipped={} errored={}",
            outcome.applied,
            outcome.skipped,
            outcome.errored
        );

        self.pass_running.set(false);
    }

    /// Function-sourced entries with only the implicit wildcard dependency
    /// re-run on every change; that is worth a one-time warning per entry
    /// on large forms. Debug builds only.
    fn warn_wildcard_entries(&self, entries: &PropertyDerivationCollection) {
        let mut warned = self.warned_wildcard.borrow_mut();
        for entry in entries {
            if entry.function_name.is_some()
                && entry.depends_on.is_wildcard()
                && warned.insert(entry.describe())
            {
                log::warn!(
                    "derivation '{}' is function-sourced with no explicit dependsOn; \
                     it re-evaluates on every form-value change",
                    entry.describe()
                );
            }
        }
    }
}

/// Changed top-level keys between two consecutive value snapshots.
fn diff_top_level_keys(previous: &FormValue, current: &FormValue) -> HashSet<String> {
    match (previous, current) {
        (Value::Object(old), Value::Object(new)) => {
            let mut changed = HashSet::new();
            for (key, value) in new {
                if old.get(key) != Some(value) {
                    changed.insert(key.clone());
                }
            }
            for key in old.keys() {
                if !new.contains_key(key) {
                    changed.insert(key.clone());
                }
            }
            changed
        }
        (old, new) if old == new => HashSet::new(),
        // Non-object snapshots: treat every key of either side as changed.
        (old, new) => {
            let mut changed = HashSet::new();
            if let Value::Object(map) = old {
                changed.extend(map.keys().cloned());
            }
            if let Value::Object(map) = new {
                changed.extend(map.keys().cloned());
            }
            changed
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

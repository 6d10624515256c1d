//! One live form: lifecycle driver, scheduler, derivation engine, and the
//! value signal, wired together per instance.
//!
//! Nothing here is process-wide. Two forms on screen get two instances, each
//! with its own scheduler queues, override store, and generation counter.
//!
//! The instance owns the seam between the lifecycle and the derivation
//! engine: a reaction translates the raw state signal into a
//! `Signal<Option<Rc<FormSetup>>>` that only changes when a different setup
//! actually becomes active (pointer identity, so `Transitioning` phases that
//! keep the old tree mounted cause no churn downstream).

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use serde_json::{Value, json};
use spark_signals::{Signal, effect, signal};

use crate::collaborators::{
    ExpressionEvaluator, FormCollaborators, FormHooks, FunctionRegistry,
};
use crate::derivation::{
    DerivationOrchestrator, PropertyDerivationApplicator, PropertyOverrideStore,
};
use crate::error::LifecycleError;
use crate::lifecycle::{LifecycleDriver, LifecycleState, TransitionPhase};
use crate::scheduler::SideEffectScheduler;
use crate::types::{Configuration, FormSetup, FormValue, ValueMap};

// =============================================================================
// Options
// =============================================================================

/// Everything a host supplies to stand up a form instance. The form builder
/// and the expression machinery stay external; the instance wires value
/// capture and restore to its own value signal.
pub struct FormInstanceOptions {
    /// Build a [`FormSetup`] from a configuration.
    pub build_form_setup: Box<dyn Fn(&Configuration) -> Result<FormSetup, LifecycleError>>,
    /// Expression-language evaluator for derivations and conditions.
    pub evaluator: ExpressionEvaluator,
    /// Named derivation function registry.
    pub functions: FunctionRegistry,
    /// Instrumentation callbacks.
    pub hooks: FormHooks,
    /// Optional "frame already settled" predicate; see
    /// [`FormCollaborators::frame_already_settled`].
    pub frame_already_settled: Option<Box<dyn Fn() -> bool>>,
}

// =============================================================================
// FormInstance
// =============================================================================

pub struct FormInstance {
    driver: LifecycleDriver,
    scheduler: SideEffectScheduler,
    orchestrator: DerivationOrchestrator,
    store: Rc<PropertyOverrideStore>,
    form_value: Signal<FormValue>,
    form_setup: Signal<Option<Rc<FormSetup>>>,
    setup_stop: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl FormInstance {
    pub fn new(options: FormInstanceOptions) -> Self {
        let scheduler = SideEffectScheduler::new();
        let form_value: Signal<FormValue> = signal(json!({}));
        let form_setup: Signal<Option<Rc<FormSetup>>> = signal(None);
        let store = Rc::new(PropertyOverrideStore::new());

        let capture_source = form_value.clone();
        let restore_target = form_value.clone();
        let collaborators = FormCollaborators {
            build_form_setup: options.build_form_setup,
            capture_current_value: Box::new(move || capture_source.get()),
            restore_value: Box::new(move |values, valid_keys| {
                let mut current = restore_target.get();
                if let (Value::Object(target), Value::Object(preserved)) = (&mut current, values)
                {
                    for (key, value) in preserved {
                        if valid_keys.contains(key) {
                            target.insert(key.clone(), value.clone());
                        }
                    }
                }
                restore_target.set(current);
            }),
            frame_already_settled: options.frame_already_settled,
        };

        let driver = LifecycleDriver::new(collaborators, options.hooks, scheduler.clone());

        let applicator = PropertyDerivationApplicator::new(options.evaluator, options.functions);
        let orchestrator = DerivationOrchestrator::new(
            form_setup.clone(),
            form_value.clone(),
            applicator,
            store.clone(),
        );

        let setup_stop = Self::wire_setup_sync(&driver, form_setup.clone(), form_value.clone());

        Self {
            driver,
            scheduler,
            orchestrator,
            store,
            form_value,
            form_setup,
            setup_stop: RefCell::new(Some(setup_stop)),
        }
    }

    /// Reaction translating the lifecycle state into the active-setup signal,
    /// deduplicated by pointer identity.
    ///
    /// Default values for an incoming tree are primed when the swap reaches
    /// `Restoring`: the restore pass runs before the state lands in `Ready`,
    /// and merges preserved keys on top of those defaults. The same setup is
    /// never primed twice, so the later `Ready` activation leaves the
    /// restored value intact.
    fn wire_setup_sync(
        driver: &LifecycleDriver,
        setup_writer: Signal<Option<Rc<FormSetup>>>,
        value_writer: Signal<FormValue>,
    ) -> Box<dyn FnOnce()> {
        let state_signal = driver.state_signal();
        let primed: RefCell<Option<Rc<FormSetup>>> = RefCell::new(None);
        let last_active: RefCell<Option<Rc<FormSetup>>> = RefCell::new(None);

        let prime = move |setup: &Rc<FormSetup>,
                          primed: &RefCell<Option<Rc<FormSetup>>>,
                          value_writer: &Signal<FormValue>| {
            let already = primed
                .borrow()
                .as_ref()
                .is_some_and(|p| Rc::ptr_eq(p, setup));
            if !already {
                *primed.borrow_mut() = Some(setup.clone());
                value_writer.set(setup.default_values.clone());
            }
        };

        Box::new(effect(move || {
            let state = state_signal.get();

            if let LifecycleState::Transitioning {
                phase: TransitionPhase::Restoring,
                pending_form_setup: Some(pending),
                ..
            } = &state
            {
                prime(pending, &primed, &value_writer);
            }

            let next = state.active_form_setup();
            let mut last = last_active.borrow_mut();
            let unchanged = match (last.as_ref(), next.as_ref()) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return;
            }
            *last = next.clone();
            drop(last);

            if let Some(setup) = &next {
                prime(setup, &primed, &value_writer);
            }
            setup_writer.set(next);
        }))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn initialize(&self, config: Configuration) {
        self.driver.initialize(config);
    }

    pub fn change_config(&self, config: Configuration) {
        self.driver.change_config(config);
    }

    /// Tear the instance down. Pending deferred work is dropped, all
    /// reactions stop, and the instance ignores further lifecycle calls.
    pub fn destroy(&self) {
        self.driver.destroy();
        self.release_reactions();
    }

    pub fn state_signal(&self) -> Signal<LifecycleState> {
        self.driver.state_signal()
    }

    pub fn current_state(&self) -> LifecycleState {
        self.driver.current_state()
    }

    /// The active form setup; `None` until initialization completes.
    pub fn form_setup(&self) -> Signal<Option<Rc<FormSetup>>> {
        self.form_setup.clone()
    }

    // =========================================================================
    // Values and Overrides
    // =========================================================================

    pub fn form_value(&self) -> Signal<FormValue> {
        self.form_value.clone()
    }

    pub fn set_value(&self, value: FormValue) {
        self.form_value.set(value);
    }

    /// Set one top-level field. No-op when the root value is not an object.
    pub fn set_field(&self, key: &str, value: Value) {
        let mut current = self.form_value.get();
        if let Value::Object(map) = &mut current {
            map.insert(key.to_string(), value);
            self.form_value.set(current);
        }
    }

    /// Current computed property overrides for one field.
    pub fn overrides(&self, field_key: &str) -> ValueMap {
        self.store.overrides(field_key)
    }

    /// The per-field override signal, for reactive consumers.
    pub fn override_signal(&self, field_key: &str) -> Signal<ValueMap> {
        self.store.override_signal(field_key)
    }

    pub fn has_field(&self, field_key: &str) -> bool {
        self.store.has_field(field_key)
    }

    // =========================================================================
    // Host Pumps
    // =========================================================================

    /// Host signal: layout for the current frame settled.
    pub fn frame_boundary(&self) {
        self.scheduler.frame_boundary();
    }

    /// Host signal: the current frame finished rendering.
    pub fn render_complete(&self) {
        self.scheduler.render_complete();
    }

    /// Pump derivation timers (sampling window, debounce groups).
    pub fn tick(&self, now: Instant) {
        self.orchestrator.tick(now);
    }

    fn release_reactions(&self) {
        if let Some(stop) = self.setup_stop.borrow_mut().take() {
            stop();
        }
        self.orchestrator.stop();
    }
}

impl Drop for FormInstance {
    fn drop(&mut self) {
        self.release_reactions();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::empty_function_registry;
    use crate::derivation::SAMPLE_WINDOW_MS;
    use crate::testkit::{config_with_id, path_evaluator, setup_for};
    use crate::types::{DerivationTrigger, FieldDefinition, FieldType, PropertyDerivationConfig};
    use std::time::Duration;

    fn instance() -> FormInstance {
        FormInstance::new(FormInstanceOptions {
            build_form_setup: Box::new(|config| Ok(setup_for(config))),
            evaluator: path_evaluator(),
            functions: empty_function_registry(),
            hooks: FormHooks::default(),
            frame_already_settled: None,
        })
    }

    fn date_range_config(form_id: &str) -> Configuration {
        let mut config = config_with_id(form_id);
        let mut end_date = FieldDefinition::new("endDate", FieldType::Date);
        let mut rule = PropertyDerivationConfig::new("minDate");
        rule.expression = Some("formValue.startDate".into());
        rule.trigger = DerivationTrigger::OnChange;
        end_date.derivations.push(rule);
        config.fields.push(FieldDefinition::new("startDate", FieldType::Date));
        config.fields.push(end_date);
        config
    }

    #[test]
    fn initialize_activates_setup_and_populates_overrides() {
        let form = instance();
        form.initialize(date_range_config("range"));

        assert_eq!(form.current_state().tag(), "ready");
        assert!(form.form_setup().get().is_some());
        assert!(form.has_field("endDate"));

        form.set_field("startDate", serde_json::json!("2024-01-15"));
        let t0 = Instant::now();
        form.tick(t0);
        form.tick(t0 + Duration::from_millis(SAMPLE_WINDOW_MS));

        assert_eq!(
            form.overrides("endDate").get("minDate"),
            Some(&serde_json::json!("2024-01-15"))
        );
    }

    #[test]
    fn config_change_preserves_values_across_the_swap() {
        let form = instance();
        form.initialize(config_with_id("a"));
        form.set_field("name", serde_json::json!("draft"));

        form.change_config(config_with_id("b"));
        assert_eq!(form.current_state().tag(), "transitioning");

        form.frame_boundary();
        form.render_complete();

        assert_eq!(form.current_state().tag(), "ready");
        let value = form.form_value().get();
        assert_eq!(value.get("name"), Some(&serde_json::json!("draft")));
    }

    #[test]
    fn swap_drops_values_for_keys_absent_from_the_new_tree() {
        let form = instance();
        form.initialize(date_range_config("a"));
        form.set_field("startDate", serde_json::json!("2024-01-15"));
        form.set_field("scratch", serde_json::json!("not a field"));

        // The target configuration only has the "name" field.
        form.change_config(config_with_id("b"));
        form.frame_boundary();
        form.render_complete();

        let value = form.form_value().get();
        assert_eq!(value.get("startDate"), None);
        assert_eq!(value.get("scratch"), None);
    }

    #[test]
    fn setup_signal_is_stable_through_transition_phases() {
        let form = instance();
        form.initialize(config_with_id("a"));
        let before = form.form_setup().get().unwrap();

        form.change_config(config_with_id("b"));
        // Old tree still mounted mid-swap.
        let during = form.form_setup().get().unwrap();
        assert!(Rc::ptr_eq(&before, &during));

        form.frame_boundary();
        form.render_complete();
        let after = form.form_setup().get().unwrap();
        assert!(!Rc::ptr_eq(&before, &after));
    }

    #[test]
    fn destroy_clears_overrides_and_ignores_further_lifecycle_calls() {
        let form = instance();
        form.initialize(date_range_config("a"));
        assert!(form.has_field("endDate"));

        form.destroy();
        assert!(form.current_state().is_destroyed());
        assert!(!form.has_field("endDate"));
        assert_eq!(form.form_setup().get(), None);

        form.initialize(config_with_id("b"));
        assert!(form.current_state().is_destroyed());
    }
}

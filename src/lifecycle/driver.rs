//! Lifecycle driver - single-consumer dispatch and effect execution.
//!
//! The driver wraps the pure transition function with everything stateful:
//! a FIFO action queue with a re-entrancy flag (one action, together with
//! every action its effects synchronously produce, fully settles before the
//! next external action is considered), effect execution through the
//! [`SideEffectScheduler`], centralized failure recovery, and the CreateForm
//! generation counter that discards results of superseded build attempts.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use spark_signals::{Signal, signal};

use super::machine::transition;
use super::state::{Action, LifecycleState, SideEffect, TransitionPhase, TransitionRecord};
use crate::collaborators::{FormCollaborators, FormHooks};
use crate::error::LifecycleError;
use crate::scheduler::SideEffectScheduler;
use crate::types::Configuration;

// =============================================================================
// Driver
// =============================================================================

/// Drives one form instance's lifecycle. Cheap to clone; all clones share
/// the same state signal and queue.
#[derive(Clone)]
pub struct LifecycleDriver {
    inner: Rc<DriverInner>,
}

struct DriverInner {
    state: Signal<LifecycleState>,
    queue: RefCell<VecDeque<Action>>,
    /// Re-entrancy flag: set while the dispatch loop is draining the queue.
    processing: Cell<bool>,
    scheduler: SideEffectScheduler,
    collaborators: FormCollaborators,
    hooks: FormHooks,
    /// Generation of the most recently issued CreateForm effect.
    generation: Cell<u64>,
}

impl LifecycleDriver {
    pub fn new(
        collaborators: FormCollaborators,
        hooks: FormHooks,
        scheduler: SideEffectScheduler,
    ) -> Self {
        Self {
            inner: Rc::new(DriverInner {
                state: signal(LifecycleState::Uninitialized),
                queue: RefCell::new(VecDeque::new()),
                processing: Cell::new(false),
                scheduler,
                collaborators,
                hooks,
                generation: Cell::new(0),
            }),
        }
    }

    /// The readable state signal. Reading it from a derived or effect
    /// creates a reactive dependency.
    pub fn state_signal(&self) -> Signal<LifecycleState> {
        self.inner.state.clone()
    }

    /// Current state snapshot.
    pub fn current_state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    pub fn initialize(&self, config: Configuration) {
        self.dispatch(Action::Initialize(Rc::new(config)));
    }

    pub fn change_config(&self, config: Configuration) {
        self.dispatch(Action::ConfigChange(Rc::new(config)));
    }

    pub fn destroy(&self) {
        self.dispatch(Action::Destroy);
    }

    /// Dispatch an action through the single-consumer queue.
    pub fn dispatch(&self, action: Action) {
        self.inner.dispatch(action);
    }
}

// =============================================================================
// Dispatch Loop
// =============================================================================

impl DriverInner {
    fn dispatch(self: &Rc<Self>, action: Action) {
        self.queue.borrow_mut().push_back(action);
        if self.processing.get() {
            // Already draining: the action settles within the current loop.
            return;
        }

        self.processing.set(true);
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(action) => self.process(action),
                None => break,
            }
        }
        self.processing.set(false);
    }

    fn process(self: &Rc<Self>, action: Action) {
        if self.is_stale(&action) {
            log::debug!(
                "lifecycle: discarding stale '{}' (superseded build attempt)",
                action.label()
            );
            return;
        }

        let current = self.state.get();
        let (next, effects) = transition(&current, &action);
        let changed = next != current;

        log::debug!(
            "lifecycle: '{}' {} -> {}",
            action.label(),
            current.tag(),
            next.tag()
        );

        self.state.set(next.clone());

        if changed {
            if let Some(hook) = &self.hooks.on_transition {
                hook(&TransitionRecord {
                    action: action.label(),
                    from: current.tag(),
                    to: next.tag(),
                });
            }
        }

        if next.is_destroyed() {
            // Pending deferred effects must never resume into a dead form.
            self.scheduler.teardown();
        }

        for effect in effects {
            self.run_effect(effect, &action);
        }
    }

    /// Completion actions carry the generation of the CreateForm effect that
    /// produced them; results of superseded attempts are dropped.
    fn is_stale(&self, action: &Action) -> bool {
        match action {
            Action::SetupComplete { generation, .. }
            | Action::ApplyComplete { generation, .. } => *generation != self.generation.get(),
            _ => false,
        }
    }

    // =========================================================================
    // Effect Execution
    // =========================================================================

    fn run_effect(self: &Rc<Self>, effect: SideEffect, cause: &Action) {
        match effect {
            SideEffect::CaptureValue => {
                self.scheduler.run_blocking(|| {
                    let value = (self.collaborators.capture_current_value)();
                    self.dispatch(Action::ValueCaptured(value));
                });
            }

            SideEffect::WaitFrameBoundary => {
                let weak = Rc::downgrade(self);
                let skip_if = self.collaborators.frame_already_settled.as_deref();
                let _ = self.scheduler.run_at_frame_boundary(skip_if, move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.dispatch(Action::TeardownComplete);
                    }
                });
            }

            SideEffect::CreateForm => {
                self.scheduler.run_blocking(|| self.create_form(cause));
            }

            SideEffect::RestoreValues(values) => {
                let weak = Rc::downgrade(self);
                let _ = self.scheduler.run_post_render(move || {
                    let Some(inner) = weak.upgrade() else { return };
                    let LifecycleState::Transitioning {
                        phase: TransitionPhase::Restoring,
                        pending_form_setup: Some(setup),
                        ..
                    } = inner.state.get()
                    else {
                        return;
                    };
                    let valid_keys = setup.valid_keys();
                    (inner.collaborators.restore_value)(&values, &valid_keys);
                    inner.dispatch(Action::RestoreComplete);
                });
            }
        }
    }

    /// Build a FormSetup for the phase-appropriate configuration and
    /// dispatch the matching completion action.
    fn create_form(self: &Rc<Self>, cause: &Action) {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        let (config, applying) = match self.state.get() {
            LifecycleState::Initializing { config } => (config, false),
            LifecycleState::Transitioning {
                phase: TransitionPhase::Applying,
                pending_config,
                ..
            } => (pending_config, true),
            // Destroyed or superseded before the effect ran.
            _ => return,
        };

        match (self.collaborators.build_form_setup)(&config) {
            Ok(setup) => {
                let form_setup = Rc::new(setup);
                if let Some(hook) = &self.hooks.on_form_created {
                    hook(&form_setup);
                }
                let action = if applying {
                    Action::ApplyComplete { form_setup, generation }
                } else {
                    Action::SetupComplete { form_setup, generation }
                };
                self.dispatch(action);
            }
            Err(error) => self.fail(error, cause),
        }
    }

    // =========================================================================
    // Failure Recovery
    // =========================================================================

    /// Bounded recovery: a failed initialization rolls back to
    /// `Uninitialized`; a failed transition rolls back to `Ready` at the
    /// pre-transition configuration. The machine is never left mid-swap.
    fn fail(self: &Rc<Self>, error: LifecycleError, cause: &Action) {
        let current = self.state.get();
        let recovered = match &current {
            LifecycleState::Initializing { .. } => Some(LifecycleState::Uninitialized),
            LifecycleState::Transitioning { current_config, current_form_setup, .. } => {
                Some(LifecycleState::Ready {
                    config: current_config.clone(),
                    form_setup: current_form_setup.clone(),
                })
            }
            _ => None,
        };

        log::error!(
            "lifecycle: effect for '{}' failed in state '{}': {error}",
            cause.label(),
            current.tag()
        );

        if let Some(state) = recovered {
            log::debug!("lifecycle: recovered to '{}'", state.tag());
            self.state.set(state);
        }

        if let Some(hook) = &self.hooks.on_error {
            hook(&error, cause);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! The pure transition function.
//!
//! `transition(state, action)` computes the next state and the side effects
//! to run, touching nothing else. The driver owns sequencing, effect
//! execution, and failure recovery; keeping this function pure makes every
//! row of the transition table testable without collaborators.

use serde_json::Value;

use super::state::{Action, LifecycleState, SideEffect, TransitionPhase};
use crate::types::FormValue;

/// Compute `(next_state, side_effects)` for one action.
///
/// Actions that don't apply in the current state are ignored: same state
/// back, no effects. `Destroy` wins from every state and is terminal.
pub fn transition(state: &LifecycleState, action: &Action) -> (LifecycleState, Vec<SideEffect>) {
    use LifecycleState as S;

    // Destroyed is terminal: every subsequent action is a no-op.
    if state.is_destroyed() {
        return (state.clone(), Vec::new());
    }

    match action {
        Action::Destroy => (S::Destroyed, Vec::new()),

        Action::Initialize(config) => match state {
            S::Uninitialized => (
                S::Initializing { config: config.clone() },
                vec![SideEffect::CreateForm],
            ),
            _ => ignored(state),
        },

        Action::ConfigChange(config) => match state {
            // Not yet stable: restart initialization with the new config.
            S::Uninitialized | S::Initializing { .. } => (
                S::Initializing { config: config.clone() },
                vec![SideEffect::CreateForm],
            ),
            // Stable: begin a full swap, preserving user input first.
            S::Ready { config: current, form_setup } => (
                S::Transitioning {
                    phase: TransitionPhase::Teardown,
                    current_config: current.clone(),
                    pending_config: config.clone(),
                    current_form_setup: form_setup.clone(),
                    preserved_value: None,
                    pending_form_setup: None,
                },
                vec![SideEffect::CaptureValue, SideEffect::WaitFrameBoundary],
            ),
            // Already swapping: latest request wins, phase untouched, no
            // second teardown.
            S::Transitioning {
                phase,
                current_config,
                current_form_setup,
                preserved_value,
                pending_form_setup,
                ..
            } => (
                S::Transitioning {
                    phase: *phase,
                    current_config: current_config.clone(),
                    pending_config: config.clone(),
                    current_form_setup: current_form_setup.clone(),
                    preserved_value: preserved_value.clone(),
                    pending_form_setup: pending_form_setup.clone(),
                },
                Vec::new(),
            ),
            S::Destroyed => ignored(state),
        },

        Action::SetupComplete { form_setup, .. } => match state {
            S::Initializing { config } => (
                S::Ready { config: config.clone(), form_setup: form_setup.clone() },
                Vec::new(),
            ),
            _ => ignored(state),
        },

        Action::ValueCaptured(value) => match state {
            S::Transitioning {
                phase,
                current_config,
                pending_config,
                current_form_setup,
                pending_form_setup,
                ..
            } => (
                S::Transitioning {
                    phase: *phase,
                    current_config: current_config.clone(),
                    pending_config: pending_config.clone(),
                    current_form_setup: current_form_setup.clone(),
                    preserved_value: Some(value.clone()),
                    pending_form_setup: pending_form_setup.clone(),
                },
                Vec::new(),
            ),
            _ => ignored(state),
        },

        Action::TeardownComplete => match state {
            S::Transitioning {
                phase: TransitionPhase::Teardown,
                current_config,
                pending_config,
                current_form_setup,
                preserved_value,
                pending_form_setup,
            } => (
                S::Transitioning {
                    phase: TransitionPhase::Applying,
                    current_config: current_config.clone(),
                    pending_config: pending_config.clone(),
                    current_form_setup: current_form_setup.clone(),
                    preserved_value: preserved_value.clone(),
                    pending_form_setup: pending_form_setup.clone(),
                },
                vec![SideEffect::CreateForm],
            ),
            _ => ignored(state),
        },

        Action::ApplyComplete { form_setup, .. } => match state {
            S::Transitioning {
                phase: TransitionPhase::Applying,
                current_config,
                pending_config,
                current_form_setup,
                preserved_value,
                ..
            } => {
                if preserved_value.as_ref().is_some_and(has_restorable_content) {
                    let values = preserved_value.clone().unwrap_or(Value::Null);
                    (
                        S::Transitioning {
                            phase: TransitionPhase::Restoring,
                            current_config: current_config.clone(),
                            pending_config: pending_config.clone(),
                            current_form_setup: current_form_setup.clone(),
                            preserved_value: preserved_value.clone(),
                            pending_form_setup: Some(form_setup.clone()),
                        },
                        vec![SideEffect::RestoreValues(values)],
                    )
                } else {
                    // Nothing to restore: the swap is done.
                    (
                        S::Ready {
                            config: pending_config.clone(),
                            form_setup: form_setup.clone(),
                        },
                        Vec::new(),
                    )
                }
            }
            _ => ignored(state),
        },

        Action::RestoreComplete => match state {
            S::Transitioning {
                phase: TransitionPhase::Restoring,
                pending_config,
                pending_form_setup: Some(form_setup),
                ..
            } => (
                S::Ready {
                    config: pending_config.clone(),
                    form_setup: form_setup.clone(),
                },
                Vec::new(),
            ),
            _ => ignored(state),
        },
    }
}

fn ignored(state: &LifecycleState) -> (LifecycleState, Vec<SideEffect>) {
    (state.clone(), Vec::new())
}

/// An empty capture (absent, null, or an empty object) means the Restoring
/// phase is skipped entirely.
fn has_restorable_content(value: &FormValue) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{config_with_id, empty_setup};
    use serde_json::json;
    use std::rc::Rc;

    fn ready(id: &str) -> LifecycleState {
        LifecycleState::Ready {
            config: Rc::new(config_with_id(id)),
            form_setup: Rc::new(empty_setup()),
        }
    }

    #[test]
    fn initialize_from_uninitialized_starts_create() {
        let config = Rc::new(config_with_id("a"));
        let (next, effects) =
            transition(&LifecycleState::Uninitialized, &Action::Initialize(config));

        assert_eq!(next.tag(), "initializing");
        assert_eq!(effects, vec![SideEffect::CreateForm]);
    }

    #[test]
    fn initialize_is_ignored_when_already_ready() {
        let state = ready("a");
        let (next, effects) =
            transition(&state, &Action::Initialize(Rc::new(config_with_id("b"))));

        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn config_change_while_initializing_restarts() {
        let state = LifecycleState::Initializing { config: Rc::new(config_with_id("a")) };
        let (next, effects) =
            transition(&state, &Action::ConfigChange(Rc::new(config_with_id("b"))));

        match next {
            LifecycleState::Initializing { config } => assert_eq!(config.form_id, "b"),
            other => panic!("expected initializing, got {}", other.tag()),
        }
        assert_eq!(effects, vec![SideEffect::CreateForm]);
    }

    #[test]
    fn config_change_from_ready_begins_teardown() {
        let (next, effects) =
            transition(&ready("a"), &Action::ConfigChange(Rc::new(config_with_id("b"))));

        match &next {
            LifecycleState::Transitioning { phase, current_config, pending_config, .. } => {
                assert_eq!(*phase, TransitionPhase::Teardown);
                assert_eq!(current_config.form_id, "a");
                assert_eq!(pending_config.form_id, "b");
            }
            other => panic!("expected transitioning, got {}", other.tag()),
        }
        assert_eq!(
            effects,
            vec![SideEffect::CaptureValue, SideEffect::WaitFrameBoundary]
        );
    }

    #[test]
    fn config_change_while_transitioning_latest_wins_without_new_effects() {
        let (mid, _) =
            transition(&ready("a"), &Action::ConfigChange(Rc::new(config_with_id("b"))));
        let (next, effects) =
            transition(&mid, &Action::ConfigChange(Rc::new(config_with_id("c"))));

        match next {
            LifecycleState::Transitioning { phase, pending_config, current_config, .. } => {
                assert_eq!(phase, TransitionPhase::Teardown);
                assert_eq!(pending_config.form_id, "c");
                assert_eq!(current_config.form_id, "a");
            }
            other => panic!("expected transitioning, got {}", other.tag()),
        }
        assert!(effects.is_empty());
    }

    #[test]
    fn apply_complete_without_preserved_value_goes_straight_to_ready() {
        let (s1, _) = transition(&ready("a"), &Action::ConfigChange(Rc::new(config_with_id("b"))));
        let (s2, _) = transition(&s1, &Action::TeardownComplete);

        let setup = Rc::new(empty_setup());
        let (s3, effects) =
            transition(&s2, &Action::ApplyComplete { form_setup: setup, generation: 1 });

        match s3 {
            LifecycleState::Ready { config, .. } => assert_eq!(config.form_id, "b"),
            other => panic!("expected ready, got {}", other.tag()),
        }
        assert!(effects.is_empty());
    }

    #[test]
    fn apply_complete_with_preserved_value_visits_restoring() {
        let (s1, _) = transition(&ready("a"), &Action::ConfigChange(Rc::new(config_with_id("b"))));
        let (s2, _) = transition(&s1, &Action::ValueCaptured(json!({"name": "kept"})));
        let (s3, _) = transition(&s2, &Action::TeardownComplete);

        let setup = Rc::new(empty_setup());
        let (s4, effects) =
            transition(&s3, &Action::ApplyComplete { form_setup: setup, generation: 1 });

        match &s4 {
            LifecycleState::Transitioning { phase, pending_form_setup, .. } => {
                assert_eq!(*phase, TransitionPhase::Restoring);
                assert!(pending_form_setup.is_some());
            }
            other => panic!("expected restoring, got {}", other.tag()),
        }
        assert_eq!(effects, vec![SideEffect::RestoreValues(json!({"name": "kept"}))]);

        let (s5, _) = transition(&s4, &Action::RestoreComplete);
        match s5 {
            LifecycleState::Ready { config, .. } => assert_eq!(config.form_id, "b"),
            other => panic!("expected ready, got {}", other.tag()),
        }
    }

    #[test]
    fn empty_capture_skips_restoring() {
        let (s1, _) = transition(&ready("a"), &Action::ConfigChange(Rc::new(config_with_id("b"))));
        let (s2, _) = transition(&s1, &Action::ValueCaptured(json!({})));
        let (s3, _) = transition(&s2, &Action::TeardownComplete);

        let setup = Rc::new(empty_setup());
        let (s4, _) = transition(&s3, &Action::ApplyComplete { form_setup: setup, generation: 1 });
        assert_eq!(s4.tag(), "ready");
    }

    #[test]
    fn destroy_is_terminal_from_every_state() {
        let states = [
            LifecycleState::Uninitialized,
            LifecycleState::Initializing { config: Rc::new(config_with_id("a")) },
            ready("a"),
        ];
        for state in states {
            let (destroyed, effects) = transition(&state, &Action::Destroy);
            assert!(destroyed.is_destroyed());
            assert!(effects.is_empty());

            // Nothing moves a destroyed machine.
            let (still, effects) = transition(
                &destroyed,
                &Action::Initialize(Rc::new(config_with_id("z"))),
            );
            assert!(still.is_destroyed());
            assert!(effects.is_empty());
        }
    }
}

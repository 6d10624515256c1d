//! External collaborator seams.
//!
//! The engine never builds form setups, reads widget state, or parses
//! expressions itself; those live in host-supplied closures. Closures are
//! grouped in plain structs so a host wires everything up in one place and
//! tests substitute recording fakes.
//!
//! `Rc<dyn Fn>` is used for the evaluator and function registry because both
//! are cloned into reactive closures; `Box<dyn Fn>` is enough for the
//! lifecycle collaborators, which live behind a single owner.

use std::collections::HashSet;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{ExpressionError, LifecycleError};
use crate::lifecycle::{Action, TransitionRecord};
use crate::types::{Configuration, FormSetup, FormValue};

// =============================================================================
// Expression Evaluation
// =============================================================================

/// Evaluation context handed to the expression evaluator and to named
/// derivation functions.
///
/// For array-scoped evaluation `form_value` is the current item and
/// `root_value` is the whole form snapshot (the side channel for
/// cross-referencing outside the item).
pub struct EvalContext<'a> {
    pub form_value: &'a FormValue,
    pub root_value: &'a FormValue,
    /// Index of the current item for array-scoped evaluation.
    pub item_index: Option<usize>,
}

impl<'a> EvalContext<'a> {
    /// Root-scoped context: `form_value` and `root_value` coincide.
    pub fn root(form_value: &'a FormValue) -> Self {
        Self { form_value, root_value: form_value, item_index: None }
    }

    /// Item-scoped context for one array element.
    pub fn item(item: &'a FormValue, root: &'a FormValue, index: usize) -> Self {
        Self { form_value: item, root_value: root, item_index: Some(index) }
    }
}

/// The expression-language evaluator, consumed as a pure function.
pub type ExpressionEvaluator = Rc<dyn Fn(&str, &EvalContext) -> Result<Value, ExpressionError>>;

/// A named derivation function resolved from the registry.
pub type DerivationFn = Rc<dyn Fn(&EvalContext) -> Result<Value, ExpressionError>>;

/// The named-function registry: `None` means the name is unknown, which the
/// applicator turns into a hard error for the offending entry.
pub type FunctionRegistry = Rc<dyn Fn(&str) -> Option<DerivationFn>>;

/// Registry that knows no functions.
pub fn empty_function_registry() -> FunctionRegistry {
    Rc::new(|_name| None)
}

// =============================================================================
// Lifecycle Collaborators
// =============================================================================

/// Host closures the lifecycle machine drives its side effects through.
pub struct FormCollaborators {
    /// Build a [`FormSetup`] from a configuration. May fail.
    pub build_form_setup: Box<dyn Fn(&Configuration) -> Result<FormSetup, LifecycleError>>,
    /// Snapshot the form's current (possibly uncommitted) value.
    pub capture_current_value: Box<dyn Fn() -> FormValue>,
    /// Write preserved values back, restricted to the given valid keys.
    pub restore_value: Box<dyn Fn(&FormValue, &HashSet<String>)>,
    /// Optional "already settled" predicate for the frame-boundary wait:
    /// when it returns true the wait is skipped and teardown completes
    /// synchronously.
    pub frame_already_settled: Option<Box<dyn Fn() -> bool>>,
}

// =============================================================================
// Instrumentation Hooks
// =============================================================================

/// Optional instrumentation callbacks. All default to absent.
#[derive(Default)]
pub struct FormHooks {
    /// Invoked after the form builder produced a new setup, before the
    /// corresponding completion action is dispatched.
    pub on_form_created: Option<Box<dyn Fn(&FormSetup)>>,
    /// Invoked after every state transition.
    pub on_transition: Option<Box<dyn Fn(&TransitionRecord)>>,
    /// Invoked when a side effect fails and state recovery runs.
    pub on_error: Option<Box<dyn Fn(&LifecycleError, &Action)>>,
}

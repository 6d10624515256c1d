//! # spark-forms
//!
//! Reactive form engine for Rust.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained reactivity.
//!
//! ## Architecture
//!
//! A form is described by an immutable [`types::Configuration`] (a tree of
//! field definitions) and driven by two cooperating pieces:
//!
//! - a **lifecycle state machine** that owns creation, configuration swaps
//!   with value preservation, and teardown, expressed as a pure transition
//!   function plus a driver that executes its side effects; and
//! - a **property derivation engine** that recomputes declared field
//!   properties (min/max, options, visibility, ...) from the live form
//!   value, through an immediate and a debounced pipeline.
//!
//! Both write into reactive signals, so render layers consume state the same
//! way they consume any other signal:
//! ```text
//! Configuration → LifecycleDriver → FormSetup signal → DerivationOrchestrator → override signals
//! ```
//!
//! [`form::FormInstance`] wires one of everything together per live form.
//!
//! ## Modules
//!
//! - [`types`] - Core types (Configuration, FieldDefinition, FormSetup, ...)
//! - [`lifecycle`] - State machine, driver, and side effects
//! - [`derivation`] - Property derivation collector, store, and pipelines
//! - [`scheduler`] - Blocking / frame-boundary / post-render side-effect tiers
//! - [`collaborators`] - Host seams (form builder, expression evaluator)

pub mod collaborators;
pub mod derivation;
pub mod error;
pub mod form;
pub mod lifecycle;
pub mod scheduler;
pub mod types;
pub mod value_path;

#[cfg(test)]
pub(crate) mod testkit;

// Re-export commonly used items
pub use types::*;

pub use collaborators::{
    DerivationFn, EvalContext, ExpressionEvaluator, FormCollaborators, FormHooks,
    FunctionRegistry, empty_function_registry,
};

pub use derivation::{
    ApplyOutcome, DEFAULT_DEBOUNCE_MS, Dependencies, DerivationOrchestrator,
    PropertyDerivationApplicator, PropertyDerivationCollection, PropertyDerivationEntry,
    PropertyOverrideStore, SAMPLE_WINDOW_MS, collect_entries,
};

pub use error::{DerivationError, ExpressionError, LifecycleError};

pub use form::{FormInstance, FormInstanceOptions};

pub use lifecycle::{
    Action, LifecycleDriver, LifecycleState, SideEffect, TransitionPhase, TransitionRecord,
    transition,
};

pub use scheduler::{SideEffectScheduler, TaskHandle};

//! Lifecycle types - states, actions, side effects.
//!
//! All three are sum types consumed by exhaustive `match`; adding a variant
//! without handling it everywhere is a compile error.

use std::rc::Rc;

use crate::types::{Configuration, FormSetup, FormValue};

// =============================================================================
// States
// =============================================================================

/// The lifecycle of one form instance.
///
/// `Configuration` and `FormSetup` are shared behind `Rc` so states stay
/// cheap to clone through the state signal.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing {
        config: Rc<Configuration>,
    },
    Ready {
        config: Rc<Configuration>,
        form_setup: Rc<FormSetup>,
    },
    Transitioning {
        phase: TransitionPhase,
        current_config: Rc<Configuration>,
        /// The most recently requested configuration (latest wins).
        pending_config: Rc<Configuration>,
        current_form_setup: Rc<FormSetup>,
        /// Captured form value awaiting restore, once ValueCaptured arrives.
        preserved_value: Option<FormValue>,
        /// The freshly built setup, present only in the Restoring phase.
        pending_form_setup: Option<Rc<FormSetup>>,
    },
    Destroyed,
}

impl LifecycleState {
    /// Stable tag for logs and transition records.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing { .. } => "initializing",
            Self::Ready { .. } => "ready",
            Self::Transitioning { .. } => "transitioning",
            Self::Destroyed => "destroyed",
        }
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// The active form setup, if the form currently has one mounted.
    pub fn active_form_setup(&self) -> Option<Rc<FormSetup>> {
        match self {
            Self::Ready { form_setup, .. } => Some(form_setup.clone()),
            Self::Transitioning { current_form_setup, .. } => Some(current_form_setup.clone()),
            _ => None,
        }
    }
}

/// Sub-phase of a configuration swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    /// Old field tree is being taken down; value capture is in flight.
    Teardown,
    /// New form setup is being built.
    Applying,
    /// Preserved values are being written into the new field tree.
    Restoring,
}

// =============================================================================
// Actions
// =============================================================================

/// Everything that can be dispatched into the machine: the external
/// requests (Initialize / ConfigChange / Destroy) plus the completion
/// actions produced by side effects.
#[derive(Debug, Clone)]
pub enum Action {
    Initialize(Rc<Configuration>),
    ConfigChange(Rc<Configuration>),
    SetupComplete {
        form_setup: Rc<FormSetup>,
        /// CreateForm generation this result belongs to; stale results are
        /// discarded by the driver.
        generation: u64,
    },
    ValueCaptured(FormValue),
    TeardownComplete,
    ApplyComplete {
        form_setup: Rc<FormSetup>,
        generation: u64,
    },
    RestoreComplete,
    Destroy,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initialize(_) => "initialize",
            Self::ConfigChange(_) => "config_change",
            Self::SetupComplete { .. } => "setup_complete",
            Self::ValueCaptured(_) => "value_captured",
            Self::TeardownComplete => "teardown_complete",
            Self::ApplyComplete { .. } => "apply_complete",
            Self::RestoreComplete => "restore_complete",
            Self::Destroy => "destroy",
        }
    }
}

// =============================================================================
// Side Effects
// =============================================================================

/// Effects a transition asks the driver to execute. The driver decides the
/// timing tier and assigns CreateForm generations.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Snapshot the current form value (blocking).
    CaptureValue,
    /// Wait for the next frame boundary before completing teardown.
    WaitFrameBoundary,
    /// Build a FormSetup for the phase-appropriate configuration (blocking).
    CreateForm,
    /// Write preserved values into the new field tree (post-render).
    RestoreValues(FormValue),
}

// =============================================================================
// Transition Record
// =============================================================================

/// One processed action, surfaced through the `on_transition` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub action: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

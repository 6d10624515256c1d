//! Error taxonomy.
//!
//! Derivation failures are scoped to one entry (or one array item) and are
//! converted to counters and log lines by the applicator; they never abort a
//! batch. Lifecycle errors are caught at the action-processing boundary and
//! trigger bounded state recovery.

use thiserror::Error;

/// Raised by the expression evaluator collaborator on syntax or runtime
/// failure. The engine treats the message as opaque.
#[derive(Debug, Clone, Error)]
#[error("expression error: {message}")]
pub struct ExpressionError {
    pub message: String,
}

impl ExpressionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Failure applying a single derivation entry (or one array item of one).
#[derive(Debug, Error)]
pub enum DerivationError {
    /// The entry's source is malformed: none or more than one of
    /// value / expression / functionName is set.
    #[error("derivation for '{field_key}.{target_property}' {problem}")]
    Configuration {
        field_key: String,
        target_property: String,
        problem: &'static str,
    },

    /// A function-sourced entry names a function the registry doesn't know.
    #[error("derivation function '{0}' not found in registry")]
    FunctionNotFound(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

/// Failure executing a lifecycle side effect.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The form builder collaborator rejected a configuration.
    #[error("form builder failed for configuration '{form_id}': {message}")]
    Builder { form_id: String, message: String },

    /// Any other effect body failure.
    #[error("lifecycle effect failed: {message}")]
    Effect { message: String },
}

impl LifecycleError {
    pub fn effect(message: impl Into<String>) -> Self {
        Self::Effect { message: message.into() }
    }
}

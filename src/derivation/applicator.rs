//! Derivation applicator - evaluates entries against a value snapshot.
//!
//! Failure granularity is deliberately small: one bad entry (or one bad
//! array item) becomes a counter and a log line, never an exception that
//! blocks sibling entries or items.

use std::collections::HashSet;

use serde_json::Value;

use crate::collaborators::{EvalContext, ExpressionEvaluator, FunctionRegistry};
use crate::error::DerivationError;
use crate::types::{ConditionConfig, FormValue};
use crate::value_path::{get_path, split_placeholder, with_index};

use super::entry::PropertyDerivationEntry;
use super::store::PropertyOverrideStore;

// =============================================================================
// Batch Outcome
// =============================================================================

/// Aggregate result of one apply pass, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl ApplyOutcome {
    pub fn total(&self) -> usize {
        self.applied + self.skipped + self.errored
    }
}

enum EntryResult {
    Applied,
    Skipped,
}

// =============================================================================
// Applicator
// =============================================================================

/// Evaluates derivation entries and writes results into the override store.
/// Holds the two evaluation collaborators; all other inputs arrive per call.
pub struct PropertyDerivationApplicator {
    evaluator: ExpressionEvaluator,
    functions: FunctionRegistry,
}

impl PropertyDerivationApplicator {
    pub fn new(evaluator: ExpressionEvaluator, functions: FunctionRegistry) -> Self {
        Self { evaluator, functions }
    }

    /// Apply every given entry against the value snapshot.
    pub fn apply<'a>(
        &self,
        entries: impl IntoIterator<Item = &'a PropertyDerivationEntry>,
        form_value: &FormValue,
        store: &PropertyOverrideStore,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        for entry in entries {
            match self.apply_entry(entry, form_value, store) {
                Ok(EntryResult::Applied) => outcome.applied += 1,
                Ok(EntryResult::Skipped) => outcome.skipped += 1,
                Err(error) => {
                    outcome.errored += 1;
                    log::warn!("derivation '{}' not applied: {error}", entry.describe());
                }
            }
        }
        outcome
    }

    /// Apply only entries triggered by the changed-key set (wildcard entries
    /// always match).
    pub fn apply_changed<'a>(
        &self,
        entries: impl IntoIterator<Item = &'a PropertyDerivationEntry>,
        changed: &HashSet<String>,
        form_value: &FormValue,
        store: &PropertyOverrideStore,
    ) -> ApplyOutcome {
        self.apply(
            entries.into_iter().filter(|e| e.depends_on.matches(changed)),
            form_value,
            store,
        )
    }

    // =========================================================================
    // Per-Entry Evaluation
    // =========================================================================

    fn apply_entry(
        &self,
        entry: &PropertyDerivationEntry,
        form_value: &FormValue,
        store: &PropertyOverrideStore,
    ) -> Result<EntryResult, DerivationError> {
        if entry.is_array_scoped() {
            return self.apply_array_entry(entry, form_value, store);
        }

        let ctx = EvalContext::root(form_value);
        if !self.condition_holds(entry, &ctx)? {
            return Ok(EntryResult::Skipped);
        }

        let value = self.resolve_source(entry, &ctx)?;
        store.set_override(&entry.field_key, &entry.target_property, Some(value));
        Ok(EntryResult::Applied)
    }

    /// Apply one placeholder entry per item of the underlying array.
    ///
    /// Partial-failure semantics: one item's failure is logged and does not
    /// abort its siblings. The entry counts as applied if at least one item
    /// wrote an override; with no writes it is errored if anything failed,
    /// otherwise skipped. A value that is not an array at all is a silent
    /// skip (the entry simply doesn't apply yet).
    fn apply_array_entry(
        &self,
        entry: &PropertyDerivationEntry,
        form_value: &FormValue,
        store: &PropertyOverrideStore,
    ) -> Result<EntryResult, DerivationError> {
        let Some((array_path, item_path)) = split_placeholder(&entry.field_key) else {
            return Ok(EntryResult::Skipped);
        };
        let Some(Value::Array(items)) = get_path(form_value, array_path) else {
            return Ok(EntryResult::Skipped);
        };

        let mut wrote = 0;
        let mut last_error: Option<DerivationError> = None;

        for (index, item) in items.iter().enumerate() {
            let ctx = EvalContext::item(item, form_value, index);
            let item_result: Result<bool, DerivationError> = (|| {
                if !self.condition_holds(entry, &ctx)? {
                    return Ok(false);
                }
                let value = self.resolve_source(entry, &ctx)?;
                store.set_override(
                    &with_index(array_path, index, item_path),
                    &entry.target_property,
                    Some(value),
                );
                Ok(true)
            })();

            match item_result {
                Ok(true) => wrote += 1,
                Ok(false) => {}
                Err(error) => {
                    log::warn!(
                        "derivation '{}' failed for item {index}: {error}",
                        entry.describe()
                    );
                    last_error = Some(error);
                }
            }
        }

        if wrote > 0 {
            Ok(EntryResult::Applied)
        } else if let Some(error) = last_error {
            Err(error)
        } else {
            Ok(EntryResult::Skipped)
        }
    }

    fn condition_holds(
        &self,
        entry: &PropertyDerivationEntry,
        ctx: &EvalContext<'_>,
    ) -> Result<bool, DerivationError> {
        match &entry.condition {
            None => Ok(true),
            Some(ConditionConfig::Literal(flag)) => Ok(*flag),
            Some(ConditionConfig::Expression(expression)) => {
                let result = (self.evaluator)(expression, ctx)?;
                Ok(is_truthy(&result))
            }
        }
    }

    /// Resolve the entry's single value source. None or more than one
    /// configured source is a configuration error for this entry.
    fn resolve_source(
        &self,
        entry: &PropertyDerivationEntry,
        ctx: &EvalContext<'_>,
    ) -> Result<Value, DerivationError> {
        match (&entry.value, &entry.expression, &entry.function_name) {
            (Some(value), None, None) => Ok(value.clone()),
            (None, Some(expression), None) => Ok((self.evaluator)(expression, ctx)?),
            (None, None, Some(name)) => {
                let function = (self.functions)(name)
                    .ok_or_else(|| DerivationError::FunctionNotFound(name.clone()))?;
                Ok(function(ctx)?)
            }
            (None, None, None) => Err(DerivationError::Configuration {
                field_key: entry.field_key.clone(),
                target_property: entry.target_property.clone(),
                problem: "has no value source",
            }),
            _ => Err(DerivationError::Configuration {
                field_key: entry.field_key.clone(),
                target_property: entry.target_property.clone(),
                problem: "has more than one value source",
            }),
        }
    }
}

/// Expression-condition truthiness: everything except `null` and `false`.
fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

// =============================================================================
// Tests
// =============================================================================

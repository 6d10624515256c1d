//! Derivation entries - the collected, flat form of derivation rules.
//!
//! A [`PropertyDerivationEntry`] is one field's rule after collection walked
//! the tree: the field key is fully qualified (array-nested keys carry the
//! `$` placeholder) and dependencies are resolved to either a concrete key
//! set or the wildcard. Entries never read each other's output, so a
//! collection is an unordered flat list.

use std::collections::HashSet;

use serde_json::Value;

use crate::types::{ConditionConfig, DerivationTrigger};
use crate::value_path::{has_placeholder, root_segment};

/// Debounce window used when a Debounced entry doesn't configure one.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// A collected derivation collection: flat, order-irrelevant.
pub type PropertyDerivationCollection = Vec<PropertyDerivationEntry>;

// =============================================================================
// Dependencies
// =============================================================================

/// What an entry re-evaluates on: a set of top-level field keys, or any
/// change at all (the wildcard, used when dependencies cannot be statically
/// determined).
#[derive(Debug, Clone, PartialEq)]
pub enum Dependencies {
    Keys(Vec<String>),
    Wildcard,
}

impl Dependencies {
    /// Whether a changed-key set triggers this entry.
    pub fn matches(&self, changed: &HashSet<String>) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Keys(keys) => keys.iter().any(|key| changed.contains(key.as_str())),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }

    /// Merge additional keys (condition dependencies). Wildcard absorbs
    /// everything.
    pub fn merge_keys(&mut self, extra: Vec<String>) {
        if let Self::Keys(keys) = self {
            for key in extra {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
    }
}

// =============================================================================
// Entry
// =============================================================================

/// One collected derivation rule.
///
/// The `value` / `expression` / `function_name` triple is kept raw: exactly
/// one must be set, and the applicator surfaces a configuration error for
/// the entry at apply time if that is violated.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDerivationEntry {
    /// Fully qualified field key; `"items.$.endDate"` for array children.
    pub field_key: String,
    pub target_property: String,
    pub depends_on: Dependencies,
    pub condition: Option<ConditionConfig>,
    pub value: Option<Value>,
    pub expression: Option<String>,
    pub function_name: Option<String>,
    pub trigger: DerivationTrigger,
    pub debounce_ms: Option<u64>,
    pub debug_label: Option<String>,
}

impl PropertyDerivationEntry {
    /// Whether this entry applies per item of an enclosing array.
    pub fn is_array_scoped(&self) -> bool {
        has_placeholder(&self.field_key)
    }

    pub fn debounce_duration_ms(&self) -> u64 {
        self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    /// Label used in log lines: the debug label when configured, else the
    /// key/property pair.
    pub fn describe(&self) -> String {
        match &self.debug_label {
            Some(label) => label.clone(),
            None => format!("{}.{}", self.field_key, self.target_property),
        }
    }
}

// =============================================================================
// Expression Dependency Extraction
// =============================================================================

/// Extract top-level field dependencies from an expression string.
///
/// Any `formValue.<path>` reference contributes the first path segment,
/// which is the granularity the changed-key diff produces. Item-scoped
/// references inside array entries resolve against the item at apply time
/// and are extracted the same way.
pub fn extract_expression_deps(expression: &str) -> Vec<String> {
    const MARKER: &str = "formValue.";

    let mut deps = Vec::new();
    let mut offset = 0;
    while let Some(pos) = expression[offset..].find(MARKER) {
        let start = offset + pos;
        let preceded_by_ident = start > 0
            && expression[..start]
                .chars()
                .next_back()
                .is_some_and(is_ident_char);
        let after = &expression[start + MARKER.len()..];
        let ident: String = after.chars().take_while(|c| is_ident_char(*c)).collect();

        if !preceded_by_ident && !ident.is_empty() {
            let dep = root_segment(&ident).to_string();
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        offset = start + MARKER.len();
    }
    deps
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// =============================================================================
// Tests
// =============================================================================

//! Derivation collector - walks the field tree, extracts entries.
//!
//! Collection is a pure read: no signals, no store access. The orchestrator
//! re-runs it whenever the active field tree changes.

use crate::types::{
    ARRAY_PLACEHOLDER, ConditionConfig, FieldDefinition, FieldType, PropertyDerivationConfig,
};

use super::entry::{Dependencies, PropertyDerivationEntry, extract_expression_deps};

/// Walk a field tree and collect every derivation entry.
///
/// The walk tracks the nearest enclosing array field's key: a field nested
/// under an array gets the placeholder-encoded key
/// `<arrayKey>.$.<fieldKey>`, resolved to concrete indices at apply time.
/// Group nesting does not change keys; fields share one flat key namespace.
pub fn collect_entries(fields: &[FieldDefinition]) -> Vec<PropertyDerivationEntry> {
    let mut entries = Vec::new();
    walk(fields, None, &mut entries);
    entries
}

fn walk(
    fields: &[FieldDefinition],
    array_context: Option<&str>,
    out: &mut Vec<PropertyDerivationEntry>,
) {
    for field in fields {
        let field_key = match array_context {
            Some(array_key) => format!("{array_key}.{ARRAY_PLACEHOLDER}.{}", field.key),
            None => field.key.clone(),
        };

        for config in &field.derivations {
            out.push(build_entry(&field_key, config));
        }

        match field.field_type {
            FieldType::Array => walk(&field.children, Some(&field_key), out),
            FieldType::Group => walk(&field.children, array_context, out),
            _ => {}
        }
    }
}

fn build_entry(field_key: &str, config: &PropertyDerivationConfig) -> PropertyDerivationEntry {
    // Resolution order: explicit list wins; else parse the expression; a
    // function source with no explicit list depends on everything.
    let mut depends_on = match (&config.depends_on, &config.expression, &config.function_name) {
        (Some(explicit), _, _) => Dependencies::Keys(explicit.clone()),
        (None, Some(expression), _) => Dependencies::Keys(extract_expression_deps(expression)),
        (None, None, Some(_)) => Dependencies::Wildcard,
        (None, None, None) => Dependencies::Keys(Vec::new()),
    };

    // Condition dependencies are extracted regardless of source.
    if let Some(ConditionConfig::Expression(condition)) = &config.condition {
        depends_on.merge_keys(extract_expression_deps(condition));
    }

    PropertyDerivationEntry {
        field_key: field_key.to_string(),
        target_property: config.target_property.clone(),
        depends_on,
        condition: config.condition.clone(),
        value: config.value.clone(),
        expression: config.expression.clone(),
        function_name: config.function_name.clone(),
        trigger: config.trigger,
        debounce_ms: config.debounce_ms,
        debug_label: config.debug_label.clone(),
    }
}

// =============================================================================
// Tests
// =============================================================================

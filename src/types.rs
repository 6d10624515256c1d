//! Core types - Configuration, field definitions, and the built FormSetup.
//!
//! A [`Configuration`] is the immutable external description of a form: a
//! tree of field definitions plus form-wide defaults. A [`FormSetup`] is the
//! derived, ready-to-render artifact the external form builder produces from
//! a Configuration. Both are plain data; all reactivity lives in the
//! lifecycle and derivation modules.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Form Values
// =============================================================================

/// A form-value snapshot. The root is a JSON object; nested values are
/// addressed with dotted paths (`"address.city"`, `"items.0.endDate"`).
pub type FormValue = Value;

/// A map of property name to property value (one field's properties, or one
/// field's computed overrides).
pub type ValueMap = serde_json::Map<String, Value>;

/// Path segment standing for "every index" of an enclosing array field.
pub const ARRAY_PLACEHOLDER: &str = "$";

// =============================================================================
// Configuration
// =============================================================================

/// Immutable description of a form. Supplied externally, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Identifies the configuration (used in logs and transition records).
    pub form_id: String,
    /// The field definition tree.
    pub fields: Vec<FieldDefinition>,
    /// Form-wide default property values, keyed by property name.
    #[serde(default)]
    pub property_defaults: ValueMap,
    /// Default validation messages, keyed by rule name.
    #[serde(default)]
    pub validation_messages: ValueMap,
    /// External data bindings, keyed by binding name.
    #[serde(default)]
    pub data_bindings: ValueMap,
}

/// One node of the field definition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub key: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Static property values (label, placeholder, min/max, ...).
    #[serde(default)]
    pub properties: ValueMap,
    /// Property derivation rules attached to this field.
    #[serde(default)]
    pub derivations: Vec<PropertyDerivationConfig>,
    /// Child definitions (Group and Array fields only).
    #[serde(default)]
    pub children: Vec<FieldDefinition>,
}

impl FieldDefinition {
    /// Leaf field with no derivations, used as a building block.
    pub fn new(key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            field_type,
            default_value: None,
            properties: ValueMap::new(),
            derivations: Vec::new(),
            children: Vec::new(),
        }
    }

    /// True for field types that contain child definitions.
    pub fn is_container(&self) -> bool {
        matches!(self.field_type, FieldType::Group | FieldType::Array)
    }
}

/// The kind of widget a field renders as. Group and Array are containers;
/// Array repeats its children once per item of the bound array value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Select,
    Checkbox,
    Group,
    Array,
}

// =============================================================================
// Property Derivation Configuration
// =============================================================================

/// One derivation rule as it appears in a field definition: "compute
/// `target_property` of this field from other fields' values".
///
/// Exactly one of `value` / `expression` / `function_name` must be set.
/// That invariant is deliberately not enforced at deserialization time;
/// the applicator surfaces a configuration error for the offending entry
/// so one bad rule never rejects a whole configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDerivationConfig {
    pub target_property: String,
    /// Explicit dependency list. When absent, dependencies are extracted
    /// from the expression string; a function source with no explicit list
    /// depends on everything (wildcard).
    #[serde(default)]
    pub depends_on: Option<Vec<String>>,
    /// Gate for the rule; defaults to always-on.
    #[serde(default)]
    pub condition: Option<ConditionConfig>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub trigger: DerivationTrigger,
    /// Debounce window in milliseconds (Debounced trigger only).
    #[serde(default)]
    pub debounce_ms: Option<u64>,
    /// Free-form label surfaced in logs and diagnostics.
    #[serde(default)]
    pub debug_label: Option<String>,
}

impl PropertyDerivationConfig {
    pub fn new(target_property: impl Into<String>) -> Self {
        Self {
            target_property: target_property.into(),
            depends_on: None,
            condition: None,
            value: None,
            expression: None,
            function_name: None,
            trigger: DerivationTrigger::default(),
            debounce_ms: None,
            debug_label: None,
        }
    }
}

/// Condition guarding a derivation rule: a literal boolean or an expression
/// evaluated against the form value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionConfig {
    Literal(bool),
    Expression(String),
}

/// When a derivation re-evaluates: on every value change (after a short
/// coalescing window) or after a quiet period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DerivationTrigger {
    #[default]
    OnChange,
    Debounced,
}

// =============================================================================
// FormSetup
// =============================================================================

/// Derived artifact built from a [`Configuration`] by the external form
/// builder. Everything the engine and render layer need at runtime,
/// precomputed once per configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSetup {
    /// The active field definition tree (drives derivation collection).
    pub fields: Vec<FieldDefinition>,
    /// Flattened renderable fields in display order.
    pub renderable_fields: Vec<RenderField>,
    /// Flattened schema fields (validation and restore-key computation).
    pub schema_fields: Vec<SchemaField>,
    /// Computed default values (root object).
    pub default_values: FormValue,
    /// Detected mode for this configuration.
    pub mode: FormMode,
    /// Snapshot of the field-type registry at build time.
    pub registered_types: Vec<FieldType>,
}

impl FormSetup {
    /// The set of field keys a preserved value may be restored into.
    pub fn valid_keys(&self) -> HashSet<String> {
        self.schema_fields.iter().map(|f| f.key.clone()).collect()
    }
}

/// One flattened renderable field.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderField {
    pub key: String,
    pub field_type: FieldType,
    pub properties: ValueMap,
}

/// One flattened schema field. Keys of array children keep the `$`
/// placeholder segment (`"items.$.endDate"`).
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub key: String,
    pub field_type: FieldType,
}

/// Whether the form edits an existing value or creates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormMode {
    #[default]
    Create,
    Edit,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derivation_config_from_json() {
        let config: PropertyDerivationConfig = serde_json::from_value(json!({
            "targetProperty": "minDate",
            "expression": "formValue.startDate",
            "dependsOn": ["startDate"],
            "trigger": "onChange"
        }))
        .unwrap();

        assert_eq!(config.target_property, "minDate");
        assert_eq!(config.depends_on, Some(vec!["startDate".to_string()]));
        assert_eq!(config.expression.as_deref(), Some("formValue.startDate"));
        assert_eq!(config.trigger, DerivationTrigger::OnChange);
        assert!(config.value.is_none());
        assert!(config.function_name.is_none());
    }

    #[test]
    fn condition_deserializes_literal_and_expression() {
        let lit: ConditionConfig = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(lit, ConditionConfig::Literal(false));

        let expr: ConditionConfig =
            serde_json::from_value(json!("formValue.country == 'US'")).unwrap();
        assert_eq!(
            expr,
            ConditionConfig::Expression("formValue.country == 'US'".to_string())
        );
    }

    #[test]
    fn valid_keys_come_from_schema_fields() {
        let setup = FormSetup {
            fields: Vec::new(),
            renderable_fields: Vec::new(),
            schema_fields: vec![
                SchemaField { key: "a".into(), field_type: FieldType::Text },
                SchemaField { key: "b".into(), field_type: FieldType::Number },
            ],
            default_values: json!({}),
            mode: FormMode::Create,
            registered_types: Vec::new(),
        };

        let keys = setup.valid_keys();
        assert!(keys.contains("a"));
        assert!(keys.contains("b"));
        assert_eq!(keys.len(), 2);
    }
}

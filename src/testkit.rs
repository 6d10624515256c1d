//! Shared test fixtures: canned configurations, a minimal stand-in for the
//! external form builder, and a path-lookup expression evaluator. Test-only.

use std::rc::Rc;

use serde_json::json;

use crate::collaborators::ExpressionEvaluator;
use crate::error::ExpressionError;
use crate::types::{
    Configuration, FieldDefinition, FieldType, FormMode, FormSetup, RenderField, SchemaField,
    ValueMap,
};
use crate::value_path::get_path;

/// A one-field configuration: a single text field named `name`.
pub(crate) fn config_with_id(form_id: &str) -> Configuration {
    Configuration {
        form_id: form_id.into(),
        fields: vec![FieldDefinition::new("name", FieldType::Text)],
        property_defaults: ValueMap::new(),
        validation_messages: ValueMap::new(),
        data_bindings: ValueMap::new(),
    }
}

/// A setup with no fields at all.
pub(crate) fn empty_setup() -> FormSetup {
    setup_with_fields(Vec::new())
}

/// What the external form builder would produce for `config`.
pub(crate) fn setup_for(config: &Configuration) -> FormSetup {
    setup_with_fields(config.fields.clone())
}

/// Build a setup straight from a field tree, flattening the way the real
/// builder does: group children keep their flat keys, array children get the
/// `parent.$.child` placeholder key.
pub(crate) fn setup_with_fields(fields: Vec<FieldDefinition>) -> FormSetup {
    let mut renderable_fields = Vec::new();
    let mut schema_fields = Vec::new();
    flatten(&fields, None, &mut renderable_fields, &mut schema_fields);

    let mut registered_types: Vec<FieldType> =
        schema_fields.iter().map(|f| f.field_type).collect();
    registered_types.dedup();

    FormSetup {
        fields,
        renderable_fields,
        schema_fields,
        default_values: json!({}),
        mode: FormMode::Create,
        registered_types,
    }
}

fn flatten(
    fields: &[FieldDefinition],
    prefix: Option<&str>,
    renderable: &mut Vec<RenderField>,
    schema: &mut Vec<SchemaField>,
) {
    for field in fields {
        let key = match prefix {
            Some(prefix) => format!("{prefix}.{}", field.key),
            None => field.key.clone(),
        };
        schema.push(SchemaField { key: key.clone(), field_type: field.field_type });

        match field.field_type {
            FieldType::Group => flatten(&field.children, prefix, renderable, schema),
            FieldType::Array => {
                let child_prefix = format!("{key}.$");
                flatten(&field.children, Some(&child_prefix), renderable, schema);
            }
            _ => renderable.push(RenderField {
                key,
                field_type: field.field_type,
                properties: field.properties.clone(),
            }),
        }
    }
}

/// Evaluator that resolves `formValue.<dotted.path>` by plain path lookup in
/// the evaluation context. A missing path is an evaluation error, which is
/// enough to exercise the applicator's error paths.
pub(crate) fn path_evaluator() -> ExpressionEvaluator {
    Rc::new(|expression, ctx| {
        if expression == "formValue" {
            return Ok(ctx.form_value.clone());
        }
        let path = expression.strip_prefix("formValue.").ok_or_else(|| {
            ExpressionError::new(format!("unsupported expression: {expression}"))
        })?;
        match get_path(ctx.form_value, path) {
            Some(value) => Ok(value.clone()),
            None => Err(ExpressionError::new(format!("path not found: {path}"))),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::EvalContext;

    #[test]
    fn builder_flattens_array_children_with_placeholder_keys() {
        let mut items = FieldDefinition::new("items", FieldType::Array);
        items.children.push(FieldDefinition::new("endDate", FieldType::Date));
        let setup = setup_with_fields(vec![
            FieldDefinition::new("name", FieldType::Text),
            items,
        ]);

        let keys = setup.valid_keys();
        assert!(keys.contains("name"));
        assert!(keys.contains("items"));
        assert!(keys.contains("items.$.endDate"));
    }

    #[test]
    fn path_evaluator_resolves_nested_and_errors_on_missing() {
        let value = json!({"address": {"city": "Lisbon"}});
        let ctx = EvalContext::root(&value);
        let eval = path_evaluator();

        assert_eq!(eval("formValue.address.city", &ctx).unwrap(), json!("Lisbon"));
        assert!(eval("formValue.missing", &ctx).is_err());
    }
}

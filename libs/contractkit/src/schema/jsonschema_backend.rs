//! Backend built on the `jsonschema` crate (Draft 2020-12).
//!
//! Coercion reuses the native checker walk so both backends agree on what
//! `parse` turns `"42"` into; the verdict itself comes from the compiled
//! JSON Schema validator.

use std::sync::Arc;

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, Validator};

use super::coerce;
use super::json_schema::{to_json_schema, ERROR_TYPE};
use super::native::{Checker, Mode};
use super::{CompiledSchema, Issue, ParseResult, Schema, SchemaAdapter, SchemaError};
use crate::value::Value;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaAdapter;

impl JsonSchemaAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SchemaAdapter for JsonSchemaAdapter {
    fn name(&self) -> &'static str {
        "jsonschema"
    }

    fn compile(&self, schema: &Schema) -> Result<Arc<dyn CompiledSchema>, SchemaError> {
        schema.check_well_formed()?;
        let document = to_json_schema(schema);
        let mut opts = jsonschema::options();
        opts.with_draft(Draft::Draft202012)
            .should_validate_formats(true)
            .with_format("date-time", is_date_string);
        let validator = opts.build(&document).map_err(|e| SchemaError::Backend {
            backend: "jsonschema",
            message: e.to_string(),
        })?;
        Ok(Arc::new(JsonSchemaCompiled {
            schema: schema.clone(),
            document,
            validator,
            coercer: Checker::compile(schema),
        }))
    }
}

#[derive(Debug)]
struct JsonSchemaCompiled {
    schema: Schema,
    document: serde_json::Value,
    validator: Validator,
    coercer: Checker,
}

impl JsonSchemaCompiled {
    fn issues_for(&self, instance: &serde_json::Value) -> Vec<Issue> {
        self.validator
            .iter_errors(instance)
            .map(|e| {
                let mut path = pointer_segments(e.instance_path.as_str());
                let message = match &e.kind {
                    ValidationErrorKind::Required { property } => {
                        path.push(
                            property
                                .as_str()
                                .map(str::to_string)
                                .unwrap_or_else(|| property.to_string()),
                        );
                        "required".to_string()
                    }
                    ValidationErrorKind::AdditionalProperties { unexpected } => {
                        format!("unrecognized key(s) {}", unexpected.join(", "))
                    }
                    ValidationErrorKind::Type { .. }
                    | ValidationErrorKind::Constant { .. }
                    | ValidationErrorKind::Enum { .. }
                    | ValidationErrorKind::FalseSchema
                    | ValidationErrorKind::Not { .. } => {
                        match self.error_type_at(e.schema_path.as_str()) {
                            Some(expected) => format!("expected {expected}, received {}", kind_of(&e.instance)),
                            None => e.to_string(),
                        }
                    }
                    _ => e.to_string(),
                };
                Issue { path, message }
            })
            .collect()
    }

    /// `errorType` of the schema node owning the failing keyword.
    fn error_type_at(&self, schema_path: &str) -> Option<String> {
        let parent = schema_path.rsplit_once('/').map(|(p, _)| p)?;
        self.document
            .pointer(parent)
            .and_then(|node| node.get(ERROR_TYPE))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

impl CompiledSchema for JsonSchemaCompiled {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn validate(&self, value: &Value) -> bool {
        self.validator.is_valid(&value.to_json())
    }

    fn parse(&self, value: &Value) -> ParseResult {
        let coerced = self
            .coercer
            .walk(value, &mut Vec::new(), &mut Vec::new(), Mode::Parse);
        let issues = self.issues_for(&coerced.to_json());
        if issues.is_empty() {
            Ok(coerced)
        } else {
            Err(issues)
        }
    }
}

/// `date-time` accepts whatever the native date check accepts.
fn is_date_string(s: &str) -> bool {
    coerce::parse_date_str(s).is_some()
}

fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|seg| seg.replace("~1", "/").replace("~0", "~"))
        .collect()
}

fn kind_of(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;
    use serde_json::json;

    #[test]
    fn parse_coerces_then_validates() {
        let s = JsonSchemaAdapter
            .compile(&object([("amount", number()), ("at", date())]))
            .unwrap();
        let out = s
            .parse(&Value::from(json!({"amount": "42", "at": 0})))
            .unwrap();
        assert_eq!(out.get("amount"), Some(&Value::Number(42.0)));
        assert!(matches!(out.get("at"), Some(Value::Date(_))));
    }

    #[test]
    fn issues_carry_instance_paths_and_friendly_messages() {
        let s = JsonSchemaAdapter
            .compile(&object([
                ("params", object([("id", string())])),
                ("body", object([("amount", number())])),
            ]))
            .unwrap();
        let issues = s
            .parse(&Value::from(json!({"params": {}, "body": {"amount": "abc"}})))
            .unwrap_err();
        assert!(issues
            .iter()
            .any(|i| i.path == vec!["params".to_string(), "id".to_string()] && i.message == "required"));
        assert!(issues.iter().any(|i| i.path == vec!["body".to_string(), "amount".to_string()]
            && i.message == "expected number, received string"));
    }

    #[test]
    fn strict_objects_reject_unknown_keys() {
        let s = JsonSchemaAdapter
            .compile(&object([("a", string())]).strict())
            .unwrap();
        assert!(!s.validate(&Value::from(json!({"a": "x", "b": 1}))));
        assert!(s.validate(&Value::from(json!({"a": "x"}))));
    }

    #[test]
    fn date_validation_agrees_with_native() {
        let native = NativeAdapter.compile(&date()).unwrap();
        let backend = JsonSchemaAdapter.compile(&date()).unwrap();
        for (input, expected) in [
            (json!("not a date"), false),
            (json!("2024-05-01T10:00:00Z"), true),
            (json!("2024-05-01"), true),
            (json!(0), false),
        ] {
            let value = Value::from(input.clone());
            assert_eq!(native.validate(&value), expected, "native {input}");
            assert_eq!(backend.validate(&value), expected, "jsonschema {input}");
        }
    }

    #[test]
    fn malformed_schema_fails_to_compile() {
        assert!(JsonSchemaAdapter.compile(&Schema::Union(vec![])).is_err());
    }
}

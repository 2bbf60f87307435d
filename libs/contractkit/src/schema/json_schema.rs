//! JSON Schema projection of [`Schema`].
//!
//! [`to_json_schema`] keeps an internal `errorType` annotation on every leaf so
//! the `jsonschema` backend can phrase issues the same way the native backend
//! does. [`openapi_projection`] strips it again before anything reaches an
//! OpenAPI document.

use serde_json::{json, Map, Value as Json};

use super::{Literal, Schema};

/// Internal-only keyword; never leaves the crate in a published document.
pub const ERROR_TYPE: &str = "errorType";

pub fn to_json_schema(schema: &Schema) -> Json {
    match schema {
        Schema::Any | Schema::Unknown => json!({}),
        Schema::Null => leaf("null", "null"),
        Schema::String => leaf("string", "string"),
        Schema::Number => leaf("number", "number"),
        Schema::Integer => leaf("integer", "integer"),
        Schema::BigInt => json!({"type": "integer", "format": "int64", ERROR_TYPE: "bigint"}),
        Schema::Boolean => leaf("boolean", "boolean"),
        Schema::Date => json!({"type": "string", "format": "date-time", ERROR_TYPE: "date"}),
        Schema::Literal(lit) => json!({
            "type": literal_type(lit),
            "const": lit.to_json(),
            ERROR_TYPE: format!("literal {lit}"),
        }),
        Schema::Enum(values) => {
            let listed = values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            json!({
                "enum": values.iter().map(Literal::to_json).collect::<Vec<_>>(),
                ERROR_TYPE: format!("one of [{listed}]"),
            })
        }
        Schema::Array(items) => json!({
            "type": "array",
            "items": to_json_schema(items),
            ERROR_TYPE: "array",
        }),
        Schema::Object(obj) => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for (name, prop) in &obj.properties {
                properties.insert(name.clone(), to_json_schema(prop));
                if !prop.is_optional() {
                    required.push(Json::String(name.clone()));
                }
            }
            let mut out = Map::new();
            out.insert("type".into(), json!("object"));
            out.insert("properties".into(), Json::Object(properties));
            if !required.is_empty() {
                out.insert("required".into(), Json::Array(required));
            }
            if obj.strict {
                out.insert("additionalProperties".into(), Json::Bool(false));
            }
            out.insert(ERROR_TYPE.into(), json!("object"));
            Json::Object(out)
        }
        Schema::Record(values) => json!({
            "type": "object",
            "additionalProperties": to_json_schema(values),
            ERROR_TYPE: "object",
        }),
        Schema::Union(members) => json!({
            "anyOf": members.iter().map(to_json_schema).collect::<Vec<_>>(),
        }),
        Schema::Optional(inner) => json!({
            "anyOf": [to_json_schema(inner), {"type": "null"}],
        }),
        Schema::Promise(inner) => to_json_schema(inner),
        Schema::Function { .. } => json!({"not": {}, ERROR_TYPE: "function"}),
    }
}

fn leaf(ty: &str, error_type: &str) -> Json {
    json!({"type": ty, ERROR_TYPE: error_type})
}

fn literal_type(lit: &Literal) -> &'static str {
    match lit {
        Literal::String(_) => "string",
        Literal::Number(_) => "number",
        Literal::Bool(_) => "boolean",
    }
}

/// Remove internal annotations and rewrite keywords OpenAPI 3.0 tooling
/// chokes on (`const` becomes a single-value `enum`).
pub fn strip_internal(schema: &Json) -> Json {
    let Json::Object(map) = schema else {
        return schema.clone();
    };
    let mut out = Map::new();
    for (key, value) in map {
        match key.as_str() {
            ERROR_TYPE => {}
            "const" => {
                out.insert("enum".into(), Json::Array(vec![value.clone()]));
            }
            "properties" => {
                let props = value
                    .as_object()
                    .map(|props| {
                        props
                            .iter()
                            .map(|(k, v)| (k.clone(), strip_internal(v)))
                            .collect::<Map<_, _>>()
                    })
                    .unwrap_or_default();
                out.insert(key.clone(), Json::Object(props));
            }
            "items" | "additionalProperties" => {
                out.insert(key.clone(), strip_internal(value));
            }
            "anyOf" | "oneOf" => {
                let members: Vec<Json> = value
                    .as_array()
                    .map(|members| members.iter().map(strip_internal).collect())
                    .unwrap_or_default();
                out.insert(key.clone(), Json::Array(members));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Json::Object(out)
}

pub fn openapi_projection(schema: &Schema) -> Json {
    strip_internal(&to_json_schema(schema))
}

//! In-crate backend: schemas compile into a [`Checker`] tree that is walked
//! once per value, collecting one issue per violated leaf.

use std::collections::HashSet;
use std::sync::Arc;

use super::coerce;
use super::{CompiledSchema, Issue, Literal, ParseResult, Schema, SchemaAdapter, SchemaError};
use crate::value::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Validate,
    Parse,
}

#[derive(Debug)]
pub(crate) struct Field {
    name: String,
    checker: Checker,
    optional: bool,
}

#[derive(Debug)]
pub(crate) enum Checker {
    Any,
    Null,
    String,
    Number,
    Integer,
    BigInt,
    Boolean,
    Date,
    Literal(Literal),
    OneOf(Vec<Literal>),
    Array(Box<Checker>),
    Object {
        fields: Vec<Field>,
        known: HashSet<String>,
        strict: bool,
    },
    Record(Box<Checker>),
    Union(Vec<Checker>),
    Optional(Box<Checker>),
    Reject(&'static str),
}

impl Checker {
    pub(crate) fn compile(schema: &Schema) -> Checker {
        match schema {
            Schema::Any | Schema::Unknown => Checker::Any,
            Schema::Null => Checker::Null,
            Schema::String => Checker::String,
            Schema::Number => Checker::Number,
            Schema::Integer => Checker::Integer,
            Schema::BigInt => Checker::BigInt,
            Schema::Boolean => Checker::Boolean,
            Schema::Date => Checker::Date,
            Schema::Literal(lit) => Checker::Literal(lit.clone()),
            Schema::Enum(values) => Checker::OneOf(values.clone()),
            Schema::Array(items) => Checker::Array(Box::new(Checker::compile(items))),
            Schema::Object(obj) => Checker::Object {
                fields: obj
                    .properties
                    .iter()
                    .map(|(name, s)| Field {
                        name: name.clone(),
                        checker: Checker::compile(s),
                        optional: s.is_optional(),
                    })
                    .collect(),
                known: obj.properties.iter().map(|(k, _)| k.clone()).collect(),
                strict: obj.strict,
            },
            Schema::Record(values) => Checker::Record(Box::new(Checker::compile(values))),
            Schema::Union(members) => Checker::Union(members.iter().map(Checker::compile).collect()),
            Schema::Optional(inner) => Checker::Optional(Box::new(Checker::compile(inner))),
            Schema::Promise(inner) => Checker::compile(inner),
            Schema::Function { .. } => Checker::Reject("expected function"),
        }
    }

    /// Walk `value`, pushing issues and returning the best-effort result.
    /// In `Validate` mode the result is the input as-is.
    pub(crate) fn walk(
        &self,
        value: &Value,
        path: &mut Vec<String>,
        issues: &mut Vec<Issue>,
        mode: Mode,
    ) -> Value {
        let coercing = mode == Mode::Parse;
        match self {
            Checker::Any => value.clone(),
            Checker::Null => {
                if !value.is_null() {
                    issues.push(mismatch(path, "null", value));
                }
                value.clone()
            }
            Checker::String => {
                if !matches!(value, Value::String(_)) {
                    issues.push(mismatch(path, "string", value));
                }
                value.clone()
            }
            Checker::Number | Checker::Integer => {
                let n = if coercing {
                    coerce::to_number(value)
                } else {
                    match value {
                        Value::Number(n) => Some(*n),
                        _ => None,
                    }
                };
                match n {
                    Some(n) if matches!(self, Checker::Integer) && n.fract() != 0.0 => {
                        issues.push(Issue::new(path, format!("expected integer, received {n}")));
                        value.clone()
                    }
                    Some(n) => Value::Number(n),
                    None => {
                        let expected = if matches!(self, Checker::Integer) {
                            "integer"
                        } else {
                            "number"
                        };
                        issues.push(mismatch(path, expected, value));
                        value.clone()
                    }
                }
            }
            Checker::BigInt => {
                let i = if coercing {
                    coerce::to_bigint(value)
                } else {
                    match value {
                        Value::BigInt(i) => Some(*i),
                        Value::Number(n) if n.fract() == 0.0 => Some(*n as i128),
                        _ => None,
                    }
                };
                match i {
                    Some(i) if coercing => Value::BigInt(i),
                    Some(_) => value.clone(),
                    None => {
                        issues.push(mismatch(path, "bigint", value));
                        value.clone()
                    }
                }
            }
            Checker::Boolean => {
                let b = if coercing {
                    coerce::to_boolean(value)
                } else {
                    value.as_bool()
                };
                match b {
                    Some(b) => Value::Bool(b),
                    None => {
                        issues.push(mismatch(path, "boolean", value));
                        value.clone()
                    }
                }
            }
            Checker::Date => {
                let d = if coercing {
                    coerce::to_date(value)
                } else {
                    match value {
                        Value::Date(d) => Some(*d),
                        Value::String(s) => coerce::parse_date_str(s),
                        _ => None,
                    }
                };
                match d {
                    Some(d) if coercing => Value::Date(d),
                    Some(_) => value.clone(),
                    None => {
                        issues.push(mismatch(path, "date", value));
                        value.clone()
                    }
                }
            }
            Checker::Literal(lit) => {
                if !lit.matches(value) {
                    issues.push(Issue::new(
                        path,
                        format!("expected literal {lit}, received {value}"),
                    ));
                }
                value.clone()
            }
            Checker::OneOf(options) => {
                if !options.iter().any(|o| o.matches(value)) {
                    let listed = options
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    issues.push(Issue::new(
                        path,
                        format!("expected one of [{listed}], received {value}"),
                    ));
                }
                value.clone()
            }
            Checker::Array(items) => match value {
                Value::Array(values) => {
                    let mut out = Vec::with_capacity(values.len());
                    for (idx, item) in values.iter().enumerate() {
                        path.push(idx.to_string());
                        out.push(items.walk(item, path, issues, mode));
                        path.pop();
                    }
                    Value::Array(out)
                }
                other => {
                    issues.push(mismatch(path, "array", other));
                    other.clone()
                }
            },
            Checker::Object {
                fields,
                known,
                strict,
            } => match value {
                Value::Object(map) => {
                    let mut out = Map::new();
                    for field in fields {
                        path.push(field.name.clone());
                        match map.get(&field.name) {
                            Some(v) => {
                                let checked = field.checker.walk(v, path, issues, mode);
                                out.insert(field.name.clone(), checked);
                            }
                            None if field.optional => {}
                            None => issues.push(Issue::new(path, "required")),
                        }
                        path.pop();
                    }
                    for (key, v) in map {
                        if known.contains(key) {
                            continue;
                        }
                        if *strict {
                            path.push(key.clone());
                            issues.push(Issue::new(path, format!("unrecognized key '{key}'")));
                            path.pop();
                        } else {
                            out.insert(key.clone(), v.clone());
                        }
                    }
                    Value::Object(out)
                }
                other => {
                    issues.push(mismatch(path, "object", other));
                    other.clone()
                }
            },
            Checker::Record(values) => match value {
                Value::Object(map) => {
                    let mut out = Map::new();
                    for (key, v) in map {
                        path.push(key.clone());
                        out.insert(key.clone(), values.walk(v, path, issues, mode));
                        path.pop();
                    }
                    Value::Object(out)
                }
                other => {
                    issues.push(mismatch(path, "object", other));
                    other.clone()
                }
            },
            Checker::Union(members) => {
                for member in members {
                    let mut local = Vec::new();
                    let out = member.walk(value, path, &mut local, mode);
                    if local.is_empty() {
                        return out;
                    }
                }
                issues.push(Issue::new(
                    path,
                    format!("no union member matched {}", value.kind()),
                ));
                value.clone()
            }
            Checker::Optional(inner) => {
                if value.is_null() {
                    Value::Null
                } else {
                    inner.walk(value, path, issues, mode)
                }
            }
            Checker::Reject(message) => {
                issues.push(Issue::new(path, *message));
                value.clone()
            }
        }
    }

    pub(crate) fn run(&self, value: &Value, mode: Mode) -> ParseResult {
        let mut issues = Vec::new();
        let out = self.walk(value, &mut Vec::new(), &mut issues, mode);
        if issues.is_empty() {
            Ok(out)
        } else {
            Err(issues)
        }
    }
}

fn mismatch(path: &[String], expected: &str, received: &Value) -> Issue {
    Issue::new(
        path,
        format!("expected {expected}, received {}", received.kind()),
    )
}

#[derive(Debug)]
struct NativeCompiled {
    schema: Schema,
    checker: Checker,
}

impl CompiledSchema for NativeCompiled {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn validate(&self, value: &Value) -> bool {
        self.checker.run(value, Mode::Validate).is_ok()
    }

    fn parse(&self, value: &Value) -> ParseResult {
        self.checker.run(value, Mode::Parse)
    }
}

/// Backend that needs nothing beyond this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeAdapter;

impl NativeAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SchemaAdapter for NativeAdapter {
    fn name(&self) -> &'static str {
        "native"
    }

    fn compile(&self, schema: &Schema) -> Result<Arc<dyn CompiledSchema>, SchemaError> {
        schema.check_well_formed()?;
        Ok(Arc::new(NativeCompiled {
            schema: schema.clone(),
            checker: Checker::compile(schema),
        }))
    }
}

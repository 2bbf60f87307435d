//! Validator-agnostic schema model and the adapter seam.
//!
//! Contracts are written against [`Schema`] (or the [`Idiomatic`] shorthand),
//! and a [`SchemaAdapter`] turns them into a reusable [`CompiledSchema`]. Two
//! adapters ship with the crate:
//! - [`NativeAdapter`]: an in-crate checker tree
//! - [`JsonSchemaAdapter`]: Draft 2020-12 validation through the `jsonschema` crate
//!
//! Both agree on the coercion policy of `parse` and on the OpenAPI projection.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

pub(crate) mod coerce;
pub mod json_schema;
mod jsonschema_backend;
mod native;

pub use jsonschema_backend::JsonSchemaAdapter;
pub use native::NativeAdapter;

/// Literal values a schema can pin a field to.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
}

impl Literal {
    /// Exact match, no coercion.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Literal::String(a), Value::String(b)) => a == b,
            (Literal::Number(a), Value::Number(b)) => a == b,
            (Literal::Number(a), Value::BigInt(b)) => *a == *b as f64,
            (Literal::Bool(a), Value::Bool(b)) => a == b,
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::String(s) => serde_json::Value::String(s.clone()),
            Literal::Number(n) => Value::Number(*n).to_json(),
            Literal::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Number(n)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Number(n as f64)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Number(f64::from(n))
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

/// Object shape. Property order is the declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    pub properties: Vec<(String, Schema)>,
    /// Reject keys that are not declared.
    pub strict: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, schema: impl Into<Idiomatic>) -> Self {
        self.properties.push((name.into(), schemify(schema.into())));
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, s)| s)
    }
}

/// Validator-native schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Any,
    Unknown,
    Null,
    String,
    Number,
    Integer,
    BigInt,
    Boolean,
    Date,
    Literal(Literal),
    Enum(Vec<Literal>),
    Array(Box<Schema>),
    Object(ObjectSchema),
    Record(Box<Schema>),
    Union(Vec<Schema>),
    Optional(Box<Schema>),
    /// Value produced asynchronously; validated as the resolved value.
    Promise(Box<Schema>),
    /// Callable; no serialized value ever satisfies it.
    Function {
        params: Vec<Schema>,
        returns: Box<Schema>,
    },
}

impl Schema {
    pub fn optional(self) -> Schema {
        match self {
            Schema::Optional(_) => self,
            other => Schema::Optional(Box::new(other)),
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Schema::Optional(_))
    }

    /// Mark an object schema strict; other schemas are returned unchanged.
    pub fn strict(self) -> Schema {
        match self {
            Schema::Object(obj) => Schema::Object(obj.strict()),
            other => other,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Schema::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Structural sanity check shared by every adapter's `compile`.
    pub fn check_well_formed(&self) -> Result<(), SchemaError> {
        match self {
            Schema::Enum(values) if values.is_empty() => {
                Err(SchemaError::Invalid("enum needs at least one value".into()))
            }
            Schema::Union(branches) if branches.is_empty() => {
                Err(SchemaError::Invalid("union needs at least one member".into()))
            }
            Schema::Union(branches) => branches.iter().try_for_each(Schema::check_well_formed),
            Schema::Object(obj) => {
                let mut seen = HashSet::new();
                for (name, schema) in &obj.properties {
                    if !seen.insert(name.as_str()) {
                        return Err(SchemaError::Invalid(format!(
                            "duplicate property '{name}'"
                        )));
                    }
                    schema.check_well_formed()?;
                }
                Ok(())
            }
            Schema::Array(inner)
            | Schema::Record(inner)
            | Schema::Optional(inner)
            | Schema::Promise(inner) => inner.check_well_formed(),
            Schema::Function { params, returns } => {
                params.iter().try_for_each(Schema::check_well_formed)?;
                returns.check_well_formed()
            }
            _ => Ok(()),
        }
    }
}

/// Shorthand accepted wherever a schema is expected: nested plain objects,
/// bare literals, or a native schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Idiomatic {
    Object(Vec<(String, Idiomatic)>),
    Literal(Literal),
    Native(Schema),
}

impl From<Schema> for Idiomatic {
    fn from(s: Schema) -> Self {
        Idiomatic::Native(s)
    }
}

impl From<ObjectSchema> for Idiomatic {
    fn from(s: ObjectSchema) -> Self {
        Idiomatic::Native(Schema::Object(s))
    }
}

impl From<&str> for Idiomatic {
    fn from(s: &str) -> Self {
        Idiomatic::Literal(s.into())
    }
}

impl From<String> for Idiomatic {
    fn from(s: String) -> Self {
        Idiomatic::Literal(s.into())
    }
}

impl From<f64> for Idiomatic {
    fn from(n: f64) -> Self {
        Idiomatic::Literal(n.into())
    }
}

impl From<i64> for Idiomatic {
    fn from(n: i64) -> Self {
        Idiomatic::Literal(n.into())
    }
}

impl From<i32> for Idiomatic {
    fn from(n: i32) -> Self {
        Idiomatic::Literal(n.into())
    }
}

impl From<bool> for Idiomatic {
    fn from(b: bool) -> Self {
        Idiomatic::Literal(b.into())
    }
}

/// Normalize shorthand into a native schema. Native schemas pass through
/// untouched, so `schemify` is idempotent.
pub fn schemify(idiomatic: Idiomatic) -> Schema {
    match idiomatic {
        Idiomatic::Native(schema) => schema,
        Idiomatic::Literal(lit) => Schema::Literal(lit),
        Idiomatic::Object(fields) => Schema::Object(ObjectSchema {
            properties: fields
                .into_iter()
                .map(|(k, v)| (k, schemify(v)))
                .collect(),
            strict: false,
        }),
    }
}

/// Build an [`Idiomatic::Object`] from `key: value` pairs.
///
/// ```
/// use contractkit::schema::{number, string, optional};
/// let body = contractkit::shape! {
///     id: string(),
///     amount: number(),
///     "x-note": optional(string()),
///     kind: "invoice",
/// };
/// # let _ = body;
/// ```
#[macro_export]
macro_rules! shape {
    ($($key:tt : $value:expr),* $(,)?) => {
        $crate::schema::Idiomatic::Object(vec![
            $(($crate::__shape_key!($key).to_string(), $crate::schema::Idiomatic::from($value))),*
        ])
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __shape_key {
    ($key:ident) => {
        stringify!($key)
    };
    ($key:literal) => {
        $key
    };
}

pub fn string() -> Schema {
    Schema::String
}

pub fn number() -> Schema {
    Schema::Number
}

pub fn integer() -> Schema {
    Schema::Integer
}

pub fn bigint() -> Schema {
    Schema::BigInt
}

pub fn boolean() -> Schema {
    Schema::Boolean
}

pub fn date() -> Schema {
    Schema::Date
}

pub fn null() -> Schema {
    Schema::Null
}

pub fn any() -> Schema {
    Schema::Any
}

pub fn unknown() -> Schema {
    Schema::Unknown
}

pub fn literal(value: impl Into<Literal>) -> Schema {
    Schema::Literal(value.into())
}

pub fn enum_<I, L>(values: I) -> Schema
where
    I: IntoIterator<Item = L>,
    L: Into<Literal>,
{
    Schema::Enum(values.into_iter().map(Into::into).collect())
}

pub fn optional(inner: impl Into<Idiomatic>) -> Schema {
    schemify(inner.into()).optional()
}

pub fn array(items: impl Into<Idiomatic>) -> Schema {
    Schema::Array(Box::new(schemify(items.into())))
}

pub fn record(values: impl Into<Idiomatic>) -> Schema {
    Schema::Record(Box::new(schemify(values.into())))
}

pub fn promise(resolved: impl Into<Idiomatic>) -> Schema {
    Schema::Promise(Box::new(schemify(resolved.into())))
}

pub fn union<I, T>(members: I) -> Schema
where
    I: IntoIterator<Item = T>,
    T: Into<Idiomatic>,
{
    Schema::Union(members.into_iter().map(|m| schemify(m.into())).collect())
}

pub fn function_<I, T>(params: I, returns: impl Into<Idiomatic>) -> Schema
where
    I: IntoIterator<Item = T>,
    T: Into<Idiomatic>,
{
    Schema::Function {
        params: params.into_iter().map(|p| schemify(p.into())).collect(),
        returns: Box::new(schemify(returns.into())),
    }
}

pub fn object<I, K, V>(fields: I) -> Schema
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Idiomatic>,
{
    Schema::Object(ObjectSchema {
        properties: fields
            .into_iter()
            .map(|(k, v)| (k.into(), schemify(v.into())))
            .collect(),
        strict: false,
    })
}

/// One violated leaf: where, and what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Issue {
    pub path: Vec<String>,
    pub message: String,
}

impl Issue {
    pub fn new(path: &[String], message: impl Into<String>) -> Self {
        Self {
            path: path.to_vec(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.message)
        }
    }
}

/// The single channel for coercion success or failure.
pub type ParseResult = Result<Value, Vec<Issue>>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid schema: {0}")]
    Invalid(String),
    #[error("schema rejected by '{backend}' backend: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

/// Reusable checker produced by [`SchemaAdapter::compile`]. Shared across
/// requests, never mutated after construction.
pub trait CompiledSchema: Send + Sync + fmt::Debug {
    /// The schema this checker was compiled from.
    fn schema(&self) -> &Schema;

    /// Structural check, no coercion.
    fn validate(&self, value: &Value) -> bool;

    /// Coerce, then validate. Never panics on bad input.
    fn parse(&self, value: &Value) -> ParseResult;

    /// OpenAPI schema object, without internal annotations.
    fn openapi(&self) -> serde_json::Value {
        json_schema::openapi_projection(self.schema())
    }
}

/// Pluggable validation backend.
pub trait SchemaAdapter: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn schemify(&self, idiomatic: Idiomatic) -> Schema {
        schemify(idiomatic)
    }

    /// Build a checker; called once per contract section.
    fn compile(&self, schema: &Schema) -> Result<Arc<dyn CompiledSchema>, SchemaError>;

    fn validate(&self, schema: &Schema, value: &Value) -> Result<bool, SchemaError> {
        Ok(self.compile(schema)?.validate(value))
    }

    fn parse(&self, schema: &Schema, value: &Value) -> Result<ParseResult, SchemaError> {
        Ok(self.compile(schema)?.parse(value))
    }

    fn openapi(&self, schema: &Schema) -> serde_json::Value {
        json_schema::openapi_projection(schema)
    }
}

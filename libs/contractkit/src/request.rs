use std::sync::Arc;

use http::Method;

use crate::compiler::CompiledSchemaSet;
use crate::contract::ContractDescriptor;
use crate::value::{Map, Value};

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Per-request context created by the first pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: String,
    pub idempotency_key: Option<String>,
}

/// Authenticated caller, attached by the auth stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Transport-neutral request.
///
/// `params`, `query`, `headers` are objects; header names are lowercased.
/// After the parse stage these hold the coerced values.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub params: Value,
    pub query: Value,
    pub headers: Value,
    pub body: Value,
    pub context: Option<RequestContext>,
    pub contract: Option<Arc<ContractDescriptor>>,
    pub schemas: Option<Arc<CompiledSchemaSet>>,
    pub principal: Option<Principal>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Value::Object(Map::new()),
            query: Value::Object(Map::new()),
            headers: Value::Object(Map::new()),
            body: Value::Null,
            context: None,
            contract: None,
            schemas: None,
            principal: None,
        }
    }

    pub fn with_params(mut self, params: impl Into<Value>) -> Self {
        self.params = params.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<Value>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    /// Append a header; repeated names collect into an array.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = Value::String(value.into());
        if !matches!(self.headers, Value::Object(_)) {
            self.headers = Value::Object(Map::new());
        }
        if let Some(map) = self.headers.as_object_mut() {
            match map.remove(&name) {
                None => {
                    map.insert(name, value);
                }
                Some(Value::Array(mut values)) => {
                    values.push(value);
                    map.insert(name, Value::Array(values));
                }
                Some(existing) => {
                    map.insert(name, Value::Array(vec![existing, value]));
                }
            }
        }
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        match self.headers.get(&name.to_ascii_lowercase())? {
            Value::String(s) => Some(s.as_str()),
            Value::Array(values) => values.first().and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn query_value(&self, name: &str) -> Option<&Value> {
        self.query.get(name)
    }

    pub fn correlation_id(&self) -> &str {
        self.context
            .as_ref()
            .map(|c| c.correlation_id.as_str())
            .unwrap_or("unknown")
    }
}

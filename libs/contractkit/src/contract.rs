//! Contract descriptors: one declarative, immutable description per route.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{schemify, Idiomatic, Schema};

/// What happens when validation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Abort (requests) or log at error level (responses).
    #[default]
    Error,
    /// Log and carry on.
    Warning,
    /// Carry on silently.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractOptions {
    #[serde(default)]
    pub request_validation: ValidationMode,
    #[serde(default)]
    pub response_validation: ValidationMode,
}

/// Credential scheme expected in the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Jwt,
    Basic,
    Other { token_prefix: String },
}

impl AuthMethod {
    /// Header prefix including the trailing space, e.g. `"Bearer "`.
    pub fn scheme_prefix(&self) -> String {
        match self {
            AuthMethod::Jwt => "Bearer ".to_string(),
            AuthMethod::Basic => "Basic ".to_string(),
            AuthMethod::Other { token_prefix } => format!("{token_prefix} "),
        }
    }
}

/// Auth requirement of a route. Empty allow-lists mean "no constraint".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    pub method: AuthMethod,
    pub allowed_roles: Vec<String>,
    pub forbidden_roles: Vec<String>,
    pub allowed_slugs: Vec<String>,
    pub forbidden_slugs: Vec<String>,
}

impl AuthPolicy {
    pub fn new(method: AuthMethod) -> Self {
        Self {
            method,
            allowed_roles: Vec::new(),
            forbidden_roles: Vec::new(),
            allowed_slugs: Vec::new(),
            forbidden_slugs: Vec::new(),
        }
    }

    pub fn jwt() -> Self {
        Self::new(AuthMethod::Jwt)
    }

    pub fn basic() -> Self {
        Self::new(AuthMethod::Basic)
    }

    pub fn other(token_prefix: impl Into<String>) -> Self {
        Self::new(AuthMethod::Other {
            token_prefix: token_prefix.into(),
        })
    }

    pub fn allow_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn forbid_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn allow_slugs<I, S>(mut self, slugs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_slugs.extend(slugs.into_iter().map(Into::into));
        self
    }

    pub fn forbid_slugs<I, S>(mut self, slugs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_slugs.extend(slugs.into_iter().map(Into::into));
        self
    }
}

/// Declarative description of one route.
///
/// Sections left as `None` are not validated and do not appear in the merged
/// request schema. Built with the chained setters, then frozen in an `Arc`
/// when the route is registered.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractDescriptor {
    pub name: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub params: Option<Schema>,
    pub query: Option<Schema>,
    pub request_headers: Option<Schema>,
    pub response_headers: Option<Schema>,
    pub body: Option<Schema>,
    pub responses: BTreeMap<u16, Schema>,
    pub auth: Option<AuthPolicy>,
    pub options: ContractOptions,
}

impl ContractDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: None,
            description: None,
            params: None,
            query: None,
            request_headers: None,
            response_headers: None,
            body: None,
            responses: BTreeMap::new(),
            auth: None,
            options: ContractOptions::default(),
        }
    }

    pub fn summary(mut self, text: impl Into<String>) -> Self {
        self.summary = Some(text.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn params(mut self, schema: impl Into<Idiomatic>) -> Self {
        self.params = Some(schemify(schema.into()));
        self
    }

    pub fn query(mut self, schema: impl Into<Idiomatic>) -> Self {
        self.query = Some(schemify(schema.into()));
        self
    }

    /// Header names are matched lowercased; declared names are folded to
    /// lowercase here.
    pub fn request_headers(mut self, schema: impl Into<Idiomatic>) -> Self {
        self.request_headers = Some(lowercase_header_names(schemify(schema.into())));
        self
    }

    pub fn response_headers(mut self, schema: impl Into<Idiomatic>) -> Self {
        self.response_headers = Some(lowercase_header_names(schemify(schema.into())));
        self
    }

    pub fn body(mut self, schema: impl Into<Idiomatic>) -> Self {
        self.body = Some(schemify(schema.into()));
        self
    }

    /// Declare the payload shape for a status code; overrides the built-in
    /// error defaults for the same code.
    pub fn response(mut self, status: u16, schema: impl Into<Idiomatic>) -> Self {
        self.responses.insert(status, schemify(schema.into()));
        self
    }

    pub fn auth(mut self, policy: AuthPolicy) -> Self {
        self.auth = Some(policy);
        self
    }

    pub fn request_validation(mut self, mode: ValidationMode) -> Self {
        self.options.request_validation = mode;
        self
    }

    pub fn response_validation(mut self, mode: ValidationMode) -> Self {
        self.options.response_validation = mode;
        self
    }
}

fn lowercase_header_names(schema: Schema) -> Schema {
    match schema {
        Schema::Object(mut obj) => {
            for (name, _) in &mut obj.properties {
                *name = name.to_ascii_lowercase();
            }
            Schema::Object(obj)
        }
        Schema::Optional(inner) => Schema::Optional(Box::new(lowercase_header_names(*inner))),
        other => other,
    }
}

//! Route compiler: turns a [`ContractDescriptor`] into the compiled schemas
//! the pipeline runs against. Runs once per route, at registration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::contract::ContractDescriptor;
use crate::schema::{CompiledSchema, Idiomatic, ObjectSchema, Schema, SchemaAdapter, SchemaError};

/// Status codes every route can answer with, carrying a plain string body.
pub const DEFAULT_ERROR_STATUSES: [u16; 5] = [400, 401, 403, 404, 500];

#[derive(Clone)]
pub struct CompiledSchemaSet {
    /// Merged `{params?, headers?, query?, body?}` object.
    pub request: Arc<dyn CompiledSchema>,
    pub responses: BTreeMap<u16, Arc<dyn CompiledSchema>>,
    pub response_headers: Option<Arc<dyn CompiledSchema>>,
}

impl fmt::Debug for CompiledSchemaSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchemaSet")
            .field("request", &self.request.schema())
            .field("statuses", &self.responses.keys().collect::<Vec<_>>())
            .field("has_response_headers", &self.response_headers.is_some())
            .finish()
    }
}

impl CompiledSchemaSet {
    pub fn response_for(&self, status: u16) -> Option<&Arc<dyn CompiledSchema>> {
        self.responses.get(&status)
    }
}

/// Request schema built from the declared sections only.
pub fn request_schema(descriptor: &ContractDescriptor) -> Schema {
    let sections = [
        ("params", &descriptor.params),
        ("headers", &descriptor.request_headers),
        ("query", &descriptor.query),
        ("body", &descriptor.body),
    ];
    let mut merged = ObjectSchema::new();
    for (key, section) in sections {
        if let Some(schema) = section {
            merged = merged.field(key, schema.clone());
        }
    }
    Schema::Object(merged)
}

/// Default error responses overlaid by the declared ones (declared wins).
pub fn response_schemas(descriptor: &ContractDescriptor) -> BTreeMap<u16, Schema> {
    let mut out: BTreeMap<u16, Schema> = DEFAULT_ERROR_STATUSES
        .iter()
        .map(|status| (*status, Schema::String))
        .collect();
    for (status, schema) in &descriptor.responses {
        out.insert(*status, schema.clone());
    }
    out
}

pub fn compile_contract(
    adapter: &dyn SchemaAdapter,
    descriptor: &ContractDescriptor,
) -> Result<CompiledSchemaSet, SchemaError> {
    let request_schema = adapter.schemify(Idiomatic::Native(request_schema(descriptor)));
    let request = adapter.compile(&request_schema)?;

    let mut responses = BTreeMap::new();
    for (status, schema) in response_schemas(descriptor) {
        let schema = adapter.schemify(Idiomatic::Native(schema));
        responses.insert(status, adapter.compile(&schema)?);
    }

    let response_headers = descriptor
        .response_headers
        .as_ref()
        .map(|schema| adapter.compile(schema))
        .transpose()?;

    tracing::debug!(
        contract = %descriptor.name,
        adapter = adapter.name(),
        statuses = responses.len(),
        "Compiled contract schemas"
    );

    Ok(CompiledSchemaSet {
        request,
        responses,
        response_headers,
    })
}

//! OpenAPI projection of registered routes.

use std::collections::BTreeSet;
use std::sync::Arc;

use http::{Method, StatusCode};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use utoipa::openapi::{
    content::ContentBuilder,
    header::Header,
    info::InfoBuilder,
    path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder, PathsBuilder},
    request_body::RequestBodyBuilder,
    response::{ResponseBuilder, ResponsesBuilder},
    schema::{
        AdditionalProperties, AnyOfBuilder, ArrayBuilder, ComponentsBuilder, KnownFormat,
        ObjectBuilder, OneOfBuilder, Schema, SchemaFormat, SchemaType, Type,
    },
    security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityRequirement, SecurityScheme},
    tag::TagBuilder,
    OpenApi, OpenApiBuilder, RefOr, Required,
};

use crate::contract::{AuthMethod, ContractDescriptor};
use crate::registry::{path_param_names, Route};
use crate::schema::json_schema::openapi_projection;
use crate::schema::Schema as ContractSchema;

const JSON: &str = "application/json";

/// Document-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiInfo {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
}

impl Default for ApiInfo {
    fn default() -> Self {
        Self {
            title: "Contract API".to_string(),
            version: "0.1.0".to_string(),
            description: None,
        }
    }
}

/// Build the document for `routes`, in registration order.
pub fn generate(routes: &[Arc<Route>], info: &ApiInfo) -> OpenApi {
    tracing::info!("Building OpenAPI: found {} registered routes", routes.len());

    let mut paths = PathsBuilder::new();
    let mut tags = BTreeSet::new();
    let mut schemes = BTreeSet::new();

    for route in routes {
        let Some(method) = http_method(&route.method) else {
            tracing::warn!(
                method = %route.method,
                path = %route.full_path(),
                "Method has no OpenAPI counterpart; skipping"
            );
            continue;
        };
        let descriptor = &route.descriptor;
        let tag = route.base_path.clone();
        tags.insert(tag.clone());

        let mut op = OperationBuilder::new()
            .operation_id(Some(descriptor.name.clone()))
            .summary(descriptor.summary.clone())
            .description(descriptor.description.clone())
            .tag(tag);

        let declared = section_fields(descriptor.params.as_ref());
        for name in path_param_names(&route.full_path()) {
            if !declared.iter().any(|(n, _, _)| *n == name) {
                op = op.parameter(parameter(&name, ParameterIn::Path, true, &ContractSchema::String));
            }
        }
        for (name, schema, _) in declared {
            op = op.parameter(parameter(&name, ParameterIn::Path, true, &schema));
        }
        for (name, schema, required) in section_fields(descriptor.query.as_ref()) {
            op = op.parameter(parameter(&name, ParameterIn::Query, required, &schema));
        }
        for (name, schema, required) in section_fields(descriptor.request_headers.as_ref()) {
            op = op.parameter(parameter(&name, ParameterIn::Header, required, &schema));
        }

        if let Some(body) = &descriptor.body {
            let content = ContentBuilder::new()
                .schema(Some(schema_from_json(&openapi_projection(body))))
                .build();
            let mut rb = RequestBodyBuilder::new().content(JSON, content);
            if !body.is_optional() {
                rb = rb.required(Some(Required::True));
            }
            op = op.request_body(Some(rb.build()));
        }

        let mut responses = ResponsesBuilder::new();
        for (status, compiled) in &route.schemas.responses {
            let description = StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Response");
            let content = ContentBuilder::new()
                .schema(Some(schema_from_json(&compiled.openapi())))
                .build();
            let mut response = ResponseBuilder::new()
                .description(description)
                .content(JSON, content);
            if descriptor.responses.contains_key(status) {
                for (name, schema, _) in section_fields(descriptor.response_headers.as_ref()) {
                    response = response
                        .header(name, Header::new(schema_from_json(&openapi_projection(&schema))));
                }
            }
            responses = responses.response(status.to_string(), response.build());
        }
        op = op.responses(responses.build());

        if let Some(scheme) = security_scheme_name(descriptor) {
            schemes.insert(scheme);
            op = op.security(SecurityRequirement::new(scheme, Vec::<String>::new()));
        }

        let item = PathItemBuilder::new().operation(method, op.build()).build();
        paths = paths.path(route.openapi_path(), item);
    }

    let mut components = ComponentsBuilder::new();
    for scheme in &schemes {
        components = components.security_scheme(*scheme, security_scheme(scheme));
    }

    let info = InfoBuilder::new()
        .title(info.title.clone())
        .version(info.version.clone())
        .description(info.description.clone())
        .build();

    OpenApiBuilder::new()
        .info(info)
        .paths(paths.build())
        .components(Some(components.build()))
        .tags(Some(
            tags.into_iter()
                .map(|name| TagBuilder::new().name(name).build())
                .collect::<Vec<_>>(),
        ))
        .build()
}

/// SHA-256 hex digest of the serialized document.
pub fn document_hash(doc: &OpenApi) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(doc)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn http_method(method: &Method) -> Option<HttpMethod> {
    Some(match *method {
        Method::GET => HttpMethod::Get,
        Method::POST => HttpMethod::Post,
        Method::PUT => HttpMethod::Put,
        Method::PATCH => HttpMethod::Patch,
        Method::DELETE => HttpMethod::Delete,
        Method::HEAD => HttpMethod::Head,
        Method::OPTIONS => HttpMethod::Options,
        Method::TRACE => HttpMethod::Trace,
        _ => return None,
    })
}

/// `(name, schema, required)` for each field of an object section.
fn section_fields(section: Option<&ContractSchema>) -> Vec<(String, ContractSchema, bool)> {
    section
        .and_then(ContractSchema::as_object)
        .map(|obj| {
            obj.properties
                .iter()
                .map(|(name, schema)| (name.clone(), schema.clone(), !schema.is_optional()))
                .collect()
        })
        .unwrap_or_default()
}

fn parameter(
    name: &str,
    location: ParameterIn,
    required: bool,
    schema: &ContractSchema,
) -> utoipa::openapi::path::Parameter {
    // Parameters are optional by presence, so project the inner type.
    let schema = match schema {
        ContractSchema::Optional(inner) => inner.as_ref(),
        other => other,
    };
    ParameterBuilder::new()
        .name(name)
        .parameter_in(location)
        .required(if required { Required::True } else { Required::False })
        .schema(Some(schema_from_json(&openapi_projection(schema))))
        .build()
}

fn security_scheme_name(descriptor: &ContractDescriptor) -> Option<&'static str> {
    descriptor.auth.as_ref().map(|auth| match auth.method {
        AuthMethod::Jwt => "bearer",
        AuthMethod::Basic => "basic",
        AuthMethod::Other { .. } => "apiKey",
    })
}

fn security_scheme(name: &str) -> SecurityScheme {
    match name {
        "bearer" => SecurityScheme::Http(
            HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .build(),
        ),
        "basic" => SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Basic).build()),
        _ => SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("Authorization"))),
    }
}

/// Convert a projected JSON Schema object into utoipa's model.
pub fn schema_from_json(json: &Json) -> RefOr<Schema> {
    let Json::Object(map) = json else {
        return RefOr::T(Schema::Object(ObjectBuilder::new().build()));
    };

    if let Some(members) = map.get("anyOf").and_then(Json::as_array) {
        let mut any = AnyOfBuilder::new();
        for member in members {
            any = any.item(schema_from_json(member));
        }
        return RefOr::T(Schema::AnyOf(any.build()));
    }
    if let Some(members) = map.get("oneOf").and_then(Json::as_array) {
        let mut one = OneOfBuilder::new();
        for member in members {
            one = one.item(schema_from_json(member));
        }
        return RefOr::T(Schema::OneOf(one.build()));
    }

    let ty = map.get("type").and_then(Json::as_str);
    if ty == Some("array") {
        let items = map
            .get("items")
            .map(schema_from_json)
            .unwrap_or_else(|| RefOr::T(Schema::Object(ObjectBuilder::new().build())));
        return RefOr::T(Schema::Array(ArrayBuilder::new().items(items).build()));
    }

    let schema_type = match ty {
        Some("object") => SchemaType::Type(Type::Object),
        Some("string") => SchemaType::Type(Type::String),
        Some("integer") => SchemaType::Type(Type::Integer),
        Some("number") => SchemaType::Type(Type::Number),
        Some("boolean") => SchemaType::Type(Type::Boolean),
        Some("null") => SchemaType::Type(Type::Null),
        _ => SchemaType::AnyValue,
    };
    let mut obj = ObjectBuilder::new().schema_type(schema_type);

    match map.get("format").and_then(Json::as_str) {
        Some("date-time") => obj = obj.format(Some(SchemaFormat::KnownFormat(KnownFormat::DateTime))),
        Some("int64") => obj = obj.format(Some(SchemaFormat::KnownFormat(KnownFormat::Int64))),
        Some(other) => obj = obj.format(Some(SchemaFormat::Custom(other.to_string()))),
        None => {}
    }
    if let Some(values) = map.get("enum").and_then(Json::as_array) {
        obj = obj.enum_values(Some(values.clone()));
    }
    if let Some(props) = map.get("properties").and_then(Json::as_object) {
        for (name, prop) in props {
            obj = obj.property(name.clone(), schema_from_json(prop));
        }
    }
    if let Some(required) = map.get("required").and_then(Json::as_array) {
        for name in required.iter().filter_map(Json::as_str) {
            obj = obj.required(name);
        }
    }
    match map.get("additionalProperties") {
        Some(Json::Bool(allowed)) => {
            obj = obj.additional_properties(Some(AdditionalProperties::<Schema>::FreeForm(*allowed)));
        }
        Some(inner @ Json::Object(_)) => {
            obj = obj.additional_properties(Some(AdditionalProperties::from(schema_from_json(inner))));
        }
        _ => {}
    }
    if map.contains_key("not") {
        obj = obj.description(Some("callable; has no serialized form"));
    }
    RefOr::T(Schema::Object(obj.build()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::AuthPolicy;
    use crate::pipeline::{handler_fn, Reply, StaticAuthStrategy};
    use crate::registry::RouterRegistry;
    use crate::request::Request;
    use crate::router::ContractRouter;
    use crate::schema::{date, number, optional, string, NativeAdapter};
    use serde_json::json;

    fn ok() -> impl crate::pipeline::Handler {
        handler_fn(|_req: Request| async { Ok(Reply::empty(204)) })
    }

    fn doc() -> serde_json::Value {
        let router = ContractRouter::new("/billing", Arc::new(NativeAdapter), RouterRegistry::new())
            .with_auth_strategy(Arc::new(StaticAuthStrategy::new()));
        router
            .post("/:id/success")
            .contract(
                ContractDescriptor::new("markPaid")
                    .summary("Mark an invoice paid")
                    .params(crate::shape! { id: string() })
                    .query(crate::shape! { notify: optional(string()), channel: string() })
                    .request_headers(crate::shape! { "x-tenant": string() })
                    .body(crate::shape! { paid_at: date() })
                    .response(200, crate::shape! { id: string(), amount: number() })
                    .response_headers(crate::shape! { "x-ledger-version": string() })
                    .auth(AuthPolicy::jwt()),
            )
            .handler(ok())
            .register()
            .unwrap();
        let doc = generate(&router.routes(), &ApiInfo::default());
        serde_json::to_value(&doc).unwrap()
    }

    #[test]
    fn path_is_templated_with_path_parameter() {
        let v = doc();
        let op = v.pointer("/paths/~1billing~1{id}~1success/post").expect("operation");
        let params = op["parameters"].as_array().unwrap();
        let id = params.iter().find(|p| p["name"] == "id").unwrap();
        assert_eq!(id["in"], "path");
        assert_eq!(id["required"], true);
        assert_eq!(op["operationId"], "markPaid");
        assert_eq!(op["tags"], json!(["/billing"]));
    }

    #[test]
    fn undeclared_path_segments_still_get_parameters() {
        let router = ContractRouter::new("/billing", Arc::new(NativeAdapter), RouterRegistry::new());
        router
            .get("/:id/events")
            .contract(ContractDescriptor::new("invoiceEvents"))
            .handler(ok())
            .register()
            .unwrap();
        let v = serde_json::to_value(generate(&router.routes(), &ApiInfo::default())).unwrap();
        let params = v
            .pointer("/paths/~1billing~1{id}~1events/get/parameters")
            .and_then(|p| p.as_array())
            .expect("parameters");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0]["name"], "id");
        assert_eq!(params[0]["in"], "path");
        assert_eq!(params[0]["required"], true);
        assert_eq!(params[0]["schema"]["type"], "string");
    }

    #[test]
    fn query_required_unless_optional_and_headers_listed() {
        let v = doc();
        let params = v
            .pointer("/paths/~1billing~1{id}~1success/post/parameters")
            .and_then(|p| p.as_array())
            .unwrap()
            .clone();
        let by_name = |n: &str| params.iter().find(|p| p["name"] == n).cloned().unwrap();
        assert_eq!(by_name("notify")["required"], false);
        assert_eq!(by_name("channel")["required"], true);
        assert_eq!(by_name("x-tenant")["in"], "header");
    }

    #[test]
    fn implicit_error_statuses_and_security_are_present() {
        let v = doc();
        let op = v.pointer("/paths/~1billing~1{id}~1success/post").unwrap();
        for status in ["200", "400", "401", "403", "404", "500"] {
            assert!(op["responses"].get(status).is_some(), "missing {status}");
        }
        assert_eq!(op["security"], json!([{"bearer": []}]));
        assert!(v.pointer("/components/securitySchemes/bearer").is_some());
        assert!(op
            .pointer("/responses/200/headers/x-ledger-version")
            .is_some());
        assert_eq!(
            op.pointer("/requestBody/content/application~1json/schema/properties/paid_at/format"),
            Some(&json!("date-time"))
        );
    }

    #[test]
    fn published_document_has_no_internal_annotations() {
        let text = doc().to_string();
        assert!(!text.contains("errorType"));
    }

    #[test]
    fn hash_is_stable_hex() {
        let d = generate(&[], &ApiInfo::default());
        let a = document_hash(&d).unwrap();
        let b = document_hash(&d).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}

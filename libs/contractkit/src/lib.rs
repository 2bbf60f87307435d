//! # ContractKit - contract-driven routing and validation
//!
//! One declarative [`ContractDescriptor`] per route drives everything else:
//! request coercion and validation, advisory response validation, the
//! OpenAPI document and typed bindings.
//!
//! ## Golden Path
//!
//! ```rust,ignore
//! use contractkit::schema::{number, string, NativeAdapter};
//! use contractkit::{handler_fn, shape, ContractDescriptor, ContractRouter, Reply, RouterRegistry};
//! use std::sync::Arc;
//!
//! let registry = RouterRegistry::new();
//! let billing = ContractRouter::new("/billing", Arc::new(NativeAdapter), registry.clone());
//!
//! billing
//!     .get("/:id")
//!     .contract(
//!         ContractDescriptor::new("getInvoice")
//!             .params(shape! { id: string() })
//!             .response(200, shape! { id: string(), amount: number() }),
//!     )
//!     .handler(handler_fn(|req| async move {
//!         Ok(Reply::send(200, req.params))
//!     }))
//!     .register()?;
//!
//! // Same chain, no transport:
//! let out = billing.sdk().call("getInvoice", LocalRequest::new().param("id", "inv-1")).await?;
//! ```
//!
//! The same registry is mounted over HTTP by the `api_ingress` module.

pub use async_trait::async_trait;

// Values and schemas
pub mod schema;
pub mod value;
pub use schema::{CompiledSchema, Idiomatic, Issue, ParseResult, Schema, SchemaAdapter, SchemaError};
pub use value::Value;

// Contracts and their compilation
pub mod compiler;
pub mod contract;
pub use compiler::{compile_contract, CompiledSchemaSet};
pub use contract::{AuthMethod, AuthPolicy, ContractDescriptor, ContractOptions, ValidationMode};

// Request/response pipeline
pub mod error;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod telemetry;
pub use error::{
    AuthorizationError, HandlerError, RegistrationError, RequestValidationError,
    ResponseValidationError, RouteError,
};
pub use pipeline::{
    handler_fn, AuthStrategy, CorsPolicy, Handler, Middleware, Next, Reply, ResponseCheck,
};
pub use request::{Principal, Request, RequestContext};
pub use response::{Response, StreamEvent};
pub use telemetry::{LogLevel, MemoryTelemetry, Telemetry, TracingTelemetry};

// Routing
pub mod registry;
pub mod route_builder;
pub mod router;
pub use registry::{Route, RouterRegistry};
pub use route_builder::RouteBuilder;
pub use router::ContractRouter;

// Consumers of the registry
pub mod codegen;
pub mod local;
pub mod openapi;
pub use local::{invoke, LocalRequest, LocalResponse, SdkClient, SdkError};
pub use openapi::ApiInfo;

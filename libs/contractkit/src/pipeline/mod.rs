//! Ordered, short-circuiting middleware chain.
//!
//! Every route runs the same stage order:
//! context → CORS → enrichment → auth (if declared) → parse → user stages → handler.
//! Once the response has been handed off, the recorded payload is checked
//! against the contract without ever changing what was produced.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::compiler::CompiledSchemaSet;
use crate::contract::{ContractDescriptor, ValidationMode};
use crate::error::{ResponseValidationError, RouteError};
use crate::request::Request;
use crate::response::Response;
use crate::telemetry::{LogLevel, Telemetry};
use crate::value::Value;

mod auth;
mod cors;
mod handler;
mod stages;

pub use auth::{AuthStrategy, StaticAuthStrategy, StaticIdentity, Subject};
pub use cors::CorsPolicy;
pub use handler::{handler_fn, FnHandler, Handler, Reply};
pub use stages::{AuthStage, ContextStage, CorsStage, EnrichStage, HandlerStage, ParseStage};

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Run this stage. Call `next.run(req, res)` to continue the chain;
    /// returning without calling it halts the chain.
    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: Next<'_>,
    ) -> Result<(), RouteError>;
}

/// Remaining stages of the chain.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub fn new(stages: &'a [Arc<dyn Middleware>]) -> Self {
        Self { rest: stages }
    }

    pub async fn run(self, req: &mut Request, res: &mut Response) -> Result<(), RouteError> {
        match self.rest.split_first() {
            Some((stage, rest)) => stage.handle(req, res, Next { rest }).await,
            None => Ok(()),
        }
    }
}

/// Compiled chain for one route.
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
    /// Stages run for OPTIONS requests the route does not declare itself.
    options_stages: Vec<Arc<dyn Middleware>>,
    descriptor: Arc<ContractDescriptor>,
    schemas: Arc<CompiledSchemaSet>,
    telemetry: Arc<dyn Telemetry>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("contract", &self.descriptor.name)
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        stages: Vec<Arc<dyn Middleware>>,
        descriptor: Arc<ContractDescriptor>,
        schemas: Arc<CompiledSchemaSet>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            stages,
            options_stages: Vec::new(),
            descriptor,
            schemas,
            telemetry,
        }
    }

    pub fn telemetry(&self) -> Arc<dyn Telemetry> {
        self.telemetry.clone()
    }

    pub fn with_options_stages(mut self, stages: Vec<Arc<dyn Middleware>>) -> Self {
        self.options_stages = stages;
        self
    }

    /// Answer an OPTIONS request without reaching auth, parsing or the
    /// handler. CORS preflights get the CORS answer, anything else a 204.
    pub async fn answer_options(&self, req: &mut Request, res: &mut Response) {
        if let Err(err) = Next::new(&self.options_stages).run(req, res).await {
            self.settle_error(req, res, &err);
        }
        if !res.is_sent() {
            res.status(204).end();
        }
    }

    /// Fresh response wrapper wired to this pipeline's telemetry.
    pub fn response(&self) -> Response {
        Response::new(self.telemetry.clone())
    }

    /// Run the chain and settle errors. The returned check inspects the
    /// recorded response against the contract; run it once the response has
    /// been handed to the caller.
    pub async fn execute(&self, req: &mut Request, res: &mut Response) -> ResponseCheck {
        let outcome = Next::new(&self.stages).run(req, res).await;

        if let Err(err) = outcome {
            self.settle_error(req, res, &err);
        } else if !res.is_sent() {
            self.telemetry.log(
                LogLevel::Error,
                "handler chain completed without sending a response",
                &json!({ "contract": self.descriptor.name, "correlation_id": req.correlation_id() }),
            );
            res.status(500)
                .send(format!("Internal Server Error (correlation id: {})", req.correlation_id()));
        }

        self.response_check(req, res)
    }

    fn settle_error(&self, req: &Request, res: &mut Response, err: &RouteError) {
        let level = match err {
            RouteError::Handler(_) => LogLevel::Error,
            _ => LogLevel::Warn,
        };
        let issues = match err {
            RouteError::RequestValidation(e) => json!(e.issues),
            _ => json!([]),
        };
        self.telemetry.log(
            level,
            &format!("{} aborted: {err:#}", self.descriptor.name),
            &json!({
                "contract": self.descriptor.name,
                "correlation_id": req.correlation_id(),
                "status": err.status(),
                "issues": issues,
            }),
        );
        self.telemetry.record_metric(
            "contract.request.aborted",
            &[
                ("contract", self.descriptor.name.clone()),
                ("status", err.status().to_string()),
            ],
        );
        if !res.is_sent() {
            res.status(err.status())
                .send(err.public_message(req.correlation_id()));
        }
    }

    fn response_check(&self, req: &Request, res: &Response) -> ResponseCheck {
        let mode = self.descriptor.options.response_validation;
        let recorded = (mode != ValidationMode::None && !res.is_streaming()).then(|| Recorded {
            correlation_id: req.correlation_id().to_string(),
            status: res.status_code(),
            body: res.body().cloned(),
            headers: res.get_headers(),
        });
        ResponseCheck {
            descriptor: self.descriptor.clone(),
            schemas: self.schemas.clone(),
            telemetry: self.telemetry.clone(),
            recorded,
        }
    }
}

struct Recorded {
    correlation_id: String,
    status: u16,
    body: Option<Value>,
    headers: Value,
}

/// Advisory check of a recorded payload and header set. Never alters what
/// was produced.
#[must_use = "the response check only logs when run"]
pub struct ResponseCheck {
    descriptor: Arc<ContractDescriptor>,
    schemas: Arc<CompiledSchemaSet>,
    telemetry: Arc<dyn Telemetry>,
    recorded: Option<Recorded>,
}

impl ResponseCheck {
    pub fn run(self) {
        let Some(recorded) = self.recorded else {
            return;
        };
        let mode = self.descriptor.options.response_validation;
        let status = recorded.status;
        let mut failures = Vec::new();

        if let Some(body) = &recorded.body {
            match self.schemas.response_for(status) {
                Some(schema) => {
                    if let Err(issues) = schema.parse(body) {
                        failures.push(ResponseValidationError { status, issues });
                    }
                }
                None => self.telemetry.log(
                    LogLevel::Debug,
                    "no response schema declared for status",
                    &json!({ "contract": self.descriptor.name, "status": status }),
                ),
            }
        }

        if let Some(schema) = &self.schemas.response_headers {
            if let Err(issues) = schema.parse(&recorded.headers) {
                failures.push(ResponseValidationError { status, issues });
            }
        }

        for failure in failures {
            let level = if mode == ValidationMode::Error {
                LogLevel::Error
            } else {
                LogLevel::Warn
            };
            self.telemetry.log(
                level,
                &format!("{}: {failure}", self.descriptor.name),
                &json!({
                    "contract": self.descriptor.name,
                    "correlation_id": recorded.correlation_id,
                    "status": failure.status,
                    "issues": failure.issues,
                }),
            );
            self.telemetry.record_metric(
                "contract.response.invalid",
                &[
                    ("contract", self.descriptor.name.clone()),
                    ("status", failure.status.to_string()),
                ],
            );
        }
    }
}

/// Values the parse stage writes back into the request.
pub(crate) fn request_input(req: &Request) -> Value {
    Value::object([
        ("params", req.params.clone()),
        ("headers", req.headers.clone()),
        ("query", req.query.clone()),
        ("body", req.body.clone()),
    ])
}

//! Built-in pipeline stages.

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use serde_json::json;
use uuid::Uuid;

use super::{request_input, AuthStrategy, CorsPolicy, Handler, Middleware, Next};
use crate::compiler::CompiledSchemaSet;
use crate::contract::{AuthPolicy, ContractDescriptor, ValidationMode};
use crate::error::{AuthorizationError, RequestValidationError, RouteError};
use crate::request::{Principal, Request, RequestContext, CORRELATION_HEADER, IDEMPOTENCY_HEADER};
use crate::response::Response;
use crate::telemetry::{LogLevel, Telemetry};

/// Establishes the request context: correlation id (propagated or fresh)
/// and the idempotency key, if any.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextStage;

#[async_trait]
impl Middleware for ContextStage {
    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: Next<'_>,
    ) -> Result<(), RouteError> {
        let correlation_id = req
            .header(CORRELATION_HEADER)
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let idempotency_key = req.header(IDEMPOTENCY_HEADER).map(str::to_string);

        res.set_header(CORRELATION_HEADER, correlation_id.as_str());
        req.context = Some(RequestContext {
            correlation_id,
            idempotency_key,
        });
        next.run(req, res).await
    }
}

#[derive(Debug, Clone)]
pub struct CorsStage {
    policy: Arc<CorsPolicy>,
}

impl CorsStage {
    pub fn new(policy: Arc<CorsPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Middleware for CorsStage {
    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: Next<'_>,
    ) -> Result<(), RouteError> {
        let origin = req.header("origin").map(str::to_string);
        if let Some(allowed) = self.policy.allow_origin(origin.as_deref()) {
            if allowed != "*" {
                res.set_header("vary", "origin");
            }
            res.set_header("access-control-allow-origin", allowed);
            if self.policy.allow_credentials {
                res.set_header("access-control-allow-credentials", "true");
            }
            if !self.policy.exposed_headers.is_empty() {
                res.set_header(
                    "access-control-expose-headers",
                    self.policy.exposed_headers.join(", "),
                );
            }
        }

        let preflight =
            req.method == Method::OPTIONS && req.header("access-control-request-method").is_some();
        if preflight {
            res.set_header("access-control-allow-methods", self.policy.methods_header());
            res.set_header(
                "access-control-allow-headers",
                self.policy
                    .headers_header(req.header("access-control-request-headers")),
            );
            if let Some(max_age) = self.policy.max_age_secs {
                res.set_header("access-control-max-age", max_age.to_string());
            }
            res.status(204).end();
            return Ok(());
        }

        next.run(req, res).await
    }
}

/// Attaches the contract and its compiled schemas to the request.
#[derive(Debug, Clone)]
pub struct EnrichStage {
    descriptor: Arc<ContractDescriptor>,
    schemas: Arc<CompiledSchemaSet>,
}

impl EnrichStage {
    pub fn new(descriptor: Arc<ContractDescriptor>, schemas: Arc<CompiledSchemaSet>) -> Self {
        Self {
            descriptor,
            schemas,
        }
    }
}

#[async_trait]
impl Middleware for EnrichStage {
    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: Next<'_>,
    ) -> Result<(), RouteError> {
        req.contract = Some(self.descriptor.clone());
        req.schemas = Some(self.schemas.clone());
        next.run(req, res).await
    }
}

/// Verifies the `Authorization` header against the route policy.
pub struct AuthStage {
    policy: AuthPolicy,
    strategy: Arc<dyn AuthStrategy>,
}

impl AuthStage {
    pub fn new(policy: AuthPolicy, strategy: Arc<dyn AuthStrategy>) -> Self {
        Self { policy, strategy }
    }

    fn authorize(&self, roles: &[String], permissions: &[String]) -> Result<(), AuthorizationError> {
        let p = &self.policy;
        if !p.allowed_roles.is_empty() && !roles.iter().any(|r| p.allowed_roles.contains(r)) {
            return Err(AuthorizationError::Forbidden("no allowed role".into()));
        }
        if let Some(role) = roles.iter().find(|r| p.forbidden_roles.contains(r)) {
            return Err(AuthorizationError::Forbidden(format!("role '{role}' is forbidden")));
        }
        if !p.allowed_slugs.is_empty()
            && !permissions.iter().any(|s| p.allowed_slugs.contains(s))
        {
            return Err(AuthorizationError::Forbidden("no allowed permission".into()));
        }
        if let Some(slug) = permissions.iter().find(|s| p.forbidden_slugs.contains(s)) {
            return Err(AuthorizationError::Forbidden(format!(
                "permission '{slug}' is forbidden"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware for AuthStage {
    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: Next<'_>,
    ) -> Result<(), RouteError> {
        let header = req
            .header("authorization")
            .filter(|h| !h.trim().is_empty())
            .ok_or(AuthorizationError::MissingCredentials)?;

        let prefix = self.policy.method.scheme_prefix();
        let credential = match header.get(..prefix.len()) {
            Some(head) if head.eq_ignore_ascii_case(&prefix) => header[prefix.len()..].to_string(),
            _ => {
                return Err(AuthorizationError::SchemeMismatch {
                    expected: prefix.trim_end().to_string(),
                }
                .into())
            }
        };

        let subject = self
            .strategy
            .authenticate(&self.policy.method, &credential)
            .await?;
        let roles = self.strategy.map_roles(&subject);
        let permissions = self.strategy.map_permissions(&subject);
        self.authorize(&roles, &permissions)?;

        tracing::debug!(subject = %subject.id, roles = ?roles, "Request authorized");
        req.principal = Some(Principal {
            subject: subject.id,
            roles,
            permissions,
        });
        next.run(req, res).await
    }
}

/// Coerces and validates the merged request against the contract.
#[derive(Debug)]
pub struct ParseStage {
    contract: String,
    schemas: Arc<CompiledSchemaSet>,
    mode: ValidationMode,
    telemetry: Arc<dyn Telemetry>,
}

impl ParseStage {
    pub fn new(
        descriptor: &ContractDescriptor,
        schemas: Arc<CompiledSchemaSet>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            contract: descriptor.name.clone(),
            schemas,
            mode: descriptor.options.request_validation,
            telemetry,
        }
    }
}

#[async_trait]
impl Middleware for ParseStage {
    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: Next<'_>,
    ) -> Result<(), RouteError> {
        match self.schemas.request.parse(&request_input(req)) {
            Ok(parsed) => {
                let take = |key: &str, slot: &mut crate::value::Value| {
                    if let Some(v) = parsed.get(key) {
                        *slot = v.clone();
                    }
                };
                take("params", &mut req.params);
                take("headers", &mut req.headers);
                take("query", &mut req.query);
                take("body", &mut req.body);
            }
            Err(issues) => match self.mode {
                ValidationMode::Error => {
                    return Err(RequestValidationError { issues }.into());
                }
                ValidationMode::Warning => {
                    self.telemetry.log(
                        LogLevel::Warn,
                        &format!("{}: request validation failed", self.contract),
                        &json!({
                            "contract": self.contract,
                            "correlation_id": req.correlation_id(),
                            "issues": issues,
                        }),
                    );
                    self.telemetry.record_metric(
                        "contract.request.invalid",
                        &[("contract", self.contract.clone())],
                    );
                }
                ValidationMode::None => {}
            },
        }
        next.run(req, res).await
    }
}

/// Runs the route handler; always the last stage.
pub struct HandlerStage {
    handler: Arc<dyn Handler>,
}

impl HandlerStage {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Middleware for HandlerStage {
    async fn handle(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: Next<'_>,
    ) -> Result<(), RouteError> {
        self.handler.call(req, res).await?;
        next.run(req, res).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{StaticAuthStrategy, StaticIdentity};

    #[tokio::test]
    async fn context_propagates_incoming_correlation_id() {
        let stages: Vec<Arc<dyn Middleware>> = vec![Arc::new(ContextStage)];
        let mut req = Request::new(Method::GET, "/").with_header("X-Correlation-Id", "corr-1");
        let mut res = Response::default();
        Next::new(&stages).run(&mut req, &mut res).await.unwrap();
        assert_eq!(req.correlation_id(), "corr-1");
        assert_eq!(res.header("x-correlation-id"), Some("corr-1"));
    }

    #[tokio::test]
    async fn context_generates_uuid_when_absent() {
        let stages: Vec<Arc<dyn Middleware>> = vec![Arc::new(ContextStage)];
        let mut req = Request::new(Method::GET, "/").with_header("idempotency-key", "k1");
        let mut res = Response::default();
        Next::new(&stages).run(&mut req, &mut res).await.unwrap();
        assert!(Uuid::parse_str(req.correlation_id()).is_ok());
        assert_eq!(
            req.context.as_ref().and_then(|c| c.idempotency_key.as_deref()),
            Some("k1")
        );
    }

    #[tokio::test]
    async fn preflight_is_answered_and_halts() {
        let policy = Arc::new(CorsPolicy::default());
        let stages: Vec<Arc<dyn Middleware>> = vec![Arc::new(CorsStage::new(policy))];
        let mut req = Request::new(Method::OPTIONS, "/")
            .with_header("origin", "https://a.example")
            .with_header("access-control-request-method", "POST");
        let mut res = Response::default();
        Next::new(&stages).run(&mut req, &mut res).await.unwrap();
        assert_eq!(res.status_code(), 204);
        assert!(res.is_sent());
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert!(res.header("access-control-allow-methods").is_some());
    }

    fn auth_stage(policy: AuthPolicy) -> Arc<dyn Middleware> {
        let strategy = StaticAuthStrategy::new().with_identity(
            "tok",
            StaticIdentity {
                subject: "alice".into(),
                roles: vec!["clerk".into()],
                permissions: vec!["billing.read".into()],
            },
        );
        Arc::new(AuthStage::new(policy, Arc::new(strategy)))
    }

    async fn run_auth(policy: AuthPolicy, header: Option<&str>) -> Result<Request, RouteError> {
        let stages: Vec<Arc<dyn Middleware>> = vec![auth_stage(policy)];
        let mut req = Request::new(Method::GET, "/");
        if let Some(h) = header {
            req.add_header("authorization", h);
        }
        let mut res = Response::default();
        Next::new(&stages).run(&mut req, &mut res).await?;
        Ok(req)
    }

    #[tokio::test]
    async fn auth_accepts_matching_credential_and_sets_principal() {
        let req = run_auth(AuthPolicy::jwt().allow_roles(["clerk"]), Some("Bearer tok"))
            .await
            .unwrap();
        let principal = req.principal.unwrap();
        assert_eq!(principal.subject, "alice");
        assert_eq!(principal.permissions, vec!["billing.read"]);
    }

    #[tokio::test]
    async fn auth_failures_map_to_401_and_403() {
        let missing = run_auth(AuthPolicy::jwt(), None).await.unwrap_err();
        assert_eq!(missing.status(), 401);
        let scheme = run_auth(AuthPolicy::jwt(), Some("Basic tok")).await.unwrap_err();
        assert_eq!(scheme.status(), 401);
        let role = run_auth(AuthPolicy::jwt().allow_roles(["admin"]), Some("Bearer tok"))
            .await
            .unwrap_err();
        assert_eq!(role.status(), 403);
        let slug = run_auth(
            AuthPolicy::jwt().forbid_slugs(["billing.read"]),
            Some("Bearer tok"),
        )
        .await
        .unwrap_err();
        assert_eq!(slug.status(), 403);
    }
}

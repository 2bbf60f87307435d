use std::fmt;
use std::sync::Arc;

use http::Method;

use crate::compiler::compile_contract;
use crate::contract::ContractDescriptor;
use crate::error::RegistrationError;
use crate::local::SdkClient;
use crate::pipeline::{
    AuthStage, AuthStrategy, ContextStage, CorsPolicy, CorsStage, EnrichStage, Handler,
    HandlerStage, Middleware, ParseStage, Pipeline,
};
use crate::registry::{Route, RouterRegistry};
use crate::route_builder::RouteBuilder;
use crate::schema::SchemaAdapter;
use crate::telemetry::{Telemetry, TracingTelemetry};

/// Group of routes sharing a base path, a schema backend and the cross-cutting
/// policies (CORS, auth strategy, telemetry).
///
/// Cloning is cheap; every clone publishes into the same registry.
#[derive(Clone)]
pub struct ContractRouter {
    base_path: String,
    adapter: Arc<dyn SchemaAdapter>,
    registry: RouterRegistry,
    cors: Arc<CorsPolicy>,
    auth: Option<Arc<dyn AuthStrategy>>,
    telemetry: Arc<dyn Telemetry>,
}

impl fmt::Debug for ContractRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractRouter")
            .field("base_path", &self.base_path)
            .field("adapter", &self.adapter.name())
            .field("has_auth_strategy", &self.auth.is_some())
            .finish()
    }
}

impl ContractRouter {
    pub fn new(
        base_path: impl Into<String>,
        adapter: Arc<dyn SchemaAdapter>,
        registry: RouterRegistry,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            adapter,
            registry,
            cors: Arc::new(CorsPolicy::default()),
            auth: None,
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    pub fn with_cors(mut self, policy: CorsPolicy) -> Self {
        self.cors = Arc::new(policy);
        self
    }

    pub fn with_auth_strategy(mut self, strategy: Arc<dyn AuthStrategy>) -> Self {
        self.auth = Some(strategy);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn registry(&self) -> &RouterRegistry {
        &self.registry
    }

    pub fn route(&self, method: Method, path: impl Into<String>) -> RouteBuilder {
        RouteBuilder::new(self.clone(), method, path)
    }

    pub fn get(&self, path: impl Into<String>) -> RouteBuilder {
        self.route(Method::GET, path)
    }

    pub fn post(&self, path: impl Into<String>) -> RouteBuilder {
        self.route(Method::POST, path)
    }

    pub fn put(&self, path: impl Into<String>) -> RouteBuilder {
        self.route(Method::PUT, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> RouteBuilder {
        self.route(Method::PATCH, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> RouteBuilder {
        self.route(Method::DELETE, path)
    }

    /// Routes registered through this router's base path.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.registry
            .snapshot()
            .iter()
            .filter(|r| r.base_path == self.base_path)
            .cloned()
            .collect()
    }

    /// In-process client over this router's routes.
    pub fn sdk(&self) -> SdkClient {
        SdkClient::new(self.routes())
    }

    pub(crate) fn install(
        &self,
        method: Method,
        path: String,
        descriptor: ContractDescriptor,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: Arc<dyn Handler>,
    ) -> Result<Arc<Route>, RegistrationError> {
        let auth_stage = match (&descriptor.auth, &self.auth) {
            (None, _) => None,
            (Some(policy), Some(strategy)) => Some(AuthStage::new(policy.clone(), strategy.clone())),
            (Some(_), None) => {
                return Err(RegistrationError::MissingAuthStrategy(descriptor.name));
            }
        };

        let schemas = compile_contract(self.adapter.as_ref(), &descriptor).map_err(|source| {
            RegistrationError::Compile {
                contract: descriptor.name.clone(),
                source,
            }
        })?;
        let schemas = Arc::new(schemas);
        let descriptor = Arc::new(descriptor);

        let context: Arc<dyn Middleware> = Arc::new(ContextStage);
        let cors: Arc<dyn Middleware> = Arc::new(CorsStage::new(self.cors.clone()));
        let options_stages = vec![context.clone(), cors.clone()];

        let mut stages: Vec<Arc<dyn Middleware>> = vec![
            context,
            cors,
            Arc::new(EnrichStage::new(descriptor.clone(), schemas.clone())),
        ];
        if let Some(stage) = auth_stage {
            stages.push(Arc::new(stage));
        }
        stages.push(Arc::new(ParseStage::new(
            &descriptor,
            schemas.clone(),
            self.telemetry.clone(),
        )));
        stages.extend(middleware);
        stages.push(Arc::new(HandlerStage::new(handler)));

        let pipeline = Pipeline::new(
            stages,
            descriptor.clone(),
            schemas.clone(),
            self.telemetry.clone(),
        )
        .with_options_stages(options_stages);

        self.registry.register(Route {
            base_path: self.base_path.clone(),
            path,
            method,
            descriptor,
            schemas,
            pipeline: Arc::new(pipeline),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::AuthPolicy;
    use crate::pipeline::{handler_fn, Reply};
    use crate::request::Request;
    use crate::schema::{union, NativeAdapter, Schema};

    fn router() -> ContractRouter {
        ContractRouter::new("/billing", Arc::new(NativeAdapter), RouterRegistry::new())
    }

    fn ok_handler() -> impl Handler {
        handler_fn(|_req: Request| async { Ok(Reply::send(200, "ok")) })
    }

    #[test]
    fn registers_and_lists_routes() {
        let r = router();
        r.get("/:id")
            .contract(ContractDescriptor::new("getInvoice"))
            .handler(ok_handler())
            .register()
            .unwrap();
        let routes = r.routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].full_path(), "/billing/:id");
        let found = r.registry().find(&Method::GET, "/billing/{id}");
        assert_eq!(found.map(|r| r.name().to_string()), Some("getInvoice".into()));
    }

    #[test]
    fn duplicate_method_and_path_is_rejected_first_wins() {
        let r = router();
        r.get("/:id")
            .contract(ContractDescriptor::new("first"))
            .handler(ok_handler())
            .register()
            .unwrap();
        let err = r
            .get("/:id")
            .contract(ContractDescriptor::new("second"))
            .handler(ok_handler())
            .register()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Duplicate { .. }));
        assert_eq!(r.routes()[0].name(), "first");
    }

    #[test]
    fn auth_without_strategy_is_a_registration_error() {
        let err = router()
            .post("/pay")
            .contract(ContractDescriptor::new("pay").auth(AuthPolicy::jwt()))
            .handler(ok_handler())
            .register()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::MissingAuthStrategy(name) if name == "pay"));
    }

    #[test]
    fn malformed_schema_is_a_registration_error() {
        let err = router()
            .post("/bad")
            .contract(ContractDescriptor::new("bad").body(union(Vec::<Schema>::new())))
            .handler(ok_handler())
            .register()
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Compile { .. }));
    }
}

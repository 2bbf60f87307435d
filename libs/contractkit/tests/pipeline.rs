use std::sync::Arc;

use contractkit::pipeline::{StaticAuthStrategy, StaticIdentity};
use contractkit::schema::{number, string, JsonSchemaAdapter, NativeAdapter};
use contractkit::{
    handler_fn, shape, AuthPolicy, ContractDescriptor, ContractRouter, LocalRequest, LogLevel,
    MemoryTelemetry, Reply, Request, RouteError, RouterRegistry, SchemaAdapter, ValidationMode,
    Value,
};
use serde_json::json;

async fn echo_amount(req: Request) -> Result<Reply, RouteError> {
    let amount = req.body.get("amount").cloned().unwrap_or_default();
    Ok(Reply::send(200, Value::object([("amount", amount)])))
}

async fn wrong_shape(_req: Request) -> Result<Reply, RouteError> {
    Ok(Reply::send(200, Value::object([("amount", "not a number")])))
}

async fn failing(_req: Request) -> Result<Reply, RouteError> {
    Err(anyhow::anyhow!("ledger connection refused").into())
}

async fn silent(_req: Request) -> Result<Reply, RouteError> {
    Ok(Reply::empty(204))
}

fn router(adapter: Arc<dyn SchemaAdapter>, telemetry: Arc<MemoryTelemetry>) -> ContractRouter {
    ContractRouter::new("/billing", adapter, RouterRegistry::new()).with_telemetry(telemetry)
}

fn pay_contract(request: ValidationMode, response: ValidationMode) -> ContractDescriptor {
    ContractDescriptor::new("pay")
        .body(shape! { amount: number() })
        .response(200, shape! { amount: number() })
        .request_validation(request)
        .response_validation(response)
}

#[tokio::test]
async fn request_policy_error_aborts_with_400_and_correlation_id() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = router(Arc::new(NativeAdapter), telemetry.clone());
    r.post("/pay")
        .contract(pay_contract(ValidationMode::Error, ValidationMode::Error))
        .handler(handler_fn(echo_amount))
        .register()
        .unwrap();

    let out = r
        .sdk()
        .call(
            "pay",
            LocalRequest::new()
                .header("x-correlation-id", "corr-400")
                .body(Value::from(json!({"amount": "abc"}))),
        )
        .await
        .unwrap();

    assert_eq!(out.code, 400);
    assert_eq!(out.response, json!("Bad Request (correlation id: corr-400)"));
    let logged = telemetry.find("aborted");
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].meta["issues"][0]["path"], json!(["body", "amount"]));
}

#[tokio::test]
async fn request_policy_warning_logs_and_continues_with_original_values() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = router(Arc::new(NativeAdapter), telemetry.clone());
    r.post("/pay")
        .contract(pay_contract(ValidationMode::Warning, ValidationMode::None))
        .handler(handler_fn(echo_amount))
        .register()
        .unwrap();

    let out = r
        .sdk()
        .call("pay", LocalRequest::new().body(Value::from(json!({"amount": "abc"}))))
        .await
        .unwrap();

    assert_eq!(out.code, 200);
    assert_eq!(out.response, json!({"amount": "abc"}));
    assert_eq!(telemetry.find("request validation failed").len(), 1);
    assert_eq!(telemetry.count(LogLevel::Warn), 1);
}

#[tokio::test]
async fn request_policy_none_continues_silently() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = router(Arc::new(NativeAdapter), telemetry.clone());
    r.post("/pay")
        .contract(pay_contract(ValidationMode::None, ValidationMode::None))
        .handler(handler_fn(echo_amount))
        .register()
        .unwrap();

    let out = r
        .sdk()
        .call("pay", LocalRequest::new().body(Value::from(json!({"amount": "abc"}))))
        .await
        .unwrap();

    assert_eq!(out.code, 200);
    assert!(telemetry.logs().is_empty());
}

#[tokio::test]
async fn successful_parse_replaces_values_with_coerced_ones() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = router(Arc::new(JsonSchemaAdapter), telemetry.clone());
    r.post("/pay")
        .contract(pay_contract(ValidationMode::Error, ValidationMode::Error))
        .handler(handler_fn(echo_amount))
        .register()
        .unwrap();

    let out = r
        .sdk()
        .call("pay", LocalRequest::new().body(Value::from(json!({"amount": "12.5"}))))
        .await
        .unwrap();

    assert_eq!(out.code, 200);
    assert_eq!(out.response, json!({"amount": 12.5}));
    assert!(telemetry.logs().is_empty());
}

#[tokio::test]
async fn response_policy_is_advisory_and_follows_mode() {
    for (mode, level, expected) in [
        (ValidationMode::Error, LogLevel::Error, 1),
        (ValidationMode::Warning, LogLevel::Warn, 1),
        (ValidationMode::None, LogLevel::Error, 0),
    ] {
        let telemetry = Arc::new(MemoryTelemetry::new());
        let r = router(Arc::new(NativeAdapter), telemetry.clone());
        r.post("/pay")
            .contract(pay_contract(ValidationMode::Error, mode))
            .handler(handler_fn(wrong_shape))
            .register()
            .unwrap();

        let out = r
            .sdk()
            .call("pay", LocalRequest::new().body(Value::from(json!({"amount": 1}))))
            .await
            .unwrap();

        // The produced response is never altered.
        assert_eq!(out.code, 200);
        assert_eq!(out.response, json!({"amount": "not a number"}));
        assert_eq!(telemetry.count(level), expected, "mode {mode:?}");
        let metrics = telemetry
            .metrics()
            .into_iter()
            .filter(|m| m.name == "contract.response.invalid")
            .count();
        assert_eq!(metrics, expected);
    }
}

#[tokio::test]
async fn response_headers_are_checked_against_their_schema() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = router(Arc::new(NativeAdapter), telemetry.clone());
    r.get("/status")
        .contract(
            ContractDescriptor::new("status")
                .response(204, string())
                .response_headers(shape! { "x-ledger-version": string() }),
        )
        .handler(handler_fn(silent))
        .register()
        .unwrap();

    let out = r.sdk().call("status", LocalRequest::new()).await.unwrap();
    assert_eq!(out.code, 204);
    let errors = telemetry.find("response validation failed");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].meta["issues"][0]["path"], json!(["x-ledger-version"]));
}

#[tokio::test]
async fn handler_failure_yields_generic_500() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = router(Arc::new(NativeAdapter), telemetry.clone());
    r.get("/boom")
        .contract(ContractDescriptor::new("boom"))
        .handler(handler_fn(failing))
        .register()
        .unwrap();

    let out = r
        .sdk()
        .call("boom", LocalRequest::new().header("x-correlation-id", "c-500"))
        .await
        .unwrap();

    assert_eq!(out.code, 500);
    assert_eq!(out.response, json!("Internal Server Error (correlation id: c-500)"));
    assert!(!out.response.to_string().contains("ledger"));
    assert_eq!(telemetry.count(LogLevel::Error), 1);
    assert!(telemetry.find("ledger connection refused").len() == 1);
}

#[tokio::test]
async fn correlation_id_is_propagated_or_generated() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = router(Arc::new(NativeAdapter), telemetry);
    r.get("/ping")
        .contract(ContractDescriptor::new("ping"))
        .handler(handler_fn(silent))
        .register()
        .unwrap();
    let sdk = r.sdk();

    let given = sdk
        .call("ping", LocalRequest::new().header("X-Correlation-Id", "abc-123"))
        .await
        .unwrap();
    assert_eq!(given.header("x-correlation-id"), Some("abc-123"));

    let first = sdk.call("ping", LocalRequest::new()).await.unwrap();
    let second = sdk.call("ping", LocalRequest::new()).await.unwrap();
    let first = first.header("x-correlation-id").unwrap();
    let second = second.header("x-correlation-id").unwrap();
    assert!(uuid::Uuid::parse_str(first).is_ok());
    assert!(uuid::Uuid::parse_str(second).is_ok());
    assert_ne!(first, second);
}

#[tokio::test]
async fn mixed_case_request_headers_match() {
    let r = router(Arc::new(NativeAdapter), Arc::new(MemoryTelemetry::new()));
    r.get("/tenant")
        .contract(
            ContractDescriptor::new("tenant").request_headers(shape! { "X-Tenant": string() }),
        )
        .handler(handler_fn(silent))
        .register()
        .unwrap();
    let sdk = r.sdk();

    let ok = sdk
        .call("tenant", LocalRequest::new().header("X-Tenant", "acme"))
        .await
        .unwrap();
    assert_eq!(ok.code, 204);

    let missing = sdk.call("tenant", LocalRequest::new()).await.unwrap();
    assert_eq!(missing.code, 400);
}

#[tokio::test]
async fn deferred_response_check_logs_only_when_run() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = router(Arc::new(NativeAdapter), telemetry.clone());
    r.post("/pay")
        .contract(pay_contract(ValidationMode::Error, ValidationMode::Error))
        .handler(handler_fn(wrong_shape))
        .register()
        .unwrap();
    let route = r.routes().into_iter().next().unwrap();

    let req = Request::new(http::Method::POST, "/billing/pay")
        .with_body(Value::from(json!({"amount": 1})));
    let (res, check) = route.dispatch_deferred(req).await;
    assert_eq!(res.status_code(), 200);
    assert!(telemetry.find("response validation failed").is_empty());

    check.run();
    assert_eq!(telemetry.find("response validation failed").len(), 1);
}

fn auth_router(telemetry: Arc<MemoryTelemetry>) -> ContractRouter {
    let strategy = StaticAuthStrategy::new()
        .with_identity(
            "clerk-token",
            StaticIdentity {
                subject: "clerk".into(),
                roles: vec!["clerk".into()],
                permissions: vec!["billing.read".into()],
            },
        )
        .with_identity(
            "guest-token",
            StaticIdentity {
                subject: "guest".into(),
                roles: vec!["guest".into()],
                permissions: vec![],
            },
        );
    let r = router(Arc::new(NativeAdapter), telemetry).with_auth_strategy(Arc::new(strategy));
    r.get("/secure")
        .contract(
            ContractDescriptor::new("secure")
                .auth(AuthPolicy::jwt().allow_roles(["clerk"]).allow_slugs(["billing.read"])),
        )
        .handler(handler_fn(silent))
        .register()
        .unwrap();
    r
}

#[tokio::test]
async fn auth_outcomes_map_to_status_codes() {
    let r = auth_router(Arc::new(MemoryTelemetry::new()));
    let sdk = r.sdk();

    let missing = sdk.call("secure", LocalRequest::new()).await.unwrap();
    assert_eq!(missing.code, 401);

    let wrong_scheme = sdk
        .call("secure", LocalRequest::new().header("authorization", "Basic clerk-token"))
        .await
        .unwrap();
    assert_eq!(wrong_scheme.code, 401);

    let unknown = sdk
        .call("secure", LocalRequest::new().header("authorization", "Bearer nope"))
        .await
        .unwrap();
    assert_eq!(unknown.code, 401);

    let forbidden = sdk
        .call("secure", LocalRequest::new().header("authorization", "Bearer guest-token"))
        .await
        .unwrap();
    assert_eq!(forbidden.code, 403);

    let allowed = sdk
        .call("secure", LocalRequest::new().header("authorization", "Bearer clerk-token"))
        .await
        .unwrap();
    assert_eq!(allowed.code, 204);
}

#[tokio::test]
async fn preflight_never_reaches_auth_or_handler() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = auth_router(telemetry.clone());
    let route = r.routes().into_iter().next().unwrap();

    let req = Request::new(http::Method::OPTIONS, "/billing/secure")
        .with_header("origin", "https://app.example")
        .with_header("access-control-request-method", "GET");
    let res = route.dispatch(req).await;
    assert_eq!(res.status_code(), 204);
    assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    assert_eq!(telemetry.find("aborted").len(), 0);
}

#[tokio::test]
async fn plain_options_skips_auth_and_handler() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = auth_router(telemetry.clone());
    let route = r.routes().into_iter().next().unwrap();

    let res = route
        .options(Request::new(http::Method::OPTIONS, "/billing/secure"))
        .await;
    assert_eq!(res.status_code(), 204);
    assert!(res.body().is_none());
    assert!(res.header("x-correlation-id").is_some());
    assert_eq!(telemetry.find("aborted").len(), 0);
}

//! HTTP ingress for contract routers.
//!
//! [`ApiIngress`] owns the axum server: it mounts every route of a
//! [`RouterRegistry`], serves the OpenAPI document generated from the same
//! registry and wraps everything in the tower-http stack (trace, timeout,
//! body limit).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use arc_swap::ArcSwap;
use axum::http::{header, HeaderValue};
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use contractkit::openapi::{document_hash, generate};
use contractkit::{ApiInfo, RouterRegistry};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::openapi::OpenApi;

mod binding;
mod config;
mod web;

pub use config::ApiIngressConfig;

const CORRELATION_HEADER: &str = "x-correlation-id";

pub struct ApiIngress {
    config: ArcSwap<ApiIngressConfig>,
    registry: RouterRegistry,
}

impl ApiIngress {
    pub fn new(config: ApiIngressConfig, registry: RouterRegistry) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            registry,
        }
    }

    /// Get the current configuration (cheap clone from ArcSwap)
    pub fn get_config(&self) -> ApiIngressConfig {
        (**self.config.load()).clone()
    }

    pub fn registry(&self) -> &RouterRegistry {
        &self.registry
    }

    /// Build the OpenAPI document from the routes registered so far.
    pub fn build_openapi(&self) -> OpenApi {
        let cfg = self.config.load();
        let info = ApiInfo {
            title: cfg.title.clone(),
            version: cfg.api_version.clone(),
            description: None,
        };
        generate(&self.registry.snapshot(), &info)
    }

    /// Build the HTTP router: contract routes, OpenAPI/docs endpoints, health
    /// probe, then the middleware stack.
    pub fn build_router(&self) -> Result<Router> {
        let cfg = self.get_config();
        let routes = self.registry.snapshot();

        let mut reserved = vec!["/health".to_string()];
        if cfg.enable_docs {
            if !cfg.docs_path.starts_with('/') {
                bail!("api.docs_path must start with '/': '{}'", cfg.docs_path);
            }
            reserved.extend([cfg.docs_path.clone(), cfg.openapi_path(), cfg.openapi_hash_path()]);
        }
        if let Some(route) = routes.iter().find(|r| reserved.contains(&r.axum_path())) {
            bail!(
                "contract '{}' at {} collides with a built-in endpoint",
                route.name(),
                route.full_path()
            );
        }

        let mut router = Router::new().route("/health", get(web::health_check));

        if cfg.enable_docs {
            let doc = Arc::new(self.build_openapi());
            let hash = document_hash(&doc).context("Failed to hash the OpenAPI document")?;
            tracing::info!(
                operations = routes.len(),
                hash = %hash,
                "Serving OpenAPI at {}",
                cfg.openapi_path()
            );

            let page = web::docs_page(&cfg.title, &cfg.openapi_path());
            router = router
                .route(
                    &cfg.openapi_path(),
                    get(move || {
                        let doc = doc.clone();
                        async move {
                            ([(header::CACHE_CONTROL, "no-store")], Json(doc.as_ref()))
                                .into_response()
                        }
                    }),
                )
                .route(&cfg.openapi_hash_path(), get(move || async move { hash }))
                .route(&cfg.docs_path, get(move || async move { page }));
        }

        router = binding::mount(router, &routes, cfg.body_limit_bytes);
        Ok(apply_middleware_stack(router, &cfg))
    }

    /// Bind, serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cfg = self.get_config();
        let addr: SocketAddr = cfg
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", cfg.bind_addr))?;

        let router = self.build_router()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        tracing::info!("HTTP server bound on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("HTTP server shutting down gracefully");
            })
            .await
            .context("HTTP server failed")
    }
}

/// Outermost to innermost: Trace -> Timeout -> BodyLimit -> Router.
fn apply_middleware_stack(router: Router, cfg: &ApiIngressConfig) -> Router {
    use tracing::field::Empty;

    router
        .layer(RequestBodyLimitLayer::new(cfg.body_limit_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(cfg.timeout_secs)))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<axum::body::Body>| {
                    let correlation_id = req
                        .headers()
                        .get(CORRELATION_HEADER)
                        .and_then(|v: &HeaderValue| v.to_str().ok())
                        .unwrap_or("n/a");
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        uri = %req.uri().path(),
                        version = ?req.version(),
                        correlation_id = %correlation_id,
                        status = Empty,
                        latency_ms = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<axum::body::Body>,
                     latency: Duration,
                     span: &tracing::Span| {
                        let ms = (latency.as_secs_f64() * 1000.0) as u64;
                        span.record("status", res.status().as_u16());
                        span.record("latency_ms", ms);
                        // The pipeline assigns an id when the client sent none.
                        if let Some(id) = res
                            .headers()
                            .get(CORRELATION_HEADER)
                            .and_then(|v| v.to_str().ok())
                        {
                            tracing::debug!(parent: span, correlation_id = %id, "response sent");
                        }
                    },
                ),
        )
}

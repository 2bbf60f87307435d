//! Append-only route registry with lock-free reads.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use http::Method;

use crate::compiler::CompiledSchemaSet;
use crate::contract::ContractDescriptor;
use crate::error::RegistrationError;
use crate::pipeline::{Pipeline, ResponseCheck};
use crate::request::Request;
use crate::response::Response;

/// One registered route. Never mutated after registration.
#[derive(Debug)]
pub struct Route {
    pub base_path: String,
    /// Route path as declared, `:name` placeholders allowed.
    pub path: String,
    pub method: Method,
    pub descriptor: Arc<ContractDescriptor>,
    pub schemas: Arc<CompiledSchemaSet>,
    pub pipeline: Arc<Pipeline>,
}

impl Route {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// `base_path` joined with `path`, still in declared form.
    pub fn full_path(&self) -> String {
        join_paths(&self.base_path, &self.path)
    }

    pub fn axum_path(&self) -> String {
        to_axum_path(&self.full_path())
    }

    pub fn openapi_path(&self) -> String {
        to_openapi_path(&self.full_path())
    }

    /// Run the compiled chain over `req`, then the response check.
    pub async fn dispatch(&self, req: Request) -> Response {
        let (res, check) = self.dispatch_deferred(req).await;
        check.run();
        res
    }

    /// Run the compiled chain over `req`. The caller runs the returned check
    /// after the response has been written out.
    pub async fn dispatch_deferred(&self, mut req: Request) -> (Response, ResponseCheck) {
        let mut res = self.pipeline.response();
        let check = self.pipeline.execute(&mut req, &mut res).await;
        (res, check)
    }

    /// Answer an OPTIONS request for this route's path. Only the context and
    /// CORS stages run.
    pub async fn options(&self, mut req: Request) -> Response {
        let mut res = self.pipeline.response();
        self.pipeline.answer_options(&mut req, &mut res).await;
        res
    }
}

/// Join a base path and a route path with exactly one `/` between them.
pub fn join_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => ensure_leading_slash(base),
        (false, false) => format!("{}/{path}", ensure_leading_slash(base)),
    }
}

fn ensure_leading_slash(p: &str) -> String {
    if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{p}")
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Param(&'a str),
    Wildcard(&'a str),
}

fn classify(segment: &str) -> Segment<'_> {
    if let Some(name) = segment.strip_prefix(':') {
        return Segment::Param(name);
    }
    if let Some(rest) = segment.strip_prefix('*') {
        return Segment::Wildcard(if rest.is_empty() { "rest" } else { rest });
    }
    if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        return match inner.strip_prefix('*') {
            Some(name) => Segment::Wildcard(name),
            None => Segment::Param(inner),
        };
    }
    Segment::Literal(segment)
}

fn rewrite(path: &str, wildcard_star: bool) -> String {
    path.split('/')
        .map(|segment| match classify(segment) {
            Segment::Literal(s) => s.to_string(),
            Segment::Param(name) => format!("{{{name}}}"),
            Segment::Wildcard(name) if wildcard_star => format!("{{*{name}}}"),
            Segment::Wildcard(name) => format!("{{{name}}}"),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `/billing/:id` → `/billing/{id}`, `/files/*` → `/files/{*rest}`.
pub fn to_axum_path(path: &str) -> String {
    rewrite(path, true)
}

/// `/billing/:id` → `/billing/{id}`, `/files/*` → `/files/{rest}`.
pub fn to_openapi_path(path: &str) -> String {
    rewrite(path, false)
}

/// Names of the path parameters, in order.
pub fn path_param_names(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| match classify(segment) {
            Segment::Param(name) | Segment::Wildcard(name) => Some(name.to_string()),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Shared, append-only list of routes.
///
/// Readers take a snapshot without locking; writers publish a new vector.
#[derive(Clone)]
pub struct RouterRegistry {
    routes: Arc<ArcSwap<Vec<Arc<Route>>>>,
    keys: Arc<DashMap<(Method, String), String>>,
}

impl Default for RouterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RouterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterRegistry")
            .field("routes", &self.routes.load().len())
            .finish()
    }
}

impl RouterRegistry {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(ArcSwap::from_pointee(Vec::new())),
            keys: Arc::new(DashMap::new()),
        }
    }

    /// Append a route. A second registration of the same method and path is
    /// rejected and the first one stays in place.
    pub fn register(&self, route: Route) -> Result<Arc<Route>, RegistrationError> {
        let key = (route.method.clone(), route.axum_path());
        match self.keys.entry(key) {
            Entry::Occupied(existing) => {
                tracing::error!(
                    method = %route.method,
                    path = %route.full_path(),
                    first = %existing.get(),
                    rejected = %route.name(),
                    "Duplicate (method, path) detected; ignoring subsequent registration"
                );
                return Err(RegistrationError::Duplicate {
                    method: route.method.to_string(),
                    path: route.full_path(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(route.name().to_string());
            }
        }

        if self.find_by_name(route.name()).is_some() {
            tracing::warn!(
                contract = %route.name(),
                "Contract name already registered; SDK lookups resolve to the first route"
            );
        }

        let route = Arc::new(route);
        self.routes.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(route.clone());
            next
        });

        tracing::debug!(
            method = %route.method,
            path = %route.full_path(),
            contract = %route.name(),
            total_routes = self.len(),
            "Registered route"
        );
        Ok(route)
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<Route>>> {
        self.routes.load_full()
    }

    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, method: &Method, path: &str) -> Option<Arc<Route>> {
        let wanted = to_axum_path(path);
        self.routes
            .load()
            .iter()
            .find(|r| r.method == *method && r.axum_path() == wanted)
            .cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<Route>> {
        self.routes.load().iter().find(|r| r.name() == name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_and_route_paths() {
        assert_eq!(join_paths("/billing", "/:id/success"), "/billing/:id/success");
        assert_eq!(join_paths("/billing/", "events"), "/billing/events");
        assert_eq!(join_paths("/billing", "/"), "/billing");
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("api", "/x"), "/api/x");
    }

    #[test]
    fn placeholders_are_rewritten_per_target() {
        assert_eq!(to_openapi_path("/billing/:id/success"), "/billing/{id}/success");
        assert_eq!(to_axum_path("/billing/:id/success"), "/billing/{id}/success");
        assert_eq!(to_axum_path("/files/*"), "/files/{*rest}");
        assert_eq!(to_openapi_path("/files/*path"), "/files/{path}");
        assert_eq!(to_openapi_path("/files/{*path}"), "/files/{path}");
        assert_eq!(path_param_names("/a/:x/b/:y"), vec!["x", "y"]);
    }
}

//! In-process invocation: runs a route's compiled pipeline without a
//! transport. Generated SDK clients and tests go through here.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value as Json};
use thiserror::Error;

use crate::registry::{join_paths, Route};
use crate::request::Request;
use crate::response::Response;
use crate::value::{Map, Value};

/// Input of a local call. Values are passed as given; the parse stage
/// coerces them exactly as it would transport strings.
#[derive(Debug, Clone, Default)]
pub struct LocalRequest {
    pub params: Map,
    pub query: Map,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl LocalRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }
}

/// Outcome of a local call: status, payload and response headers.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalResponse {
    pub code: u16,
    pub response: Json,
    pub headers: Vec<(String, String)>,
}

impl LocalResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Run `route` in-process.
pub async fn invoke(route: &Route, local: LocalRequest) -> LocalResponse {
    let mut req = Request::new(route.method.clone(), concrete_path(route, &local.params))
        .with_params(Value::Object(local.params))
        .with_query(Value::Object(local.query))
        .with_body(local.body);
    for (name, value) in local.headers {
        req.add_header(&name, value);
    }

    let (res, check) = route.dispatch_deferred(req).await;
    let out = collect(res).await;
    check.run();
    out
}

/// Drain a recorded response into its local form; streams become an array
/// of `{event, data}` records.
pub async fn collect(mut res: Response) -> LocalResponse {
    let code = res.status_code();
    let headers = res.header_pairs().to_vec();
    let response = match res.take_stream() {
        Some(stream) => {
            let events: Vec<Json> = stream
                .map(|e| json!({ "event": e.event, "data": e.data.to_json() }))
                .collect()
                .await;
            Json::Array(events)
        }
        None => res.take_body().map(|b| b.to_json()).unwrap_or(Json::Null),
    };
    LocalResponse {
        code,
        response,
        headers,
    }
}

/// Declared path with the supplied params substituted, for diagnostics.
fn concrete_path(route: &Route, params: &Map) -> String {
    join_paths(&route.base_path, &route.path)
        .split('/')
        .map(|segment| {
            let name = segment
                .strip_prefix(':')
                .or_else(|| segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')));
            match name.and_then(|n| params.get(n)) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => segment.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("no route named '{0}'")]
    UnknownRoute(String),
}

/// Client exposing every route of a router by contract name.
#[derive(Debug, Clone)]
pub struct SdkClient {
    routes: Vec<Arc<Route>>,
}

impl SdkClient {
    pub fn new(routes: Vec<Arc<Route>>) -> Self {
        Self { routes }
    }

    /// Contract names, in registration order.
    pub fn operations(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name()).collect()
    }

    pub async fn call(&self, name: &str, req: LocalRequest) -> Result<LocalResponse, SdkError> {
        let route = self
            .routes
            .iter()
            .find(|r| r.name() == name)
            .ok_or_else(|| SdkError::UnknownRoute(name.to_string()))?;
        Ok(invoke(route, req).await)
    }
}

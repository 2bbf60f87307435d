//! Bridges axum requests into contract routes and replays the recorded
//! [`contractkit::Response`] onto the wire.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use contractkit::{Request, Response, Route, Value};
use futures::StreamExt;
use http::Method;

/// Mount every route, one method router per path. Paths without an explicit
/// OPTIONS route answer OPTIONS with the CORS stages of the first route
/// registered there; no handler runs.
pub fn mount(mut router: Router, routes: &[Arc<Route>], body_limit: usize) -> Router {
    let mut by_path: BTreeMap<String, Vec<Arc<Route>>> = BTreeMap::new();
    for route in routes {
        by_path.entry(route.axum_path()).or_default().push(route.clone());
    }

    for (path, routes) in by_path {
        let mut methods: Option<MethodRouter> = None;
        for route in &routes {
            let Ok(filter) = MethodFilter::try_from(route.method.clone()) else {
                tracing::warn!(
                    method = %route.method,
                    path = %path,
                    "Method not supported by the HTTP binding; route stays local-only"
                );
                continue;
            };
            let mr = on(filter, endpoint(route.clone(), body_limit));
            methods = Some(match methods {
                Some(existing) => existing.merge(mr),
                None => mr,
            });
        }

        let has_options = routes.iter().any(|r| r.method == Method::OPTIONS);
        if let (false, Some(first)) = (has_options, routes.first()) {
            let mr = on(MethodFilter::OPTIONS, options_endpoint(first.clone(), allow_header(&routes)));
            methods = methods.map(|m| m.merge(mr));
        }

        if let Some(methods) = methods {
            tracing::debug!(path = %path, routes = routes.len(), "Mounted contract path");
            router = router.route(&path, methods);
        }
    }
    router
}

type RawParams = Option<Path<HashMap<String, String>>>;
type RawQuery = Query<Vec<(String, String)>>;

fn endpoint(
    route: Arc<Route>,
    body_limit: usize,
) -> impl Fn(RawParams, RawQuery, axum::extract::Request) -> futures::future::BoxFuture<'static, HttpResponse>
       + Clone
       + Send
       + Sync
       + 'static {
    move |params, Query(query), request| {
        let route = route.clone();
        Box::pin(async move {
            let params = params.map(|Path(p)| p).unwrap_or_default();
            match into_contract_request(params, query, request, body_limit).await {
                Ok(req) => {
                    let (res, check) = route.dispatch_deferred(req).await;
                    let response = into_http_response(res).await;
                    check.run();
                    response
                }
                Err(rejection) => rejection,
            }
        })
    }
}

fn options_endpoint(
    route: Arc<Route>,
    allow: String,
) -> impl Fn(axum::extract::Request) -> futures::future::BoxFuture<'static, HttpResponse>
       + Clone
       + Send
       + Sync
       + 'static {
    move |request| {
        let route = route.clone();
        let allow = allow.clone();
        Box::pin(async move {
            let (parts, _body) = request.into_parts();
            let mut req = Request::new(parts.method, parts.uri.path());
            for (name, value) in &parts.headers {
                if let Ok(v) = value.to_str() {
                    req.add_header(name.as_str(), v);
                }
            }
            let mut res = route.options(req).await;
            if res.header("allow").is_none() {
                res.set_header("allow", allow.as_str());
            }
            into_http_response(res).await
        })
    }
}

/// Methods served at one path, OPTIONS included.
fn allow_header(routes: &[Arc<Route>]) -> String {
    let mut methods: Vec<&str> = routes.iter().map(|r| r.method.as_str()).collect();
    methods.push(Method::OPTIONS.as_str());
    methods.dedup();
    methods.join(", ")
}

async fn into_contract_request(
    params: HashMap<String, String>,
    query: Vec<(String, String)>,
    request: axum::extract::Request,
    body_limit: usize,
) -> Result<Request, HttpResponse> {
    let (parts, body) = request.into_parts();

    let bytes = axum::body::to_bytes(body, body_limit).await.map_err(|e| {
        tracing::debug!(error = %e, "Failed to read request body");
        StatusCode::PAYLOAD_TOO_LARGE.into_response()
    })?;

    let mut req = Request::new(parts.method, parts.uri.path())
        .with_params(Value::object(params))
        .with_query(query_value(query))
        .with_body(body_value(&bytes));
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(v) => req.add_header(name.as_str(), v),
            Err(_) => tracing::debug!(header = %name, "Dropping non-UTF-8 header"),
        }
    }
    Ok(req)
}

/// Query pairs as an object; repeated keys collect into arrays.
fn query_value(pairs: Vec<(String, String)>) -> Value {
    let mut map: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in pairs {
        let value = Value::String(value);
        let merged = match map.remove(&key) {
            None => value,
            Some(Value::Array(mut items)) => {
                items.push(value);
                Value::Array(items)
            }
            Some(existing) => Value::Array(vec![existing, value]),
        };
        map.insert(key, merged);
    }
    Value::Object(map)
}

/// Empty bodies are null, JSON bodies are parsed and anything else is kept
/// as text for the contract's schema to judge.
fn body_value(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(json) => Value::from(json),
        Err(_) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

pub(crate) async fn into_http_response(mut res: Response) -> HttpResponse {
    let status = StatusCode::from_u16(res.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = res.header_pairs().to_vec();

    let mut response = if let Some(stream) = res.take_stream() {
        let events = stream.map(|e| {
            let data = e.data.to_json().to_string();
            Ok::<_, Infallible>(Event::default().event(e.event).data(data))
        });
        Sse::new(events).keep_alive(KeepAlive::default()).into_response()
    } else {
        let content_type = res.header("content-type").map(str::to_owned);
        match res.take_body() {
            None => Body::empty().into_response(),
            Some(Value::String(text)) if is_textual(content_type.as_deref()) => {
                text.into_response()
            }
            Some(body) => {
                let mut r = Body::from(body.to_json().to_string()).into_response();
                r.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                r
            }
        }
    };

    *response.status_mut() = status;
    let out = response.headers_mut();
    let mut replaced: Vec<HeaderName> = Vec::new();
    for (name, value) in headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            tracing::warn!(header = %name, "Dropping header that is not valid on the wire");
            continue;
        };
        // First recorded value replaces the default, the rest append.
        if replaced.contains(&name) {
            out.append(name, value);
        } else {
            out.insert(name.clone(), value);
            replaced.push(name);
        }
    }
    response
}

fn is_textual(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| !ct.to_ascii_lowercase().contains("json"))
}

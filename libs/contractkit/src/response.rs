//! Recording response wrapper.
//!
//! Handlers never touch a transport object: they record a status, headers and
//! one payload (or one event stream) here, and the binding replays the record.

use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;

use crate::telemetry::{LogLevel, Telemetry, TracingTelemetry};
use crate::value::{Map, Value};

/// Named record of a streamed response; served as one SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub event: String,
    pub data: Value,
}

impl StreamEvent {
    pub fn new(event: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

pub type EventStream = BoxStream<'static, StreamEvent>;

pub struct Response {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    stream: Option<EventStream>,
    sent: bool,
    telemetry: Arc<dyn Telemetry>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("streaming", &self.stream.is_some())
            .field("sent", &self.sent)
            .finish()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(Arc::new(TracingTelemetry))
    }
}

impl Response {
    pub fn new(telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            status: None,
            headers: Vec::new(),
            body: None,
            stream: None,
            sent: false,
            telemetry,
        }
    }

    pub fn status(&mut self, code: u16) -> &mut Self {
        self.status = Some(code);
        self
    }

    /// Status actually set, 200 if none was.
    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    /// Store a header, replacing earlier values of the same name.
    ///
    /// Strings are stored as-is, arrays become one header value per element,
    /// anything else is stored in its JSON form.
    pub fn set_header(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(k, _)| *k != name);
        match value.into() {
            Value::Array(items) => {
                for item in items {
                    self.headers.push((name.clone(), header_text(&item)));
                }
            }
            other => self.headers.push((name, header_text(&other))),
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Header set as an object; repeated names become arrays.
    pub fn get_headers(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.headers {
            let value = Value::String(value.clone());
            match map.remove(name) {
                None => {
                    map.insert(name.clone(), value);
                }
                Some(Value::Array(mut values)) => {
                    values.push(value);
                    map.insert(name.clone(), Value::Array(values));
                }
                Some(existing) => {
                    map.insert(name.clone(), Value::Array(vec![existing, value]));
                }
            }
        }
        Value::Object(map)
    }

    pub fn header_pairs(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Record the payload verbatim. Only the first call wins.
    pub fn send(&mut self, payload: impl Into<Value>) -> &mut Self {
        if self.reject_if_sent("send") {
            return self;
        }
        self.body = Some(payload.into());
        self.sent = true;
        self
    }

    /// Serialize and record a payload.
    pub fn json<T: Serialize>(&mut self, payload: &T) -> Result<&mut Self, serde_json::Error> {
        let value = serde_json::to_value(payload)?;
        if !self.headers.iter().any(|(k, _)| k == "content-type") {
            self.set_header("content-type", "application/json");
        }
        Ok(self.send(Value::from(value)))
    }

    /// Finish without a body.
    pub fn end(&mut self) -> &mut Self {
        if !self.reject_if_sent("end") {
            self.sent = true;
        }
        self
    }

    /// Respond with a lazy sequence of named records.
    pub fn stream<S>(&mut self, events: S) -> &mut Self
    where
        S: Stream<Item = StreamEvent> + Send + 'static,
    {
        if self.reject_if_sent("stream") {
            return self;
        }
        self.stream = Some(events.boxed());
        self.sent = true;
        self
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn take_body(&mut self) -> Option<Value> {
        self.body.take()
    }

    pub fn take_stream(&mut self) -> Option<EventStream> {
        self.stream.take()
    }

    fn reject_if_sent(&self, op: &str) -> bool {
        if self.sent {
            self.telemetry.log(
                LogLevel::Warn,
                "response already sent; ignoring",
                &json!({ "operation": op, "status": self.status_code() }),
            );
        }
        self.sent
    }
}

fn header_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_json().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemoryTelemetry;
    use serde_json::json;

    #[test]
    fn non_string_headers_are_serialized() {
        let mut res = Response::default();
        res.set_header("X-Count", 3)
            .set_header("x-flag", true)
            .set_header("x-list", Value::from(json!(["a", 1])));
        assert_eq!(res.header("x-count"), Some("3"));
        assert_eq!(res.header("X-Flag"), Some("true"));
        assert_eq!(
            res.get_headers().get("x-list"),
            Some(&Value::from(json!(["a", "1"])))
        );
    }

    #[test]
    fn second_send_is_ignored_and_logged() {
        let telemetry = Arc::new(MemoryTelemetry::new());
        let mut res = Response::new(telemetry.clone());
        res.status(201).send("first");
        res.send("second");
        assert_eq!(res.body(), Some(&Value::from("first")));
        assert_eq!(res.status_code(), 201);
        assert_eq!(telemetry.find("already sent").len(), 1);
    }

    #[test]
    fn default_status_is_200() {
        let res = Response::default();
        assert_eq!(res.status_code(), 200);
        assert!(!res.is_sent());
    }
}

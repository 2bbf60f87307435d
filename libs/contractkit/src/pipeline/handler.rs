use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::error::RouteError;
use crate::request::Request;
use crate::response::{EventStream, Response, StreamEvent};
use crate::value::Value;

/// Terminal stage of a route.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, req: &Request, res: &mut Response) -> Result<(), RouteError>;
}

enum ReplyBody {
    Empty,
    Payload(Value),
    Stream(EventStream),
}

/// Owned response description returned by closure handlers.
pub struct Reply {
    status: u16,
    headers: Vec<(String, Value)>,
    body: ReplyBody,
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = match &self.body {
            ReplyBody::Empty => "empty",
            ReplyBody::Payload(_) => "payload",
            ReplyBody::Stream(_) => "stream",
        };
        f.debug_struct("Reply")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &body)
            .finish()
    }
}

impl Reply {
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ReplyBody::Empty,
        }
    }

    pub fn send(status: u16, payload: impl Into<Value>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ReplyBody::Payload(payload.into()),
        }
    }

    pub fn json<T: Serialize>(status: u16, payload: &T) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(payload)?;
        Ok(Self::send(status, Value::from(value)).header("content-type", "application/json"))
    }

    pub fn stream<S>(events: S) -> Self
    where
        S: Stream<Item = StreamEvent> + Send + 'static,
    {
        use futures::StreamExt;
        Self {
            status: 200,
            headers: Vec::new(),
            body: ReplyBody::Stream(events.boxed()),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn apply(self, res: &mut Response) {
        res.status(self.status);
        for (name, value) in self.headers {
            res.set_header(&name, value);
        }
        match self.body {
            ReplyBody::Empty => {
                res.end();
            }
            ReplyBody::Payload(value) => {
                res.send(value);
            }
            ReplyBody::Stream(events) => {
                res.stream(events);
            }
        }
    }
}

/// Adapter produced by [`handler_fn`].
pub struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure taking the parsed request.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, RouteError>> + Send + 'static,
{
    FnHandler {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, RouteError>> + Send + 'static,
{
    async fn call(&self, req: &Request, res: &mut Response) -> Result<(), RouteError> {
        let reply = (self.f)(req.clone()).await?;
        reply.apply(res);
        Ok(())
    }
}

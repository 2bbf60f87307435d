//! Type-state route builder.
//!
//! `register()` only exists once both a contract and a handler are set, so an
//! incomplete route is a compile error rather than a startup failure:
//!
//! ```ignore
//! router
//!     .get("/:id")
//!     .contract(ContractDescriptor::new("getInvoice").params(shape! { id: string() }))
//!     .handler(handler_fn(|req| async move { Ok(Reply::send(200, req.params)) }))
//!     .register()?;
//! ```

use std::sync::Arc;

use http::Method;

use crate::contract::ContractDescriptor;
use crate::error::RegistrationError;
use crate::pipeline::{Handler, Middleware};
use crate::registry::Route;
use crate::router::ContractRouter;

pub mod state {
    #[derive(Debug, Clone, Copy)]
    pub struct Missing;

    #[derive(Debug, Clone, Copy)]
    pub struct Present;
}

pub use state::{Missing, Present};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Missing {}
    impl Sealed for super::Present {}
}

/// Storage for the contract depending on builder state.
pub trait ContractSlot: sealed::Sealed {
    type Slot;
}

impl ContractSlot for Missing {
    type Slot = ();
}

impl ContractSlot for Present {
    type Slot = ContractDescriptor;
}

/// Storage for the handler depending on builder state.
pub trait HandlerSlot: sealed::Sealed {
    type Slot;
}

impl HandlerSlot for Missing {
    type Slot = ();
}

impl HandlerSlot for Present {
    type Slot = Arc<dyn Handler>;
}

#[must_use = "a route does nothing until `register()` is called"]
pub struct RouteBuilder<C = Missing, H = Missing>
where
    C: ContractSlot,
    H: HandlerSlot,
{
    router: ContractRouter,
    method: Method,
    path: String,
    contract: C::Slot,
    middleware: Vec<Arc<dyn Middleware>>,
    handler: H::Slot,
}

impl RouteBuilder<Missing, Missing> {
    pub fn new(router: ContractRouter, method: Method, path: impl Into<String>) -> Self {
        Self {
            router,
            method,
            path: path.into(),
            contract: (),
            middleware: Vec::new(),
            handler: (),
        }
    }
}

impl<C, H> RouteBuilder<C, H>
where
    C: ContractSlot,
    H: HandlerSlot,
{
    /// Add a route-level stage; it runs after request parsing, before the
    /// handler, in the order added.
    pub fn middleware<M>(mut self, stage: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middleware.push(Arc::new(stage));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<H: HandlerSlot> RouteBuilder<Missing, H> {
    pub fn contract(self, descriptor: ContractDescriptor) -> RouteBuilder<Present, H> {
        RouteBuilder {
            router: self.router,
            method: self.method,
            path: self.path,
            contract: descriptor,
            middleware: self.middleware,
            handler: self.handler,
        }
    }
}

impl<C: ContractSlot> RouteBuilder<C, Missing> {
    pub fn handler<T>(self, handler: T) -> RouteBuilder<C, Present>
    where
        T: Handler + 'static,
    {
        self.handler_arc(Arc::new(handler))
    }

    pub fn handler_arc(self, handler: Arc<dyn Handler>) -> RouteBuilder<C, Present> {
        RouteBuilder {
            router: self.router,
            method: self.method,
            path: self.path,
            contract: self.contract,
            middleware: self.middleware,
            handler,
        }
    }
}

impl RouteBuilder<Present, Present> {
    /// Compile the contract, assemble the pipeline and publish the route.
    pub fn register(self) -> Result<Arc<Route>, RegistrationError> {
        self.router.install(
            self.method,
            self.path,
            self.contract,
            self.middleware,
            self.handler,
        )
    }
}

//! Error taxonomy of the request pipeline.
//!
//! Only the status code and a terse message with the correlation id reach the
//! caller; issue lists and causes go to the telemetry sink.

use thiserror::Error;

use crate::schema::{Issue, SchemaError};

#[derive(Debug, Error)]
#[error("request validation failed with {} issue(s)", issues.len())]
pub struct RequestValidationError {
    pub issues: Vec<Issue>,
}

/// Advisory only: logged, never turned into a response.
#[derive(Debug, Error)]
#[error("response validation failed for status {status} with {} issue(s)", issues.len())]
pub struct ResponseValidationError {
    pub status: u16,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("missing authorization header")]
    MissingCredentials,
    #[error("authorization scheme mismatch, expected '{expected}'")]
    SchemeMismatch { expected: String },
    #[error("credentials rejected: {0}")]
    InvalidCredentials(String),
    #[error("access denied: {0}")]
    Forbidden(String),
}

impl AuthorizationError {
    pub fn status(&self) -> u16 {
        match self {
            AuthorizationError::Forbidden(_) => 403,
            _ => 401,
        }
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct HandlerError(#[from] anyhow::Error);

impl HandlerError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self(anyhow::anyhow!("{message}"))
    }
}

/// Anything that aborts the chain.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    RequestValidation(#[from] RequestValidationError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl RouteError {
    pub fn status(&self) -> u16 {
        match self {
            RouteError::RequestValidation(_) => 400,
            RouteError::Authorization(e) => e.status(),
            RouteError::Handler(_) => 500,
        }
    }

    /// Body sent to the caller.
    pub fn public_message(&self, correlation_id: &str) -> String {
        let reason = match self.status() {
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            _ => "Internal Server Error",
        };
        format!("{reason} (correlation id: {correlation_id})")
    }
}

impl From<anyhow::Error> for RouteError {
    fn from(e: anyhow::Error) -> Self {
        RouteError::Handler(HandlerError(e))
    }
}

impl From<serde_json::Error> for RouteError {
    fn from(e: serde_json::Error) -> Self {
        RouteError::Handler(HandlerError(e.into()))
    }
}

/// Registration-time failures.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("failed to compile contract '{contract}'")]
    Compile {
        contract: String,
        #[source]
        source: SchemaError,
    },
    #[error("duplicate route {method} {path}")]
    Duplicate { method: String, path: String },
    #[error("contract '{0}' declares auth but the router has no auth strategy")]
    MissingAuthStrategy(String),
}

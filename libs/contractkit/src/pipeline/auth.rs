use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::contract::AuthMethod;
use crate::error::AuthorizationError;

/// Identity resolved from a credential, before role/permission mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    pub claims: serde_json::Value,
}

/// Pluggable credential check used by the auth stage.
///
/// `authenticate` receives the credential with the scheme prefix already
/// stripped. Role and permission mapping are separate so a strategy can
/// reuse one verifier with different claim layouts.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn authenticate(
        &self,
        method: &AuthMethod,
        credential: &str,
    ) -> Result<Subject, AuthorizationError>;

    fn map_roles(&self, subject: &Subject) -> Vec<String>;

    fn map_permissions(&self, subject: &Subject) -> Vec<String>;
}

/// Identity entry of a [`StaticAuthStrategy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIdentity {
    pub subject: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Token table strategy.
///
/// Bearer and custom-prefix credentials are looked up verbatim. Basic
/// credentials are base64-decoded and looked up as `user:password`.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthStrategy {
    identities: HashMap<String, StaticIdentity>,
}

impl StaticAuthStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, credential: impl Into<String>, identity: StaticIdentity) -> Self {
        self.identities.insert(credential.into(), identity);
        self
    }

    pub fn from_map(identities: HashMap<String, StaticIdentity>) -> Self {
        Self { identities }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl AuthStrategy for StaticAuthStrategy {
    async fn authenticate(
        &self,
        method: &AuthMethod,
        credential: &str,
    ) -> Result<Subject, AuthorizationError> {
        let key = match method {
            AuthMethod::Basic => {
                let raw = base64::engine::general_purpose::STANDARD
                    .decode(credential.trim())
                    .map_err(|_| AuthorizationError::InvalidCredentials("malformed basic credential".into()))?;
                let text = String::from_utf8(raw).map_err(|_| {
                    AuthorizationError::InvalidCredentials("basic credential is not utf-8".into())
                })?;
                if !text.contains(':') {
                    return Err(AuthorizationError::InvalidCredentials(
                        "basic credential lacks ':' separator".into(),
                    ));
                }
                text
            }
            AuthMethod::Jwt | AuthMethod::Other { .. } => credential.trim().to_string(),
        };

        let identity = self
            .identities
            .get(&key)
            .ok_or_else(|| AuthorizationError::InvalidCredentials("unknown credential".into()))?;

        Ok(Subject {
            id: identity.subject.clone(),
            claims: serde_json::json!({
                "roles": identity.roles,
                "permissions": identity.permissions,
            }),
        })
    }

    fn map_roles(&self, subject: &Subject) -> Vec<String> {
        string_list(&subject.claims, "roles")
    }

    fn map_permissions(&self, subject: &Subject) -> Vec<String> {
        string_list(&subject.claims, "permissions")
    }
}

fn string_list(claims: &serde_json::Value, key: &str) -> Vec<String> {
    claims
        .get(key)
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

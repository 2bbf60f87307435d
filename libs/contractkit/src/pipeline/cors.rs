use serde::{Deserialize, Serialize};

/// Cross-origin policy applied by the CORS stage.
///
/// `"*"` in `allowed_origins` matches any origin. With credentials enabled
/// the request origin is echoed instead of the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsPolicy {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: Option<u64>,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["*".to_string()],
            exposed_headers: vec!["x-correlation-id".to_string()],
            allow_credentials: false,
            max_age_secs: Some(600),
        }
    }
}

impl CorsPolicy {
    /// Value for `access-control-allow-origin`, if the origin is allowed.
    pub fn allow_origin(&self, origin: Option<&str>) -> Option<String> {
        let wildcard = self.allowed_origins.iter().any(|o| o == "*");
        match origin {
            Some(origin) if wildcard && self.allow_credentials => Some(origin.to_string()),
            Some(origin) if self.allowed_origins.iter().any(|o| o == origin) => {
                Some(origin.to_string())
            }
            _ if wildcard => Some("*".to_string()),
            _ => None,
        }
    }

    pub fn methods_header(&self) -> String {
        self.allowed_methods.join(", ")
    }

    /// Allowed headers; a wildcard echoes what the preflight asked for.
    pub fn headers_header(&self, requested: Option<&str>) -> String {
        if self.allowed_headers.iter().any(|h| h == "*") {
            if let Some(requested) = requested {
                return requested.to_string();
            }
        }
        self.allowed_headers.join(", ")
    }
}

use contractkit_bootstrap::AppConfig;
use serde::{Deserialize, Serialize};

/// Settings of the HTTP surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiIngressConfig {
    pub bind_addr: String,
    pub api_version: String,
    pub title: String,
    pub enable_docs: bool,
    pub docs_path: String,
    pub body_limit_bytes: usize,
    pub timeout_secs: u64,
}

impl Default for ApiIngressConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8087".to_string(),
            api_version: "v1".to_string(),
            title: "Contract API".to_string(),
            enable_docs: true,
            docs_path: "/docs".to_string(),
            body_limit_bytes: 16 * 1024 * 1024,
            timeout_secs: 30,
        }
    }
}

impl ApiIngressConfig {
    pub fn from_app_config(app: &AppConfig) -> Self {
        Self {
            bind_addr: app.bind_addr(),
            api_version: app.api.version.clone(),
            title: app.api.title.clone(),
            enable_docs: app.api.enable_docs,
            docs_path: app.api.docs_path.clone(),
            body_limit_bytes: app.api.body_limit_bytes,
            timeout_secs: app.api.timeout_secs,
        }
    }

    pub fn openapi_path(&self) -> String {
        format!("/api/{}/openapi", self.api_version)
    }

    pub fn openapi_hash_path(&self) -> String {
        format!("/api/{}/openapi-hash", self.api_version)
    }
}

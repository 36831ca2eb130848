//! Connection settings for an S3-compatible endpoint.

use serde::{Deserialize, Serialize};

/// Connection settings for the S3 backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// Custom endpoint (host[:port] or full URL). `None` uses AWS.
    pub endpoint: Option<String>,
    /// Signing region.
    pub region: String,
    /// Destination bucket.
    pub bucket: String,
    /// Key prefix prepended to every object key.
    pub prefix: String,
    /// Static access key. When absent the default credential chain is used.
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    /// Scheme used when `endpoint` has none.
    pub use_ssl: bool,
    /// Path-style addressing, required by most self-hosted services.
    pub force_path_style: bool,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".into(),
            bucket: String::new(),
            prefix: String::new(),
            access_key: None,
            secret_key: None,
            session_token: None,
            use_ssl: true,
            force_path_style: true,
        }
    }
}

impl S3Settings {
    /// Create settings for `bucket` with defaults for everything else.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Endpoint as a URL, adding a scheme from `use_ssl` when missing.
    pub fn endpoint_url(&self) -> Option<String> {
        let endpoint: &str = self.endpoint.as_deref()?.trim();
        if endpoint.is_empty() {
            return None;
        }
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Some(endpoint.trim_end_matches('/').to_string());
        }
        let scheme: &str = if self.use_ssl { "https" } else { "http" };
        Some(format!("{}://{}", scheme, endpoint.trim_end_matches('/')))
    }

    /// Static credentials, if both halves are configured.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (self.access_key.as_deref(), self.secret_key.as_deref()) {
            (Some(access), Some(secret)) if !access.is_empty() && !secret.is_empty() => {
                Some((access, secret))
            }
            _ => None,
        }
    }
}

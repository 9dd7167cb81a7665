//! HTTP transport configuration.

use std::time::Duration;

use gramline_core::{TransportError, TransportResult};

/// Default API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Configuration for [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Bot token, as issued by the platform (`<id>:<secret>`).
    pub token: String,
    /// API endpoint without a trailing slash.
    pub api_base: String,
    /// Per-request timeout. Must exceed the long-poll timeout.
    pub timeout: Duration,
    /// Timeout for downloading URL media before an upload.
    pub media_timeout: Duration,
    /// Optional proxy URL for every request.
    pub proxy: Option<String>,
}

impl HttpTransportConfig {
    /// Creates a configuration with default endpoint and timeouts.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(60),
            media_timeout: Duration::from_secs(60),
            proxy: None,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_media_timeout(mut self, timeout: Duration) -> Self {
        self.media_timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Returns the URL of `method`.
    pub fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// The token with its secret half hidden, for logs.
    pub fn masked_token(&self) -> String {
        mask_token(&self.token)
    }

    /// Checks the configuration before a client is built.
    pub fn validate(&self) -> TransportResult<()> {
        if self.token.trim().is_empty() {
            return Err(TransportError::InvalidConfig("bot token is empty".into()));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(TransportError::InvalidConfig(format!(
                "api base '{}' is not an http(s) URL",
                self.api_base
            )));
        }
        if self.timeout.is_zero() {
            return Err(TransportError::InvalidConfig(
                "request timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Hides everything after the bot id of a token.
pub fn mask_token(token: &str) -> String {
    match token.split_once(':') {
        Some((id, _)) => format!("{id}:***"),
        None => "***".to_string(),
    }
}

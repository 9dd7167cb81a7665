//! HTTP API client.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Proxy};
use serde_json::Value;
use tracing::{debug, info, warn};

use gramline_core::{ApiClient, ApiResult, Params, TransportError, TransportResult};

use super::envelope::decode_envelope;
use crate::config::HttpTransportConfig;
use crate::multipart::{EncodedBody, MultipartEncoder};

/// An [`ApiClient`] that talks to the platform over HTTPS.
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: Client,
    encoder: MultipartEncoder,
}

impl HttpTransport {
    /// Creates a transport.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] for an invalid configuration
    /// or proxy URL.
    pub fn new(config: HttpTransportConfig) -> TransportResult<Self> {
        config.validate()?;

        let mut builder = ClientBuilder::new().timeout(config.timeout);
        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| TransportError::InvalidConfig(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;
        let encoder = MultipartEncoder::new(client.clone(), config.media_timeout);

        info!(
            token = %config.masked_token(),
            api_base = %config.api_base,
            "HTTP transport created"
        );
        Ok(Self {
            config,
            client,
            encoder,
        })
    }

    /// Creates a transport with default settings for `token`.
    pub fn with_token(token: impl Into<String>) -> TransportResult<Self> {
        Self::new(HttpTransportConfig::new(token))
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// The token with its secret half hidden.
    pub fn masked_token(&self) -> String {
        self.config.masked_token()
    }

    /// Sends an encoded body and returns the status and raw response text.
    async fn send(&self, method: &str, body: EncodedBody) -> TransportResult<(u16, String)> {
        let request = self.client.post(self.config.method_url(method));
        let request = match body {
            EncodedBody::Json(json) => request.json(&json),
            EncodedBody::Multipart(multipart) => request.multipart(multipart.into_form()?),
        };

        // reqwest errors quote the URL, which holds the token.
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Http(e.without_url().to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Http(e.without_url().to_string()))?;
        Ok((status, text))
    }
}

#[async_trait]
impl ApiClient for HttpTransport {
    async fn request(&self, method: &str, params: Params) -> ApiResult<Value> {
        let body = self.encoder.encode(params).await?;
        debug!(method, content_type = body.content_type(), "Calling API");

        let (status, text) = self.send(method, body).await.inspect_err(|e| {
            warn!(method, error = %e, "API request failed");
        })?;
        let result = decode_envelope(method, status, &text);
        if let Err(e) = &result {
            debug!(method, status, error = %e, "API call returned an error");
        }
        result
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("token", &self.masked_token())
            .field("api_base", &self.config.api_base)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_token() {
        let transport = HttpTransport::with_token("42:very-secret").unwrap();
        let debug = format!("{transport:?}");
        assert!(debug.contains("42:***"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_invalid_proxy_is_rejected() {
        let config = HttpTransportConfig::new("42:x").with_proxy("http://[invalid");
        assert!(matches!(
            HttpTransport::new(config),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        let config = HttpTransportConfig::new("42:x")
            .with_api_base("http://127.0.0.1:9")
            .with_timeout(std::time::Duration::from_secs(2));
        let transport = HttpTransport::new(config).unwrap();

        let err = transport.request("getMe", Params::new()).await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(!err.to_string().contains("42:x"));
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, info};
use url::Url;

use super::{HttpReply, Transport};
use crate::config::{Protocol, PushConfig};
use crate::encoder::PushRequest;
use crate::{Error, Result};

/// Produces the client builder used on every (re)connect, so callers can
/// install TLS identities or proxies.
pub type ClientFactory = Arc<dyn Fn() -> ClientBuilder + Send + Sync>;

/// Request/response transport for the HTTP/2 gateway.
pub struct HttpTransport {
    base_url: Url,
    factory: ClientFactory,
    client: Option<Client>,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        Self::with_client_factory(
            base_url,
            request_timeout,
            Arc::new(|| Client::builder().use_rustls_tls()),
        )
    }

    pub fn with_client_factory(
        base_url: &str,
        request_timeout: Duration,
        factory: ClientFactory,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid gateway URL `{base_url}`: {e}")))?;
        Ok(Self {
            base_url,
            factory,
            client: None,
            request_timeout,
        })
    }

    pub fn from_config(config: &PushConfig) -> Result<Self> {
        Self::new(config.http_url(), config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("connected", &self.client.is_some())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn name(&self) -> &'static str {
        "http"
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    async fn write(&mut self, _frame: &[u8]) -> Result<usize> {
        Err(Error::unsupported("write", self.name()))
    }

    async fn poll_error(&mut self, _timeout: Duration) -> Result<Option<Bytes>> {
        Ok(None)
    }

    async fn request_response(&mut self, request: &PushRequest) -> Result<HttpReply> {
        let client = self.client.as_ref().ok_or(Error::NotConnected)?;
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|e| Error::validation(format!("invalid request path: {e}")))?;

        debug!(url = %url, "Posting notification");
        let response = client
            .post(url)
            .headers(request.headers.clone())
            .body(request.body.clone())
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(status, error = %e, "Unable to read the gateway reply body");
                String::new()
            }
        };
        Ok(HttpReply { status, body })
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.client = None;
        let client = (self.factory)().build()?;
        self.client = Some(client);
        info!(url = %self.base_url, "HTTP gateway client ready");
        Ok(())
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            info!(url = %self.base_url, "HTTP gateway client closed");
        }
    }
}

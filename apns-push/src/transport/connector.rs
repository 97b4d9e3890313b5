//! Stream connectors for the binary gateway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::config::PushConfig;
use crate::{Error, Result};

/// Opens the duplex stream used by [`super::StreamingTransport`].
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self) -> Result<Self::Stream>;

    /// `host:port` of the remote end, for logging.
    fn target(&self) -> String;
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }

    pub fn from_config(config: &PushConfig) -> Result<Self> {
        let (host, port) = config.gateway_address()?;
        Ok(Self::new(host, port, config.connect_timeout()))
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream> {
        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| Error::Timeout(format!("TCP connect to {}", self.target())))??;
        stream.set_nodelay(true)?;
        debug!(gateway = %self.target(), "TCP connection established");
        Ok(stream)
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TLS over TCP using an externally built `rustls` client configuration.
///
/// The binary gateway authenticates providers by client certificate, so the
/// configuration normally comes from [`client_config_with_identity`].
#[derive(Clone)]
pub struct TlsConnector {
    tcp: TcpConnector,
    tls_config: Arc<ClientConfig>,
}

impl TlsConnector {
    pub fn new(tcp: TcpConnector, tls_config: Arc<ClientConfig>) -> Self {
        Self { tcp, tls_config }
    }

    pub fn from_config(config: &PushConfig, tls_config: Arc<ClientConfig>) -> Result<Self> {
        Ok(Self::new(TcpConnector::from_config(config)?, tls_config))
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("tcp", &self.tcp)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for TlsConnector {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self) -> Result<Self::Stream> {
        let tcp_stream = self.tcp.connect().await?;

        let server_name = ServerName::try_from(self.tcp.host().to_owned())
            .map_err(|e| Error::config(format!("invalid server name: {e}")))?;

        let connector = tokio_rustls::TlsConnector::from(self.tls_config.clone());
        let tls_stream = timeout(
            self.tcp.connect_timeout,
            connector.connect(server_name, tcp_stream),
        )
        .await
        .map_err(|_| Error::Timeout(format!("TLS handshake with {}", self.target())))??;

        debug!(gateway = %self.target(), "TLS handshake completed");
        Ok(tls_stream)
    }

    fn target(&self) -> String {
        self.tcp.target()
    }
}

fn root_store() -> RootCertStore {
    RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    }
}

fn client_builder() -> Result<rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>> {
    ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::config(format!("TLS protocol versions: {e}")))
}

/// Client configuration trusting the webpki roots, without a client identity.
pub fn default_client_config() -> Result<ClientConfig> {
    Ok(client_builder()?
        .with_root_certificates(root_store())
        .with_no_client_auth())
}

/// Client configuration presenting a provider certificate to the gateway.
pub fn client_config_with_identity(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ClientConfig> {
    client_builder()?
        .with_root_certificates(root_store())
        .with_client_auth_cert(cert_chain, key)
        .map_err(|e| Error::config(format!("client certificate: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connector_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connector = TcpConnector::new("127.0.0.1", port, Duration::from_secs(1));

        let (accepted, connected) = tokio::join!(listener.accept(), connector.connect());
        assert!(accepted.is_ok());
        assert!(connected.is_ok());
        assert_eq!(connector.target(), format!("127.0.0.1:{port}"));
    }

    #[tokio::test]
    async fn test_tcp_connector_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = TcpConnector::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(matches!(
            connector.connect().await,
            Err(Error::Io(_)) | Err(Error::Timeout(_))
        ));
    }

    #[test]
    fn test_default_client_config() {
        let config = default_client_config().unwrap();
        assert!(config.alpn_protocols.is_empty());
    }
}

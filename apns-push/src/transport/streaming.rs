use std::time::Duration;

use apns_wire::ERROR_RESPONSE_SIZE;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{Connector, HttpReply, Transport};
use crate::config::Protocol;
use crate::encoder::PushRequest;
use crate::{Error, Result};

/// Long-lived duplex stream to the binary gateway.
pub struct StreamingTransport<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
    write_timeout: Duration,
}

impl<C: Connector> StreamingTransport<C> {
    pub fn new(connector: C, write_timeout: Duration) -> Self {
        Self {
            connector,
            stream: None,
            write_timeout,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn stream_mut(&mut self) -> Result<&mut C::Stream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl<C: Connector> Transport for StreamingTransport<C> {
    fn protocol(&self) -> Protocol {
        Protocol::Binary
    }

    fn name(&self) -> &'static str {
        "streaming"
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn write(&mut self, frame: &[u8]) -> Result<usize> {
        let write_timeout = self.write_timeout;
        let stream = self.stream_mut()?;

        let written = timeout(write_timeout, async {
            let mut written = 0;
            while written < frame.len() {
                let n = stream.write(&frame[written..]).await?;
                if n == 0 {
                    break;
                }
                written += n;
            }
            stream.flush().await?;
            Ok::<_, std::io::Error>(written)
        })
        .await
        .map_err(|_| Error::Timeout(format!("writing {} bytes", frame.len())))??;

        Ok(written)
    }

    async fn poll_error(&mut self, wait: Duration) -> Result<Option<Bytes>> {
        let stream = self.stream_mut()?;
        let mut buf = [0u8; ERROR_RESPONSE_SIZE];

        let first = match timeout(wait, stream.read(&mut buf)).await {
            Err(_) => return Ok(None),
            Ok(read) => read?,
        };
        if first == 0 {
            debug!("Gateway closed the stream without an error-response frame");
            return Ok(None);
        }

        // The frame may arrive split; finish it within the same bound.
        let mut filled = first;
        while filled < ERROR_RESPONSE_SIZE {
            match timeout(wait, stream.read(&mut buf[filled..])).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        Ok(Some(Bytes::copy_from_slice(&buf[..filled])))
    }

    async fn request_response(&mut self, _request: &PushRequest) -> Result<HttpReply> {
        Err(Error::unsupported("request_response", self.name()))
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.close().await;
        let stream = self.connector.connect().await?;
        self.stream = Some(stream);
        info!(gateway = %self.connector.target(), "Connected to binary gateway");
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                warn!(error = %e, "Failed to shut down gateway stream cleanly");
            }
            info!(gateway = %self.connector.target(), "Disconnected from binary gateway");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TcpConnector;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (StreamingTransport<TcpConnector>, tokio::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut transport = StreamingTransport::new(
            TcpConnector::new("127.0.0.1", port, Duration::from_secs(1)),
            Duration::from_secs(1),
        );
        let (accepted, connected) = tokio::join!(listener.accept(), transport.reconnect());
        connected.unwrap();
        (transport, accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_not_connected() {
        let mut transport = StreamingTransport::new(
            TcpConnector::new("127.0.0.1", 1, Duration::from_millis(100)),
            Duration::from_secs(1),
        );
        assert!(!transport.is_connected());
        assert!(matches!(transport.write(b"x").await, Err(Error::NotConnected)));
        assert!(matches!(
            transport.poll_error(Duration::ZERO).await,
            Err(Error::NotConnected)
        ));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_write_and_poll() {
        let (mut transport, mut peer) = connected_pair().await;
        assert!(transport.is_connected());

        assert_eq!(transport.write(b"hello").await.unwrap(), 5);
        let mut received = [0u8; 5];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"hello");

        assert_eq!(
            transport.poll_error(Duration::from_millis(20)).await.unwrap(),
            None
        );

        peer.write_all(&[8, 8, 0, 0]).await.unwrap();
        peer.write_all(&[0, 3]).await.unwrap();
        let raw = transport
            .poll_error(Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&raw[..], &[8, 8, 0, 0, 0, 3]);
    }

    #[tokio::test]
    async fn test_poll_returns_partial_frame_on_eof() {
        let (mut transport, mut peer) = connected_pair().await;
        peer.write_all(&[8, 8, 0]).await.unwrap();
        drop(peer);

        let raw = transport
            .poll_error(Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw.len(), 3);
    }

    #[tokio::test]
    async fn test_request_response_unsupported() {
        let (mut transport, _peer) = connected_pair().await;
        let request = PushRequest {
            path: "/3/device/x".to_string(),
            headers: Default::default(),
            body: Bytes::new(),
        };
        assert!(matches!(
            transport.request_response(&request).await,
            Err(Error::Unsupported { .. })
        ));
        transport.close().await;
        transport.close().await;
        assert!(!transport.is_connected());
    }
}

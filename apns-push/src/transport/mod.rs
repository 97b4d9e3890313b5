//! Gateway transports.
//!
//! The delivery engine talks to the gateway only through [`Transport`]. Two
//! implementations exist:
//!
//! - [`StreamingTransport`] keeps one duplex stream open and pipelines binary
//!   frames over it. Failures come back asynchronously as error-response frames.
//! - [`HttpTransport`] performs one request per notification and reports the
//!   outcome synchronously in the reply.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;
use crate::config::Protocol;
use crate::encoder::PushRequest;

pub mod connector;
pub mod http;
pub mod streaming;

pub use connector::{Connector, TcpConnector, TlsConnector};
pub use http::{ClientFactory, HttpTransport};
pub use streaming::StreamingTransport;

/// Status line and body of an HTTP gateway reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait Transport: Send {
    fn protocol(&self) -> Protocol;

    /// Short name used in logs and `Unsupported` errors.
    fn name(&self) -> &'static str;

    fn is_connected(&self) -> bool;

    /// Writes one frame and returns the number of bytes accepted.
    ///
    /// A short write is reported by returning fewer bytes than `frame.len()`.
    async fn write(&mut self, frame: &[u8]) -> Result<usize>;

    /// Waits up to `timeout` for inbound data and reads at most one
    /// error-response frame. Returns `None` when nothing arrived in time.
    async fn poll_error(&mut self, timeout: Duration) -> Result<Option<Bytes>>;

    /// Performs a single request and returns the gateway reply.
    async fn request_response(&mut self, request: &PushRequest) -> Result<HttpReply>;

    /// Tears down any existing connection and establishes a new one to the
    /// same target.
    async fn reconnect(&mut self) -> Result<()>;

    /// Closes the connection. Calling it on a closed transport is a no-op.
    async fn close(&mut self);
}

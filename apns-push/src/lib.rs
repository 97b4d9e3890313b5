//! Push notification delivery to the Apple Push Notification service.
//!
//! Notifications are built with [`Message`], queued on a [`Push`] engine and
//! sent over either the legacy binary gateway or the HTTP/2 gateway. The
//! engine tracks every notification until it is delivered or has failed
//! permanently, resending after gateway errors within a bounded retry budget.
//!
//! ```no_run
//! use apns_push::{Message, Push, PushConfig};
//!
//! # async fn run() -> apns_push::Result<()> {
//! let mut push = Push::from_config(PushConfig::from_env_or_default(), None)?;
//! push.connect().await?;
//!
//! let message = Message::for_recipient(
//!     "1e82db91c7ceddd72bf33d74ae052ac9c84a065b35148ac401388843106a7485",
//! )?
//! .with_text("Hello")
//! .with_badge(3);
//! push.add(&message)?;
//!
//! let report = push.send().await?;
//! for failed in push.drain_errors() {
//!     eprintln!("{} failed: {:?}", failed.sequence_id, failed.last_error());
//! }
//! # let _ = report;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod correlator;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod message;
pub mod notification;
pub mod push;
pub mod transport;

pub use config::{Environment, Protocol, PushConfig};
pub use error::{Error, Result};
pub use message::{Alert, Message, Priority, PushType};
pub use notification::{DeliveryError, PendingNotification};
pub use push::{Push, SendReport};
pub use transport::{HttpTransport, StreamingTransport, TcpConnector, TlsConnector, Transport};

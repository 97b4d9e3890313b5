//! Engine and transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result};

/// Gateway environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    Production,
    #[default]
    Sandbox,
}

impl Environment {
    /// Host and port of the binary gateway.
    pub fn gateway_address(&self) -> (&'static str, u16) {
        match self {
            Self::Production => ("gateway.push.apple.com", 2195),
            Self::Sandbox => ("gateway.sandbox.push.apple.com", 2195),
        }
    }

    /// Base URL of the HTTP/2 gateway.
    pub fn http_url(&self) -> &'static str {
        match self {
            Self::Production => "https://api.push.apple.com:443",
            Self::Sandbox => "https://api.development.push.apple.com:443",
        }
    }
}

/// Wire protocol used to talk to the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Protocol {
    /// Persistent socket with pipelined binary frames.
    Binary,
    /// One HTTP/2 request per notification.
    #[default]
    Http,
}

/// Configuration for [`crate::Push`] and the transports it drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub environment: Environment,
    pub protocol: Protocol,
    /// Failed attempts recorded for a notification before it is given up on.
    pub send_retry_times: u32,
    /// Connection attempts made by `connect()`.
    pub connect_retry_times: u32,
    pub connect_retry_interval_ms: u64,
    /// Bounded wait for an error-response frame after a pass.
    pub socket_select_timeout_ms: u64,
    /// Pause after each written notification.
    pub write_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Bearer token for token-based HTTP authentication.
    pub provider_token: Option<String>,
    /// `host:port` replacing the binary gateway address of the environment.
    pub gateway_override: Option<String>,
    /// Base URL replacing the HTTP gateway URL of the environment.
    pub http_url_override: Option<String>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            protocol: Protocol::default(),
            send_retry_times: 3,
            connect_retry_times: 3,
            connect_retry_interval_ms: 1000,
            socket_select_timeout_ms: 1000,
            write_interval_ms: 10,
            connect_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            provider_token: None,
            gateway_override: None,
            http_url_override: None,
        }
    }
}

impl PushConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `APNS_ENVIRONMENT` ("production" or "sandbox")
    /// - `APNS_PROTOCOL` ("binary" or "http")
    /// - `APNS_SEND_RETRY_TIMES`
    /// - `APNS_WRITE_INTERVAL_MS`
    /// - `APNS_SOCKET_SELECT_TIMEOUT_MS`
    /// - `APNS_PROVIDER_TOKEN`
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("APNS_ENVIRONMENT")
            && let Ok(parsed) = value.trim().parse::<Environment>()
        {
            config.environment = parsed;
        }

        if let Ok(value) = std::env::var("APNS_PROTOCOL")
            && let Ok(parsed) = value.trim().parse::<Protocol>()
        {
            config.protocol = parsed;
        }

        if let Ok(value) = std::env::var("APNS_SEND_RETRY_TIMES")
            && let Ok(parsed) = value.trim().parse::<u32>()
        {
            config.send_retry_times = parsed;
        }

        if let Ok(value) = std::env::var("APNS_WRITE_INTERVAL_MS")
            && let Ok(parsed) = value.trim().parse::<u64>()
        {
            config.write_interval_ms = parsed;
        }

        if let Ok(value) = std::env::var("APNS_SOCKET_SELECT_TIMEOUT_MS")
            && let Ok(parsed) = value.trim().parse::<u64>()
        {
            config.socket_select_timeout_ms = parsed;
        }

        if let Ok(token) = std::env::var("APNS_PROVIDER_TOKEN")
            && !token.trim().is_empty()
        {
            config.provider_token = Some(token.trim().to_string());
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.send_retry_times == 0 {
            return Err(Error::config("send_retry_times must be at least 1"));
        }
        if self.connect_retry_times == 0 {
            return Err(Error::config("connect_retry_times must be at least 1"));
        }
        if let Some(address) = &self.gateway_override
            && address.rsplit_once(':').is_none()
        {
            return Err(Error::config(format!(
                "gateway_override `{address}` must be host:port"
            )));
        }
        Ok(())
    }

    /// Binary gateway address, honouring the override.
    pub fn gateway_address(&self) -> Result<(String, u16)> {
        match &self.gateway_override {
            Some(address) => {
                let (host, port) = address.rsplit_once(':').ok_or_else(|| {
                    Error::config(format!("gateway_override `{address}` must be host:port"))
                })?;
                let port = port
                    .parse::<u16>()
                    .map_err(|e| Error::config(format!("invalid gateway port `{port}`: {e}")))?;
                Ok((host.to_string(), port))
            }
            None => {
                let (host, port) = self.environment.gateway_address();
                Ok((host.to_string(), port))
            }
        }
    }

    /// HTTP gateway base URL, honouring the override.
    pub fn http_url(&self) -> &str {
        self.http_url_override
            .as_deref()
            .unwrap_or_else(|| self.environment.http_url())
    }

    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_interval_ms)
    }

    pub fn socket_select_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_select_timeout_ms)
    }

    pub fn write_interval(&self) -> Duration {
        Duration::from_millis(self.write_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

//! The delivery engine.
//!
//! [`Push`] owns a queue of [`PendingNotification`]s keyed by sequence id and
//! drains it in passes. Each pass writes every queued notification in id
//! order; the gateway reports only the first notification it rejected, so on
//! a failure everything below that id is known to be delivered, the failed
//! entry records the error, and everything above it is resent in the next
//! pass after a reconnect.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use rustls::ClientConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Protocol, PushConfig};
use crate::correlator::{self, ErrorSignal, StatusClass};
use crate::encoder;
use crate::message::Message;
use crate::notification::PendingNotification;
use crate::transport::{
    HttpTransport, StreamingTransport, TlsConnector, Transport, connector::default_client_config,
};
use crate::{Error, Result};

/// Summary of one [`Push::send`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Number of passes over the queue.
    pub runs: u32,
    /// Notifications confirmed, or implied, delivered.
    pub delivered: usize,
    /// Notifications moved to the error set.
    pub failed: usize,
    /// The run stopped early because the cancellation token fired.
    pub interrupted: bool,
}

enum PassOutcome {
    Clean,
    Signal(ErrorSignal),
    Interrupted,
}

/// Queue-driven notification sender bound to one transport.
pub struct Push {
    config: PushConfig,
    transport: Box<dyn Transport>,
    queue: BTreeMap<u32, PendingNotification>,
    errors: BTreeMap<u32, PendingNotification>,
    last_sequence_id: u32,
    cancel: CancellationToken,
}

impl Push {
    pub fn new(config: PushConfig, transport: Box<dyn Transport>) -> Result<Self> {
        config.validate()?;
        if transport.protocol() != config.protocol {
            return Err(Error::config(format!(
                "{} transport cannot serve the {} protocol",
                transport.name(),
                config.protocol
            )));
        }
        Ok(Self {
            config,
            transport,
            queue: BTreeMap::new(),
            errors: BTreeMap::new(),
            last_sequence_id: 0,
            cancel: CancellationToken::new(),
        })
    }

    /// Builds the transport selected by `config.protocol`.
    ///
    /// The binary gateway uses `tls_config` when given, otherwise a
    /// configuration without a client certificate.
    pub fn from_config(config: PushConfig, tls_config: Option<Arc<ClientConfig>>) -> Result<Self> {
        let transport: Box<dyn Transport> = match config.protocol {
            Protocol::Binary => {
                let tls_config = match tls_config {
                    Some(tls_config) => tls_config,
                    None => Arc::new(default_client_config()?),
                };
                Box::new(StreamingTransport::new(
                    TlsConnector::from_config(&config, tls_config)?,
                    config.write_timeout(),
                ))
            }
            Protocol::Http => Box::new(HttpTransport::from_config(&config)?),
        };
        Self::new(config, transport)
    }

    /// Replaces the cancellation token checked between writes.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Connects to the gateway, retrying up to `connect_retry_times` attempts.
    pub async fn connect(&mut self) -> Result<()> {
        let attempts = self.config.connect_retry_times.max(1);
        let mut attempt = 1;
        loop {
            info!(
                protocol = %self.config.protocol,
                environment = %self.config.environment,
                "Trying to initialize connection..."
            );
            match self.transport.reconnect().await {
                Ok(()) => {
                    info!("Connected to Push Notification Service");
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(error = %e, "Unable to connect, retry to connect ({attempt}/{attempts})...");
                    attempt += 1;
                    tokio::time::sleep(self.config.connect_retry_interval()).await;
                }
                Err(e) => {
                    error!(error = %e, "Unable to connect after {attempts} attempt(s)");
                    return Err(e);
                }
            }
        }
    }

    pub async fn disconnect(&mut self) {
        self.transport.close().await;
    }

    /// Queues one notification per recipient and returns the assigned ids.
    pub fn add(&mut self, message: &Message) -> Result<Vec<u32>> {
        if message.recipients_count() == 0 {
            return Err(Error::validation("No recipient for the message"));
        }
        let payload = message.payload()?;

        let mut pending = Vec::with_capacity(message.recipients_count());
        for recipient in message.recipients() {
            let sequence_id = self.next_sequence_id()?;
            let frame = match self.config.protocol {
                Protocol::Binary => Some(encoder::encode_binary(
                    recipient,
                    &payload,
                    sequence_id,
                    message.expiry().unwrap_or(0),
                )?),
                Protocol::Http => None,
            };
            pending.push(PendingNotification::new(
                sequence_id,
                recipient.clone(),
                payload.clone(),
                message,
                frame,
            ));
        }

        let ids = pending.iter().map(|n| n.sequence_id).collect();
        for notification in pending {
            self.queue.insert(notification.sequence_id, notification);
        }
        Ok(ids)
    }

    fn next_sequence_id(&mut self) -> Result<u32> {
        let next = self
            .last_sequence_id
            .checked_add(1)
            .ok_or(Error::SequenceExhausted)?;
        self.last_sequence_id = next;
        Ok(next)
    }

    /// Sends every queued notification, resending after gateway errors until
    /// the queue is empty.
    pub async fn send(&mut self) -> Result<SendReport> {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }
        if self.queue.is_empty() {
            return Err(Error::EmptyQueue);
        }

        let mut report = SendReport::default();
        while !self.queue.is_empty() {
            if self.cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            report.runs += 1;
            info!(
                "Sending messages queue, run #{}: {} message(s) left in queue.",
                report.runs,
                self.queue.len()
            );

            match self.run_pass(&mut report).await? {
                PassOutcome::Clean => {
                    report.delivered += self.queue.len();
                    self.queue.clear();
                }
                PassOutcome::Signal(signal) => self.apply_signal(signal, &mut report).await,
                PassOutcome::Interrupted => {
                    report.interrupted = true;
                    break;
                }
            }
        }

        if report.interrupted {
            warn!(left = self.queue.len(), "Send interrupted");
        }
        Ok(report)
    }

    async fn run_pass(&mut self, report: &mut SendReport) -> Result<PassOutcome> {
        let protocol = self.config.protocol;
        let ids: Vec<u32> = self.queue.keys().copied().collect();

        for id in ids {
            if self.cancel.is_cancelled() {
                return Ok(PassOutcome::Interrupted);
            }
            let Some(entry) = self.queue.get(&id) else {
                continue;
            };
            let label = entry.custom_identifier_label();

            let settled = entry.errors.iter().map(|e| e.status_code).find(|code| {
                matches!(
                    correlator::classify(protocol, *code),
                    StatusClass::Success | StatusClass::Fatal
                )
            });
            if let Some(status) = settled {
                if correlator::classify(protocol, status) == StatusClass::Success {
                    info!("Message ID {id} {label} has no error ({status}), removing from queue...");
                    self.queue.remove(&id);
                    report.delivered += 1;
                } else {
                    warn!(
                        "Message ID {id} {label} has an unrecoverable error ({status}), removing from queue without retrying..."
                    );
                    self.move_to_errors(id);
                    report.failed += 1;
                }
                continue;
            }

            let attempts = entry.errors.len();
            if attempts >= self.config.send_retry_times as usize {
                warn!("Message ID {id} {label} has {attempts} errors, removing from queue...");
                self.move_to_errors(id);
                report.failed += 1;
                continue;
            }

            let local = match protocol {
                Protocol::Binary => self.write_entry(id).await,
                Protocol::Http => match self.call_entry(id).await {
                    Ok(true) => {
                        self.queue.remove(&id);
                        report.delivered += 1;
                        None
                    }
                    Ok(false) => None,
                    Err(signal) => Some(signal),
                },
            };

            if let Some(local) = local {
                let stream = match self.transport.poll_error(std::time::Duration::ZERO).await {
                    Ok(raw) => raw.as_deref().and_then(correlator::decode_frame),
                    Err(e) => {
                        debug!(error = %e, "Unable to drain the error stream");
                        None
                    }
                };
                if let Some(signal) = correlator::reconcile(Some(local), stream) {
                    return Ok(PassOutcome::Signal(signal));
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(PassOutcome::Interrupted),
                _ = tokio::time::sleep(self.config.write_interval()) => {}
            }
        }

        if protocol == Protocol::Binary {
            let raw = match self
                .transport
                .poll_error(self.config.socket_select_timeout())
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    error!(error = %e, "Unable to wait for a stream availability.");
                    return Err(e);
                }
            };
            if let Some(signal) = raw.as_deref().and_then(correlator::decode_frame) {
                return Ok(PassOutcome::Signal(signal));
            }
        }

        Ok(PassOutcome::Clean)
    }

    /// Writes the binary frame of a queued entry; returns the local failure, if any.
    async fn write_entry(&mut self, id: u32) -> Option<ErrorSignal> {
        let entry = self.queue.get(&id)?;
        let frame: Bytes = match &entry.frame {
            Some(frame) => frame.clone(),
            None => match encoder::encode_binary(
                &entry.recipient,
                &entry.payload,
                id,
                entry.expiry.unwrap_or(0),
            ) {
                Ok(frame) => frame,
                Err(e) => return Some(correlator::internal(id, e.to_string())),
            },
        };

        debug!(
            "Sending message ID {id} {} ({}/{}): {} bytes.",
            entry.custom_identifier_label(),
            entry.errors.len() + 1,
            self.config.send_retry_times,
            frame.len()
        );

        match self.transport.write(&frame).await {
            Ok(written) if written == frame.len() => None,
            Ok(written) => Some(correlator::internal(
                id,
                format!("{written} bytes written instead of {} bytes", frame.len()),
            )),
            Err(e) => Some(correlator::internal(id, e.to_string())),
        }
    }

    /// Performs the HTTP call for a queued entry.
    ///
    /// `Ok(true)` when the gateway accepted it; `Err` carries the failure signal.
    async fn call_entry(&mut self, id: u32) -> std::result::Result<bool, ErrorSignal> {
        let Some(entry) = self.queue.get(&id) else {
            return Ok(false);
        };

        debug!(
            "Sending message ID {id} {} ({}/{}): {} bytes.",
            entry.custom_identifier_label(),
            entry.errors.len() + 1,
            self.config.send_retry_times,
            entry.payload.len()
        );

        let request = encoder::encode_request(entry, self.config.provider_token.as_deref())
            .map_err(|e| correlator::internal(id, e.to_string()))?;

        match self.transport.request_response(&request).await {
            Ok(reply) => match correlator::from_response(id, reply.status, &reply.body) {
                None => Ok(true),
                Some(signal) => Err(signal),
            },
            Err(e) => Err(correlator::internal(id, e.to_string())),
        }
    }

    /// Rebuilds the queue around a failed id and reconnects.
    ///
    /// A signal naming an id below every queued id is charged to the lowest
    /// queued entry as an internal error, so stale frames still spend the
    /// retry budget.
    async fn apply_signal(&mut self, mut signal: ErrorSignal, report: &mut SendReport) {
        error!(
            "Unable to send message ID {}: {} ({}).",
            signal.sequence_id, signal.status_text, signal.status_code
        );

        if let Some(&lowest) = self.queue.keys().next()
            && signal.sequence_id < lowest
        {
            warn!(
                sequence_id = signal.sequence_id,
                "Signal names no queued notification, charging message ID {lowest}"
            );
            signal = correlator::internal(
                lowest,
                format!(
                    "stale error response for message ID {} ({})",
                    signal.sequence_id, signal.status_code
                ),
            );
        }

        let mut next = BTreeMap::new();
        for (id, mut entry) in std::mem::take(&mut self.queue) {
            if id < signal.sequence_id {
                report.delivered += 1;
                continue;
            }
            if id == signal.sequence_id {
                entry.record_error(&signal);
            }
            next.insert(id, entry);
        }
        self.queue = next;

        if let Err(e) = self.transport.reconnect().await {
            warn!(error = %e, "Reconnect failed, the next write will report it");
        }
    }

    fn move_to_errors(&mut self, id: u32) {
        if let Some(entry) = self.queue.remove(&id) {
            self.errors.insert(id, entry);
        }
    }

    /// Removes a queued notification, optionally parking it in the error set.
    pub fn remove_from_queue(&mut self, sequence_id: u32, to_errors: bool) -> Result<()> {
        if sequence_id == 0 {
            return Err(Error::InvalidMessageId(sequence_id));
        }
        let entry = self
            .queue
            .remove(&sequence_id)
            .ok_or(Error::UnknownMessageId(sequence_id))?;
        if to_errors {
            self.errors.insert(sequence_id, entry);
        }
        Ok(())
    }

    /// Takes every queued notification, in id order.
    pub fn drain_queue(&mut self) -> Vec<PendingNotification> {
        std::mem::take(&mut self.queue).into_values().collect()
    }

    /// Takes every notification that failed permanently, in id order.
    pub fn drain_errors(&mut self) -> Vec<PendingNotification> {
        std::mem::take(&mut self.errors).into_values().collect()
    }

    pub fn queued(&self) -> impl Iterator<Item = &PendingNotification> {
        self.queue.values()
    }

    pub fn errors(&self) -> impl Iterator<Item = &PendingNotification> {
        self.errors.values()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

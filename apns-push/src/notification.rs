//! Queue entries owned by the delivery engine.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correlator::ErrorSignal;
use crate::message::{Message, Priority, PushType};

/// A failed delivery attempt recorded against a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryError {
    pub sequence_id: u32,
    pub status_code: u16,
    pub status_text: String,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryError {
    pub fn from_signal(signal: &ErrorSignal) -> Self {
        Self {
            sequence_id: signal.sequence_id,
            status_code: signal.status_code,
            status_text: signal.status_text.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Request metadata copied from the [`Message`] when it is queued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub topic: Option<String>,
    pub priority: Option<Priority>,
    pub collapse_id: Option<String>,
    pub custom_identifier: Option<Uuid>,
    pub push_type: Option<PushType>,
}

impl RequestMeta {
    pub fn from_message(message: &Message) -> Self {
        Self {
            topic: message.topic().map(str::to_string),
            priority: message.priority(),
            collapse_id: message.collapse_id().map(str::to_string),
            custom_identifier: message.custom_identifier(),
            push_type: message.push_type(),
        }
    }
}

/// A notification waiting in the engine queue, or parked in the error set.
#[derive(Debug, Clone)]
pub struct PendingNotification {
    pub sequence_id: u32,
    pub recipient: String,
    pub payload: Bytes,
    /// Relative expiry in seconds, as set on the message.
    pub expiry: Option<i64>,
    pub meta: RequestMeta,
    pub errors: Vec<DeliveryError>,
    pub queued_at: DateTime<Utc>,
    /// Pre-encoded binary frame; absent for the HTTP protocol.
    pub(crate) frame: Option<Bytes>,
}

impl PendingNotification {
    pub(crate) fn new(
        sequence_id: u32,
        recipient: String,
        payload: Bytes,
        message: &Message,
        frame: Option<Bytes>,
    ) -> Self {
        Self {
            sequence_id,
            recipient,
            payload,
            expiry: message.expiry(),
            meta: RequestMeta::from_message(message),
            errors: Vec::new(),
            queued_at: Utc::now(),
            frame,
        }
    }

    pub fn last_error(&self) -> Option<&DeliveryError> {
        self.errors.last()
    }

    /// Label used in log lines.
    pub fn custom_identifier_label(&self) -> String {
        match self.meta.custom_identifier {
            Some(id) => format!("[custom identifier: {id}]"),
            None => "[custom identifier: unset]".to_string(),
        }
    }

    pub(crate) fn record_error(&mut self, signal: &ErrorSignal) {
        self.errors.push(DeliveryError::from_signal(signal));
    }
}

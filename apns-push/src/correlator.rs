//! Error correlation: turns gateway feedback into [`ErrorSignal`]s and decides
//! which signal describes the first failed notification.

use apns_wire::{
    ErrorResponse, STATUS_CODE_INTERNAL_ERROR, binary_status_text, http_status_text,
};
use tracing::debug;

use crate::config::Protocol;

/// Normalized outcome for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSignal {
    pub sequence_id: u32,
    pub status_code: u16,
    pub status_text: String,
}

impl ErrorSignal {
    pub fn new(sequence_id: u32, status_code: u16, status_text: impl Into<String>) -> Self {
        Self {
            sequence_id,
            status_code,
            status_text: status_text.into(),
        }
    }
}

/// How the engine treats a recorded status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The gateway accepted the notification.
    Success,
    /// Permanent rejection, never retried.
    Fatal,
    /// Retried until the retry budget is spent.
    Transient,
    /// Local failure, retried like a transient status.
    Internal,
}

/// Decodes a raw error-response frame read from the binary gateway.
///
/// Frames of the wrong size or with an unexpected command byte yield `None`.
pub fn decode_frame(raw: &[u8]) -> Option<ErrorSignal> {
    match ErrorResponse::parse(raw) {
        Ok(response) => {
            let status = u16::from(response.status);
            Some(ErrorSignal::new(
                response.sequence_id,
                status,
                binary_status_text(status),
            ))
        }
        Err(e) => {
            debug!(error = %e, len = raw.len(), "Discarding malformed error-response frame");
            None
        }
    }
}

/// Converts an HTTP gateway reply into a signal; successful replies yield `None`.
pub fn from_response(sequence_id: u32, status: u16, body: &str) -> Option<ErrorSignal> {
    if (200..300).contains(&status) {
        return None;
    }
    let text = if body.trim().is_empty() {
        http_status_text(status).to_string()
    } else {
        body.to_string()
    };
    Some(ErrorSignal::new(sequence_id, status, text))
}

/// Signal for a failure raised locally, e.g. a short write.
pub fn internal(sequence_id: u32, detail: impl AsRef<str>) -> ErrorSignal {
    ErrorSignal::new(
        sequence_id,
        STATUS_CODE_INTERNAL_ERROR,
        format!(
            "{} ({})",
            binary_status_text(STATUS_CODE_INTERNAL_ERROR),
            detail.as_ref()
        ),
    )
}

/// Picks the signal describing the earliest failure.
///
/// When both exist the stream signal wins if its sequence id is lower than or
/// equal to the locally raised one.
pub fn reconcile(local: Option<ErrorSignal>, stream: Option<ErrorSignal>) -> Option<ErrorSignal> {
    match (local, stream) {
        (Some(local), Some(stream)) => {
            if stream.sequence_id <= local.sequence_id {
                Some(stream)
            } else {
                Some(local)
            }
        }
        (Some(local), None) => Some(local),
        (None, stream) => stream,
    }
}

/// Classifies a status code for the given protocol.
pub fn classify(protocol: Protocol, status_code: u16) -> StatusClass {
    if status_code == STATUS_CODE_INTERNAL_ERROR {
        return StatusClass::Internal;
    }
    match protocol {
        Protocol::Binary => match status_code {
            0 => StatusClass::Success,
            2..=8 => StatusClass::Fatal,
            _ => StatusClass::Transient,
        },
        Protocol::Http => match status_code {
            0 | 200..=299 => StatusClass::Success,
            400 | 405 | 410 | 413 => StatusClass::Fatal,
            _ => StatusClass::Transient,
        },
    }
}

//! Turns queued notifications into binary frames or HTTP request descriptors.

use apns_wire::NotificationFrame;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::notification::PendingNotification;
use crate::{Error, Result};

/// A single HTTP gateway call.
#[derive(Debug, Clone)]
pub struct PushRequest {
    /// Path relative to the gateway base URL.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Encodes a binary gateway frame. `expiry_secs` is relative to now.
pub fn encode_binary(
    recipient: &str,
    payload: &Bytes,
    sequence_id: u32,
    expiry_secs: i64,
) -> Result<Bytes> {
    let frame = NotificationFrame::new(
        recipient,
        payload.clone(),
        sequence_id,
        expiry_secs,
        Utc::now().timestamp(),
    )?;
    Ok(apns_wire::encode_notification(&frame)?.freeze())
}

/// Builds the HTTP request for a queued notification.
pub fn encode_request(
    notification: &PendingNotification,
    provider_token: Option<&str>,
) -> Result<PushRequest> {
    let meta = &notification.meta;
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(topic) = meta.topic.as_deref().filter(|t| !t.is_empty()) {
        headers.insert("apns-topic", header_value("apns-topic", topic)?);
    }
    if let Some(expiry) = notification.expiry.filter(|e| *e > 0) {
        let at = notification.queued_at.timestamp().saturating_add(expiry);
        headers.insert("apns-expiration", HeaderValue::from(at));
    }
    if let Some(priority) = meta.priority {
        headers.insert(
            "apns-priority",
            HeaderValue::from_static(priority.as_header_value()),
        );
    }
    if let Some(collapse_id) = meta.collapse_id.as_deref().filter(|c| !c.is_empty()) {
        headers.insert("apns-collapse-id", header_value("apns-collapse-id", collapse_id)?);
    }
    if let Some(id) = meta.custom_identifier {
        headers.insert("apns-id", header_value("apns-id", &id.to_string())?);
    }
    if let Some(push_type) = meta.push_type {
        headers.insert("apns-push-type", header_value("apns-push-type", &push_type.to_string())?);
    }
    if let Some(token) = provider_token.filter(|t| !t.is_empty()) {
        let mut value = header_value("authorization", &format!("Bearer {token}"))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(PushRequest {
        path: format!("/3/device/{}", notification.recipient),
        headers,
        body: notification.payload.clone(),
    })
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::validation(format!("Invalid value for header {name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, Priority, PushType};
    use uuid::Uuid;

    const TOKEN: &str = "aaaadb91c7ceddd72bf33d74ae052ac9c84a065b35148ac401388843106a0000";

    fn pending(message: &Message) -> PendingNotification {
        PendingNotification::new(
            1,
            TOKEN.to_string(),
            message.payload().unwrap(),
            message,
            None,
        )
    }

    #[test]
    fn test_encode_binary_round_trip() {
        let payload = Bytes::from_static(br#"{"aps":{"alert":"Hi"}}"#);
        let frame = encode_binary(TOKEN, &payload, 9, 30).unwrap();
        let parsed = NotificationFrame::parse(&frame).unwrap();

        assert_eq!(parsed.sequence_id, 9);
        assert_eq!(parsed.device_token_hex(), TOKEN);
        assert_eq!(parsed.payload, payload);
        assert!(parsed.expiry > 0);
    }

    #[test]
    fn test_encode_binary_rejects_oversized_payload() {
        let payload = Bytes::from(vec![b'x'; apns_wire::BINARY_PAYLOAD_MAXIMUM_SIZE + 1]);
        assert!(matches!(
            encode_binary(TOKEN, &payload, 1, 0),
            Err(Error::Wire(apns_wire::WireError::PayloadTooLarge { .. }))
        ));
    }

    #[test]
    fn test_encode_request_minimal_headers() {
        let message = Message::new().with_text("Hello").with_expiry(None);
        let request = encode_request(&pending(&message), None).unwrap();

        assert_eq!(request.path, format!("/3/device/{TOKEN}"));
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.headers[CONTENT_TYPE], "application/json");
        assert_eq!(&request.body[..], br#"{"aps":{"alert":"Hello"}}"#);
    }

    #[test]
    fn test_encode_request_all_headers() {
        let id = Uuid::new_v4();
        let message = Message::new()
            .with_text("Hello")
            .with_topic("com.example.app")
            .with_expiry(Some(10))
            .with_priority(Priority::Immediate)
            .with_collapse_id("42424242")
            .with_custom_identifier(id)
            .with_push_type(PushType::Alert);
        let notification = pending(&message);
        let request = encode_request(&notification, Some("jwt-token")).unwrap();

        assert_eq!(request.headers["apns-topic"], "com.example.app");
        assert_eq!(request.headers["apns-priority"], "10");
        assert_eq!(request.headers["apns-collapse-id"], "42424242");
        assert_eq!(request.headers["apns-id"], id.to_string().as_str());
        assert_eq!(request.headers["apns-push-type"], "alert");
        assert_eq!(request.headers[AUTHORIZATION], "Bearer jwt-token");
        let expected = (notification.queued_at.timestamp() + 10).to_string();
        assert_eq!(request.headers["apns-expiration"], expected.as_str());
    }

    #[test]
    fn test_encode_request_skips_non_positive_expiry() {
        let message = Message::new().with_expiry(Some(0));
        let request = encode_request(&pending(&message), Some("")).unwrap();
        assert!(!request.headers.contains_key("apns-expiration"));
        assert!(!request.headers.contains_key(AUTHORIZATION));
    }
}

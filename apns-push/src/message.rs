//! Notification message builder.
//!
//! A [`Message`] produces the JSON payload bytes sent to the gateway and the
//! request metadata (topic, priority, expiry, ...) the encoder turns into
//! headers. The delivery engine treats the payload as opaque bytes.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

/// Largest payload accepted by the gateway.
pub const PAYLOAD_MAXIMUM_SIZE: usize = 4096;

/// Top-level key reserved for the system dictionary.
pub const APPLE_RESERVED_NAMESPACE: &str = "aps";

/// Default lifetime of a notification on the gateway: 7 days.
pub const DEFAULT_EXPIRY_SECS: i64 = 604_800;

const DEVICE_TOKEN_HEX_LEN: usize = 64;

/// Value of the `apns-push-type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PushType {
    Alert,
    Background,
    Location,
    Voip,
    Complication,
    Fileprovider,
    Mdm,
    Liveactivity,
    Pushtotalk,
}

/// Delivery priority (`apns-priority`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    /// Deliver immediately.
    Immediate,
    /// Deliver with power considerations.
    PowerConsiderate,
    /// Deliver opportunistically.
    Low,
}

impl Priority {
    pub fn as_header_value(&self) -> &'static str {
        match self {
            Self::Immediate => "10",
            Self::PowerConsiderate => "5",
            Self::Low => "1",
        }
    }
}

/// Alert dictionary fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alert {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    pub loc_key: Option<String>,
    pub loc_args: Option<Vec<String>>,
    pub action_loc_key: Option<String>,
    pub launch_image: Option<String>,
    /// Label of the action button on Safari notifications.
    pub action: Option<String>,
}

impl Alert {
    /// Whether only the body is set, in which case the alert is sent as a plain string.
    fn is_body_only(&self) -> bool {
        self.title.is_none()
            && self.subtitle.is_none()
            && self.loc_key.is_none()
            && self.loc_args.is_none()
            && self.action_loc_key.is_none()
            && self.launch_image.is_none()
            && self.action.is_none()
    }
}

/// A notification addressed to one or more device tokens.
#[derive(Debug, Clone)]
pub struct Message {
    recipients: Vec<String>,
    alert: Alert,
    badge: Option<u32>,
    sound: Option<String>,
    content_available: bool,
    mutable_content: bool,
    category: Option<String>,
    thread_id: Option<String>,
    url_args: Option<Vec<String>>,
    custom_properties: BTreeMap<String, Value>,
    expiry: Option<i64>,
    topic: Option<String>,
    priority: Option<Priority>,
    collapse_id: Option<String>,
    custom_identifier: Option<Uuid>,
    push_type: Option<PushType>,
    auto_adjust_long_payload: bool,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            alert: Alert::default(),
            badge: None,
            sound: None,
            content_available: false,
            mutable_content: false,
            category: None,
            thread_id: None,
            url_args: None,
            custom_properties: BTreeMap::new(),
            expiry: Some(DEFAULT_EXPIRY_SECS),
            topic: None,
            priority: None,
            collapse_id: None,
            custom_identifier: None,
            push_type: None,
            auto_adjust_long_payload: true,
        }
    }
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a message with a single recipient.
    pub fn for_recipient(device_token: &str) -> Result<Self> {
        let mut message = Self::new();
        message.add_recipient(device_token)?;
        Ok(message)
    }

    /// Adds a recipient device token (64 hexadecimal characters).
    pub fn add_recipient(&mut self, device_token: &str) -> Result<()> {
        let token = device_token.trim();
        if token.len() != DEVICE_TOKEN_HEX_LEN || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::validation(format!(
                "Invalid device token `{device_token}`"
            )));
        }
        self.recipients.push(token.to_ascii_lowercase());
        Ok(())
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn recipient(&self, index: usize) -> Option<&str> {
        self.recipients.get(index).map(String::as_str)
    }

    /// Number of queue entries this message fans out to.
    pub fn recipients_count(&self) -> usize {
        self.recipients.len()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.alert.body = Some(text.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.alert.title = Some(title.into());
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.alert.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_alert(mut self, alert: Alert) -> Self {
        self.alert = alert;
        self
    }

    pub fn with_badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    /// Sets the sound to play; `"default"` plays the system sound.
    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn with_content_available(mut self, content_available: bool) -> Self {
        self.content_available = content_available;
        self
    }

    pub fn with_mutable_content(mut self, mutable_content: bool) -> Self {
        self.mutable_content = mutable_content;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Values substituted into the Safari website push URL format string.
    pub fn with_url_args(mut self, url_args: Vec<String>) -> Self {
        self.url_args = Some(url_args);
        self
    }

    /// Expiry in seconds from the time the notification is queued. Non-positive
    /// values ask the gateway not to store the notification.
    pub fn with_expiry(mut self, expiry_secs: Option<i64>) -> Self {
        self.expiry = expiry_secs;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_collapse_id(mut self, collapse_id: impl Into<String>) -> Self {
        self.collapse_id = Some(collapse_id.into());
        self
    }

    pub fn with_custom_identifier(mut self, custom_identifier: Uuid) -> Self {
        self.custom_identifier = Some(custom_identifier);
        self
    }

    pub fn with_push_type(mut self, push_type: PushType) -> Self {
        self.push_type = Some(push_type);
        self
    }

    pub fn with_auto_adjust_long_payload(mut self, auto_adjust: bool) -> Self {
        self.auto_adjust_long_payload = auto_adjust;
        self
    }

    /// Adds a top-level custom property next to the `aps` dictionary.
    pub fn set_custom_property(&mut self, name: &str, value: impl Serialize) -> Result<()> {
        let name = name.trim();
        if name == APPLE_RESERVED_NAMESPACE {
            return Err(Error::validation(format!(
                "Property name `{APPLE_RESERVED_NAMESPACE}` can not be used for custom property"
            )));
        }
        self.custom_properties
            .insert(name.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn custom_property(&self, name: &str) -> Option<&Value> {
        self.custom_properties.get(name)
    }

    pub fn text(&self) -> Option<&str> {
        self.alert.body.as_deref()
    }

    pub fn expiry(&self) -> Option<i64> {
        self.expiry
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub fn collapse_id(&self) -> Option<&str> {
        self.collapse_id.as_deref()
    }

    pub fn custom_identifier(&self) -> Option<Uuid> {
        self.custom_identifier
    }

    pub fn push_type(&self) -> Option<PushType> {
        self.push_type
    }

    /// Serializes the payload, shortening the alert text to fit
    /// [`PAYLOAD_MAXIMUM_SIZE`] when auto-adjust is enabled.
    pub fn payload(&self) -> Result<Bytes> {
        let mut text = self.alert.body.clone();
        loop {
            let json = self.serialize(text.as_deref())?;
            if json.len() <= PAYLOAD_MAXIMUM_SIZE {
                return Ok(Bytes::from(json));
            }

            let too_large = Error::PayloadTooLarge {
                len: json.len(),
                max: PAYLOAD_MAXIMUM_SIZE,
            };
            if !self.auto_adjust_long_payload {
                return Err(too_large);
            }
            let Some(current) = text.as_deref() else {
                return Err(too_large);
            };
            let overflow = json.len() - PAYLOAD_MAXIMUM_SIZE;
            let max_text_len = match current.len().checked_sub(overflow) {
                Some(len) if len > 0 => len,
                _ => return Err(too_large),
            };
            let shortened = shorten_text(current, max_text_len);
            tracing::debug!(
                from = current.len(),
                to = shortened.len(),
                "Shortened alert text to fit payload limit"
            );
            text = Some(shortened);
        }
    }

    fn serialize(&self, body: Option<&str>) -> Result<Vec<u8>> {
        let alert = self.alert_field(body);
        let document = PayloadDocument {
            aps: Aps {
                alert,
                badge: self.badge,
                sound: self.sound.as_deref(),
                content_available: self.content_available.then_some(1),
                mutable_content: self.mutable_content.then_some(1),
                category: self.category.as_deref(),
                thread_id: self.thread_id.as_deref(),
                url_args: self.url_args.as_deref(),
            },
            custom: &self.custom_properties,
        };
        Ok(serde_json::to_vec(&document)?)
    }

    fn alert_field<'a>(&'a self, body: Option<&'a str>) -> Option<AlertField<'a>> {
        if self.alert.is_body_only() {
            return body.map(AlertField::Text);
        }
        let alert = &self.alert;
        Some(AlertField::Dictionary(AlertDictionary {
            title: alert.title.as_deref(),
            subtitle: alert.subtitle.as_deref(),
            // a localized key replaces the literal body
            body: if alert.loc_key.is_some() { None } else { body },
            loc_key: alert.loc_key.as_deref(),
            loc_args: alert.loc_args.as_deref(),
            action_loc_key: alert.action_loc_key.as_deref(),
            launch_image: alert.launch_image.as_deref(),
            action: alert.action.as_deref(),
        }))
    }
}

/// Drops trailing characters (at least one) until `text` is at most `max_bytes` long.
fn shorten_text(text: &str, max_bytes: usize) -> String {
    let mut keep = text.chars().count().min(max_bytes).saturating_sub(1);
    loop {
        let candidate: String = text.chars().take(keep).collect();
        if candidate.len() <= max_bytes || keep == 0 {
            return candidate;
        }
        keep -= 1;
    }
}

#[derive(Serialize)]
struct PayloadDocument<'a> {
    aps: Aps<'a>,
    #[serde(flatten)]
    custom: &'a BTreeMap<String, Value>,
}

#[derive(Serialize)]
struct Aps<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<AlertField<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    content_available: Option<u8>,
    #[serde(rename = "mutable-content", skip_serializing_if = "Option::is_none")]
    mutable_content: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    #[serde(rename = "thread-id", skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
    #[serde(rename = "url-args", skip_serializing_if = "Option::is_none")]
    url_args: Option<&'a [String]>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum AlertField<'a> {
    Text(&'a str),
    Dictionary(AlertDictionary<'a>),
}

#[derive(Serialize)]
struct AlertDictionary<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(rename = "loc-key", skip_serializing_if = "Option::is_none")]
    loc_key: Option<&'a str>,
    #[serde(rename = "loc-args", skip_serializing_if = "Option::is_none")]
    loc_args: Option<&'a [String]>,
    #[serde(rename = "action-loc-key", skip_serializing_if = "Option::is_none")]
    action_loc_key: Option<&'a str>,
    #[serde(rename = "launch-image", skip_serializing_if = "Option::is_none")]
    launch_image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
}

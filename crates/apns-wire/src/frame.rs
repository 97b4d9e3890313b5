use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

/// Command byte of a push notification frame.
pub const COMMAND_PUSH: u8 = 1;

/// Command byte of an error-response frame.
pub const ERROR_RESPONSE_COMMAND: u8 = 8;

/// Error-response frames are always 6 bytes: command, status, identifier.
pub const ERROR_RESPONSE_SIZE: usize = 6;

/// Binary size of a device token.
pub const DEVICE_BINARY_SIZE: usize = 32;

/// Largest payload the binary gateway accepts.
pub const BINARY_PAYLOAD_MAXIMUM_SIZE: usize = 2048;

// command(1) + identifier(4) + expiry(4) + token length(2) + token(32) + payload length(2)
const NOTIFICATION_HEADER_SIZE: usize = 1 + 4 + 4 + 2 + DEVICE_BINARY_SIZE + 2;

/// A push notification as it travels over the binary gateway socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFrame {
    pub sequence_id: u32,
    /// Absolute UNIX time after which the gateway may drop the notification, 0 for "do not store".
    pub expiry: u32,
    pub device_token: [u8; DEVICE_BINARY_SIZE],
    pub payload: Bytes,
}

impl NotificationFrame {
    /// Builds a frame from a hex device token and a payload.
    ///
    /// `expiry_secs` is relative to `now`; a non-positive value produces an
    /// absolute expiry of 0.
    pub fn new(
        device_token: &str,
        payload: impl Into<Bytes>,
        sequence_id: u32,
        expiry_secs: i64,
        now: i64,
    ) -> Result<Self, WireError> {
        let payload = payload.into();
        if payload.len() > BINARY_PAYLOAD_MAXIMUM_SIZE {
            return Err(WireError::PayloadTooLarge {
                len: payload.len(),
                max: BINARY_PAYLOAD_MAXIMUM_SIZE,
            });
        }

        Ok(Self {
            sequence_id,
            expiry: absolute_expiry(expiry_secs, now),
            device_token: decode_device_token(device_token)?,
            payload,
        })
    }

    /// Hex representation of the device token.
    pub fn device_token_hex(&self) -> String {
        hex::encode(self.device_token)
    }

    /// Encoded length of this frame.
    pub fn encoded_len(&self) -> usize {
        NOTIFICATION_HEADER_SIZE + self.payload.len()
    }

    /// Appends the encoded frame to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(COMMAND_PUSH);
        dst.put_u32(self.sequence_id);
        dst.put_u32(self.expiry);
        dst.put_u16(DEVICE_BINARY_SIZE as u16);
        dst.put_slice(&self.device_token);
        dst.put_u16(self.payload.len() as u16);
        dst.put_slice(&self.payload);
    }

    /// Parses a complete notification frame.
    pub fn parse(mut buf: &[u8]) -> Result<Self, WireError> {
        ensure_len(buf, NOTIFICATION_HEADER_SIZE)?;

        let command = buf.get_u8();
        if command != COMMAND_PUSH {
            return Err(WireError::UnexpectedCommand(command));
        }
        let sequence_id = buf.get_u32();
        let expiry = buf.get_u32();
        let token_len = buf.get_u16();
        if token_len as usize != DEVICE_BINARY_SIZE {
            return Err(WireError::TokenLengthMismatch(token_len));
        }
        let mut device_token = [0u8; DEVICE_BINARY_SIZE];
        buf.copy_to_slice(&mut device_token);

        let payload_len = buf.get_u16() as usize;
        ensure_len(buf, payload_len)?;
        let payload = Bytes::copy_from_slice(&buf[..payload_len]);

        Ok(Self {
            sequence_id,
            expiry,
            device_token,
            payload,
        })
    }
}

/// An error-response frame sent by the gateway before it closes the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub command: u8,
    pub status: u8,
    pub sequence_id: u32,
}

impl ErrorResponse {
    /// Parses a 6 byte error-response frame.
    ///
    /// Any other length is rejected, as is a command byte other than
    /// [`ERROR_RESPONSE_COMMAND`].
    pub fn parse(mut buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() != ERROR_RESPONSE_SIZE {
            return Err(WireError::FrameSize {
                expected: ERROR_RESPONSE_SIZE,
                actual: buf.len(),
            });
        }
        let command = buf.get_u8();
        if command != ERROR_RESPONSE_COMMAND {
            return Err(WireError::UnexpectedCommand(command));
        }
        Ok(Self {
            command,
            status: buf.get_u8(),
            sequence_id: buf.get_u32(),
        })
    }

    pub fn to_bytes(&self) -> [u8; ERROR_RESPONSE_SIZE] {
        let id = self.sequence_id.to_be_bytes();
        [self.command, self.status, id[0], id[1], id[2], id[3]]
    }
}

fn absolute_expiry(expiry_secs: i64, now: i64) -> u32 {
    if expiry_secs <= 0 {
        return 0;
    }
    let at = now.saturating_add(expiry_secs);
    u32::try_from(at.max(0)).unwrap_or(u32::MAX)
}

fn decode_device_token(token: &str) -> Result<[u8; DEVICE_BINARY_SIZE], WireError> {
    let raw = hex::decode(token.trim()).map_err(|e| WireError::invalid_token(token, e.to_string()))?;
    raw.try_into().map_err(|raw: Vec<u8>| {
        WireError::invalid_token(
            token,
            format!("decodes to {} bytes, expected {}", raw.len(), DEVICE_BINARY_SIZE),
        )
    })
}

fn ensure_len(buf: &[u8], needed: usize) -> Result<(), WireError> {
    if buf.len() < needed {
        return Err(WireError::Truncated {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

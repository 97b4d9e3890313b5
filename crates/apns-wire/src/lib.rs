//! Binary wire protocol of the legacy APNs gateway.
//!
//! The gateway accepts a stream of pipelined notification frames and answers
//! only on failure, with a single 6 byte error-response frame naming the first
//! notification it rejected.
//!
//! ## Core Types
//!
//! - [`NotificationFrame`] - An outbound notification
//! - [`ErrorResponse`] - An inbound error report
//! - [`ApnsCodec`] - `tokio_util` codec over both

pub mod codec;
pub mod error;
pub mod frame;
pub mod status;

pub use crate::{
    codec::ApnsCodec,
    error::WireError,
    frame::{
        BINARY_PAYLOAD_MAXIMUM_SIZE, COMMAND_PUSH, DEVICE_BINARY_SIZE, ERROR_RESPONSE_COMMAND,
        ERROR_RESPONSE_SIZE, ErrorResponse, NotificationFrame,
    },
    status::{STATUS_CODE_INTERNAL_ERROR, UNKNOWN_STATUS_TEXT, binary_status_text, http_status_text},
};
use bytes::BytesMut;
use tokio_util::codec::Encoder;

pub fn encode_notification(frame: &NotificationFrame) -> Result<BytesMut, WireError> {
    let mut codec = ApnsCodec;
    let mut dst = BytesMut::with_capacity(frame.encoded_len());
    codec.encode(frame, &mut dst)?;
    Ok(dst)
}

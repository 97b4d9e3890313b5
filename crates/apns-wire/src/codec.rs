use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WireError;
use crate::frame::{ERROR_RESPONSE_SIZE, ErrorResponse, NotificationFrame};

/// Codec for the binary gateway socket.
///
/// Outbound items are [`NotificationFrame`]s; inbound items are the fixed-size
/// [`ErrorResponse`] frames the gateway sends before dropping the connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApnsCodec;

impl Encoder<NotificationFrame> for ApnsCodec {
    type Error = WireError;

    fn encode(&mut self, item: NotificationFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}

impl Encoder<&NotificationFrame> for ApnsCodec {
    type Error = WireError;

    fn encode(&mut self, item: &NotificationFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for ApnsCodec {
    type Item = ErrorResponse;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < ERROR_RESPONSE_SIZE {
            src.reserve(ERROR_RESPONSE_SIZE - src.len());
            return Ok(None);
        }

        // Consumed even when invalid.
        let raw = src.split_to(ERROR_RESPONSE_SIZE);
        let response = ErrorResponse::parse(raw.chunk())?;
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_waits_for_full_frame() {
        let mut codec = ApnsCodec;
        let mut src = BytesMut::from(&[8u8, 1, 0][..]);
        assert_eq!(codec.decode(&mut src).unwrap(), None);
        assert_eq!(src.len(), 3);

        src.extend_from_slice(&[0, 0, 9]);
        let response = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(response.status, 1);
        assert_eq!(response.sequence_id, 9);
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_consumes_invalid_frame() {
        let mut codec = ApnsCodec;
        let mut src = BytesMut::from(&[3u8, 1, 0, 0, 0, 9, 8, 2, 0, 0, 0, 4][..]);

        assert_eq!(
            codec.decode(&mut src).unwrap_err(),
            WireError::UnexpectedCommand(3)
        );
        let response = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(response.sequence_id, 4);
    }
}

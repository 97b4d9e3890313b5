use thiserror::Error;

/// Errors produced while building or parsing binary gateway frames.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("payload is {len} bytes, the binary protocol accepts at most {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("invalid device token `{token}`: {reason}")]
    InvalidDeviceToken { token: String, reason: String },

    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("frame is {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("unexpected command {0}")]
    UnexpectedCommand(u8),

    #[error("device token length field is {0}, expected 32")]
    TokenLengthMismatch(u16),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for WireError {
    fn from(err: std::io::Error) -> Self {
        WireError::Io(err.to_string())
    }
}

impl WireError {
    pub fn invalid_token(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDeviceToken {
            token: token.into(),
            reason: reason.into(),
        }
    }
}

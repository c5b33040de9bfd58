use thiserror::Error;

/// Failure to make sense of a frame received from, or destined for, the mixer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("expected op {expected}, got op {actual}")]
    UnexpectedOp { expected: u8, actual: u8 },
}

impl ProtocolError {
    pub fn unexpected_op(expected: u8, actual: u8) -> Self {
        Self::UnexpectedOp { expected, actual }
    }
}

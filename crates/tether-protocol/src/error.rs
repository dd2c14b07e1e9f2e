use thiserror::Error;

use crate::client::ClientType;

/// Errors raised by the packet codec and the control-channel framing.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("attempt to read {needed} byte(s) at position {pos} past packet length {len}")]
    ReadPastEnd { pos: usize, needed: usize, len: usize },

    #[error("position {pos} cannot be greater than packet length {len}")]
    PositionPastEnd { pos: usize, len: usize },

    #[error("invalid byte length when decoding VL64: {0}")]
    InvalidVl64Length(usize),

    #[error("attempt to read boolean from non-boolean value: {0}")]
    InvalidBool(i32),

    #[error("string length cannot fit into a u16: {0}")]
    StringTooLong(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("failed to parse float: {0:?}")]
    InvalidFloat(String),

    #[error("{op} is unsupported on client {client}")]
    Unsupported { op: &'static str, client: ClientType },

    #[error("unknown packet direction on shockwave session")]
    UnknownDirection,

    #[error("unknown client type: {0:?}")]
    UnknownClient(String),

    #[error("received invalid frame length: {0}")]
    InvalidFrameLength(u32),

    #[error("invalid intercept data (insufficient delimiter bytes)")]
    MissingDelimiters,

    #[error("truncated intercept data")]
    TruncatedIntercept,

    #[error("failed to parse intercept sequence number")]
    InvalidSequence,

    #[error("invalid {what}: {value:?}")]
    InvalidField { what: &'static str, value: String },
}

/// Result type for codec and framing operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

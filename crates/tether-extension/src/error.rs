use thiserror::Error;

use tether_protocol::{Direction, ProtocolError};

/// Errors raised by the extension runtime.
#[derive(Error, Debug)]
pub enum ExtError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("failed to resolve {dir} header: {name:?}")]
    Unresolved { dir: Direction, name: String },

    #[error("{0}")]
    Handler(String),

    #[error("the extension is not connected to the host")]
    NotRunning,

    #[error("the extension is already running")]
    AlreadyRunning,

    #[error("no direction specified on packet header")]
    MissingDirection,

    #[error("missing value for argument {0}")]
    MissingArgValue(&'static str),

    #[error("invalid value for argument {flag}: {value:?}")]
    InvalidArgValue { flag: &'static str, value: String },
}

/// Result type for extension operations.
pub type Result<T> = std::result::Result<T, ExtError>;

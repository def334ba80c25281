use thiserror::Error;

/// Errors raised by the task engine, the Spinel codec and the byte transport.
///
/// Outcomes of submitted tasks never travel through this type: those are
/// delivered to the completion callback as a [`TaskStatus`](super::TaskStatus).
#[derive(Debug, Error)]
pub enum NcpError {
    /// Malformed task parameters, rejected before the task reaches the instance.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// An engine invariant was violated (e.g. a task finished twice).
    #[error("internal fault: {0}")]
    InternalFault(String),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Wrapper around transport IO errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver loop is gone (shut down or crashed).
    #[error("ncp driver disconnected")]
    Disconnected,
}

impl NcpError {
    pub fn bad_argument(msg: impl Into<String>) -> Self {
        NcpError::BadArgument(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        NcpError::Codec(msg.into())
    }
}

pub type NcpResult<T> = std::result::Result<T, NcpError>;

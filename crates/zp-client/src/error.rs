//! Error taxonomy shared by every client API.

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a client operation.
///
/// - `Io`: transport-level failure (connect, send or receive) after all
///   retry attempts, including per-RPC timeouts.
/// - `NotFound`: a missing table after a topology refresh, or a missing key
///   on a successful `get`.
/// - `Corruption`: the RPC completed but the server answered with a non-OK
///   status code, or the response failed to decode.
/// - `InvalidArgument`: the caller passed unusable parameters.
/// - `Incomplete`: an operation that never reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("corruption: {0}")]
    Corruption(String),
    #[error("incomplete: {0}")]
    Incomplete(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Error::Corruption(format!("malformed response: {err}"))
    }
}

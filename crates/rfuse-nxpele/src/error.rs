//! Error types for the nxpele operator

use rfuse_core::transport::TransportError;
use thiserror::Error;

/// Nxpele operator errors
#[derive(Debug, Error)]
pub enum NxpeleError {
    /// The enclave did not accept the message
    #[error("EdgeLock message failed: {0}")]
    MessageFailed(#[source] TransportError),

    /// The enclave answered with an unexpected response
    #[error("Unexpected EdgeLock response: {0}")]
    UnexpectedResponse(String),

    /// The fuse index cannot be expressed as a bit position
    #[error("Fuse index {0} is out of range")]
    IndexOutOfRange(u32),
}

impl From<NxpeleError> for rfuse_core::Error {
    fn from(e: NxpeleError) -> Self {
        rfuse_core::Error::OperationFailure(e.to_string())
    }
}

/// Result type for nxpele operations
pub type Result<T> = std::result::Result<T, NxpeleError>;

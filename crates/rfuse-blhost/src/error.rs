//! Error types for the blhost operator

use rfuse_core::transport::TransportError;
use thiserror::Error;

/// Blhost operator errors
#[derive(Debug, Error)]
pub enum BlhostError {
    /// The boot session could not be opened
    #[error("Failed to open boot session: {0}")]
    OpenFailed(#[source] TransportError),

    /// The bootloader did not return the fuse value
    #[error("Reading of fuse {0} failed")]
    ReadFailed(u32),

    /// The bootloader rejected the programming request
    #[error("Writing of fuse {0} failed")]
    WriteFailed(u32),

    /// The fuse index collides with the lock flag
    #[error("Fuse index {0} is out of range")]
    IndexOutOfRange(u32),
}

impl From<BlhostError> for rfuse_core::Error {
    fn from(e: BlhostError) -> Self {
        rfuse_core::Error::OperationFailure(e.to_string())
    }
}

/// Result type for blhost operations
pub type Result<T> = std::result::Result<T, BlhostError>;

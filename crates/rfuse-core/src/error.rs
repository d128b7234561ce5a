//! Error types for rfuse-core
//!
//! Every fallible fuse operation in the workspace reports one of these
//! variants. Backend crates keep their own error enums and convert them into
//! [`Error::OperationFailure`] at the operator boundary.

use thiserror::Error;

use crate::lock::FuseLock;

/// Errors raised by the fuse database loader
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// I/O error reading files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// RON parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The definitions parsed but are structurally invalid
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed configuration, missing OTP index, wrong operator type, ...
    #[error("Fuse configuration error: {0}")]
    Configuration(String),

    /// The device or a local access-policy check rejected a read or write
    #[error("Fuse operation failed: {0}")]
    OperationFailure(String),

    /// Access to a fuse blocked by an active lock
    #[error("Fuse {fuse} {} operation is locked by lock fuse {lock_fuse}", lock_op(.lock))]
    LockViolation {
        /// Fuse that was accessed
        fuse: String,
        /// Fuse whose value holds the blocking lock
        lock_fuse: String,
        /// The lock that blocked the access
        lock: FuseLock,
    },

    /// Unknown register, bitfield, enum or family
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// What was looked up ("register", "bitfield", ...)
        kind: &'static str,
        /// The name that was looked up
        name: String,
    },

    /// A script value refers to an attribute the source does not provide
    #[error("Attribute '{0}' is not provided by the attribute source")]
    AttributeResolution(String),

    /// Fuse database could not be loaded
    #[error("Fuse database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error while reading or writing files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn lock_op(lock: &FuseLock) -> &'static str {
    if lock.contains(FuseLock::READ_LOCK) {
        "read"
    } else {
        "write"
    }
}

impl Error {
    /// Create a not-found error for a register
    pub fn register_not_found(name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "register",
            name: name.into(),
        }
    }

    /// Create a not-found error for a bitfield
    pub fn bitfield_not_found(name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "bitfield",
            name: name.into(),
        }
    }

    /// True for hardware/policy failures, including lock violations
    ///
    /// This is the class of errors `read_all` tolerates per register.
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, Error::OperationFailure(_) | Error::LockViolation { .. })
    }

    /// True for configuration errors, including unresolved attributes
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::AttributeResolution(_)
                | Error::ConfigParse(_)
                | Error::Database(_)
        )
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_violation_is_operation_failure() {
        let err = Error::LockViolation {
            fuse: "BOOT_CFG".into(),
            lock_fuse: "LOCK0".into(),
            lock: FuseLock::WRITE_LOCK,
        };
        assert!(err.is_operation_failure());
        assert!(!err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "Fuse BOOT_CFG write operation is locked by lock fuse LOCK0"
        );
    }

    #[test]
    fn test_attribute_resolution_is_configuration_error() {
        let err = Error::AttributeResolution("srk_hash".into());
        assert!(err.is_configuration_error());
        assert!(!err.is_operation_failure());
    }
}

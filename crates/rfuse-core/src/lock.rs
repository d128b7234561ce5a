//! Fuse lock and write-policy types
//!
//! OTP fuses can be protected in two independent ways:
//!
//! - **Lock fuses**: another register (sometimes the fuse itself) holds bits
//!   that, once programmed, block reading and/or writing of the fuse.
//! - **Individual write lock**: a per-fuse policy fixed by the silicon that
//!   says whether a write must, may, or implicitly does lock the fuse.

use bitflags::bitflags;

bitflags! {
    /// Set of locks active on a fuse
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FuseLock: u8 {
        /// The fuse can no longer be read
        const READ_LOCK  = 1 << 0;
        /// The fuse can no longer be written
        const WRITE_LOCK = 1 << 1;
    }
}

impl core::fmt::Display for FuseLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", name)?;
            first = false;
        }
        Ok(())
    }
}

/// Individual write lock policy of a fuse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub enum IndividualWriteLock {
    /// A write never forces a lock; the caller decides
    #[default]
    #[serde(alias = "never")]
    Never,
    /// The fuse may be written only once and is always locked with the write
    #[serde(alias = "always")]
    Always,
    /// The hardware locks the fuse after any write
    #[serde(alias = "implicit")]
    Implicit,
}

impl core::fmt::Display for IndividualWriteLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IndividualWriteLock::Never => write!(f, "never"),
            IndividualWriteLock::Always => write!(f, "always"),
            IndividualWriteLock::Implicit => write!(f, "implicit"),
        }
    }
}

/// Reference from a fuse to the lock fuse that guards it
///
/// The masks select the bits of the lock fuse's raw value that carry this
/// fuse's lock state. Any selected bit being set activates the lock.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct LockFuseRef {
    /// Name or uid of the lock fuse
    pub register: String,
    /// Bits of the lock fuse that signal a write lock
    #[serde(default)]
    pub write_lock_mask: Option<u32>,
    /// Bits of the lock fuse that signal a read lock
    #[serde(default)]
    pub read_lock_mask: Option<u32>,
}

impl LockFuseRef {
    /// Decode the locks encoded in a lock fuse value
    pub fn decode(&self, lock_fuse_value: u32) -> FuseLock {
        let mut locks = FuseLock::empty();
        if self
            .write_lock_mask
            .is_some_and(|mask| lock_fuse_value & mask != 0)
        {
            locks |= FuseLock::WRITE_LOCK;
        }
        if self
            .read_lock_mask
            .is_some_and(|mask| lock_fuse_value & mask != 0)
        {
            locks |= FuseLock::READ_LOCK;
        }
        locks
    }
}

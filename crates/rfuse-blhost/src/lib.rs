//! rfuse-blhost - MCU bootloader fuse operator
//!
//! Programs fuses through the `efuse-read-once` and `efuse-program-once`
//! bootloader commands. Every operation runs inside its own boot session:
//! the session is opened when needed and closed again when the operation
//! ends, whether it succeeded or not.
//!
//! # Example
//!
//! ```ignore
//! use rfuse_blhost::BlhostOperator;
//! use rfuse_core::operator::FuseOperator;
//!
//! let mut operator = BlhostOperator::new(session);
//! let value = operator.read_fuse(3)?;
//! operator.write_fuse(3, value | 0x1, false)?;
//! ```

mod error;

pub use error::{BlhostError, Result};

use std::ops::{Deref, DerefMut};

use rfuse_core::operator::{render_operator_script, BackendKind, FuseOperator};
use rfuse_core::register::FuseRegister;
use rfuse_core::transport::BootSession;

/// Bit of the fuse index that requests a lock after programming
pub const LOCK_FLAG: u32 = 1 << 24;

/// Keeps a boot session open for the lifetime of the guard
struct SessionGuard<'a, S: BootSession> {
    session: &'a mut S,
}

impl<'a, S: BootSession> SessionGuard<'a, S> {
    fn open(session: &'a mut S) -> Result<Self> {
        if !session.is_opened() {
            session.open().map_err(BlhostError::OpenFailed)?;
        }
        Ok(Self { session })
    }
}

impl<S: BootSession> Deref for SessionGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
    }
}

impl<S: BootSession> DerefMut for SessionGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session
    }
}

impl<S: BootSession> Drop for SessionGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.session.close() {
            log::warn!("Failed to close boot session: {}", e);
        }
    }
}

/// Fuse operator driving the MCU bootloader
pub struct BlhostOperator<S: BootSession> {
    session: S,
}

impl<S: BootSession> BlhostOperator<S> {
    /// Create an operator on top of a boot session
    pub fn new(session: S) -> Self {
        Self { session }
    }

    /// The underlying boot session
    pub fn session(&self) -> &S {
        &self.session
    }

    fn read(&mut self, index: u32) -> Result<u32> {
        let mut session = SessionGuard::open(&mut self.session)?;
        session
            .efuse_read_once(index)
            .ok_or(BlhostError::ReadFailed(index))
    }

    fn write(&mut self, index: u32, value: u32, lock: bool) -> Result<()> {
        if index & LOCK_FLAG != 0 {
            return Err(BlhostError::IndexOutOfRange(index));
        }
        let wire_index = if lock { index | LOCK_FLAG } else { index };
        let mut session = SessionGuard::open(&mut self.session)?;
        if !session.efuse_program_once(wire_index, value) {
            return Err(BlhostError::WriteFailed(index));
        }
        Ok(())
    }
}

impl<S: BootSession> FuseOperator for BlhostOperator<S> {
    fn kind(&self) -> BackendKind {
        BackendKind::Blhost
    }

    fn read_fuse(&mut self, index: u32) -> rfuse_core::Result<u32> {
        Ok(self.read(index)?)
    }

    fn write_fuse(&mut self, index: u32, value: u32, lock: bool) -> rfuse_core::Result<()> {
        log::debug!(
            "blhost: efuse-program-once {} {:#x}{}",
            index,
            value,
            if lock { " lock" } else { "" }
        );
        Ok(self.write(index, value, lock)?)
    }

    fn format_write_command(index: u32, value: u32, lock: bool, verify: bool) -> String {
        let mut cmd = format!(
            "efuse-program-once {} 0x{:X} {}",
            index,
            value,
            if verify { "--verify" } else { "--no-verify" }
        );
        if lock {
            cmd.push_str(" lock");
        }
        cmd
    }

    fn format_script(
        family: &str,
        revision: &str,
        fuses: &[&FuseRegister],
    ) -> rfuse_core::Result<String> {
        render_operator_script(BackendKind::Blhost, family, revision, fuses, |index, value| {
            Self::format_write_command(index, value, false, false)
        })
    }
}

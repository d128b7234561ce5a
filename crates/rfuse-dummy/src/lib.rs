//! rfuse-dummy - In-memory OTP emulator for testing
//!
//! This crate provides a dummy device that emulates an OTP fuse array in
//! memory. It implements both the bootloader session and the EdgeLock
//! message channel, so either backend can be exercised without hardware.
//!
//! The emulation follows OTP rules: programming can only set bits, a locked
//! word rejects further programming, and a read protected word cannot be
//! read back. Failures can be injected per word.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use rfuse_core::transport::{
    BootSession, EleHandler, EleMessage, EleResponse, TransportError,
};
use thiserror::Error;

/// Bit of the bootloader fuse index requesting a lock after programming
const BOOT_LOCK_FLAG: u32 = 1 << 24;

/// Errors of the emulated device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DummyError {
    /// The session was used before being opened
    #[error("Session is not open")]
    NotOpen,

    /// The fuse index is outside of the emulated array
    #[error("Fuse index {0} is out of range")]
    IndexOutOfRange(u32),

    /// The fuse word is locked against programming
    #[error("Fuse {0} is locked")]
    Locked(u32),

    /// The fuse word cannot be read back
    #[error("Fuse {0} is read protected")]
    ReadProtected(u32),

    /// A failure injected by the test
    #[error("Injected failure on fuse {0}")]
    Injected(u32),

    /// The request does not address whole fuse words
    #[error("Unaligned fuse access: bit {position}, length {length}")]
    Unaligned {
        /// First bit of the request
        position: u32,
        /// Number of bits of the request
        length: u32,
    },
}

/// Configuration for the dummy device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Number of 32-bit OTP words
    pub words: usize,
    /// Whether the bootloader session starts opened
    pub opened: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            words: 128,
            opened: false,
        }
    }
}

/// One successful programming operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    /// Fuse word index
    pub index: u32,
    /// Programmed value
    pub value: u32,
    /// Whether the word was locked
    pub lock: bool,
}

#[derive(Debug)]
struct OtpState {
    words: Vec<u32>,
    locked: Vec<bool>,
    read_protected: Vec<bool>,
    failing: BTreeSet<u32>,
    opened: bool,
    open_count: usize,
    close_count: usize,
    writes: Vec<WriteRecord>,
}

impl OtpState {
    fn slot(&self, index: u32) -> Result<usize, DummyError> {
        let slot = index as usize;
        if slot >= self.words.len() {
            return Err(DummyError::IndexOutOfRange(index));
        }
        Ok(slot)
    }

    fn read(&self, index: u32) -> Result<u32, DummyError> {
        let slot = self.slot(index)?;
        if self.failing.contains(&index) {
            return Err(DummyError::Injected(index));
        }
        if self.read_protected[slot] {
            return Err(DummyError::ReadProtected(index));
        }
        Ok(self.words[slot])
    }

    fn program(&mut self, index: u32, value: u32, lock: bool) -> Result<(), DummyError> {
        let slot = self.slot(index)?;
        if self.failing.contains(&index) {
            return Err(DummyError::Injected(index));
        }
        if self.locked[slot] {
            return Err(DummyError::Locked(index));
        }
        // OTP programming can only set bits
        self.words[slot] |= value;
        if lock {
            self.locked[slot] = true;
        }
        self.writes.push(WriteRecord { index, value, lock });
        log::debug!(
            "dummy: programmed fuse {} with {:#010x}{}",
            index,
            value,
            if lock { " and locked it" } else { "" }
        );
        Ok(())
    }
}

/// Dummy OTP device
///
/// Clones share the same fuse array, so a test can keep a handle for
/// inspection while an operator owns another one.
#[derive(Debug, Clone)]
pub struct DummyFuses {
    state: Rc<RefCell<OtpState>>,
}

impl DummyFuses {
    /// Create a new dummy device with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(OtpState {
                words: vec![0; config.words],
                locked: vec![false; config.words],
                read_protected: vec![false; config.words],
                failing: BTreeSet::new(),
                opened: config.opened,
                open_count: 0,
                close_count: 0,
                writes: Vec::new(),
            })),
        }
    }

    /// Create a new dummy device with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Preset a fuse word, bypassing OTP rules
    pub fn set_word(&self, index: u32, value: u32) {
        let mut state = self.state.borrow_mut();
        if let Some(word) = state.words.get_mut(index as usize) {
            *word = value;
        }
    }

    /// Current value of a fuse word, bypassing read protection
    pub fn word(&self, index: u32) -> Option<u32> {
        self.state.borrow().words.get(index as usize).copied()
    }

    /// Lock a fuse word against programming
    pub fn lock_word(&self, index: u32) {
        if let Some(locked) = self.state.borrow_mut().locked.get_mut(index as usize) {
            *locked = true;
        }
    }

    /// Check whether a fuse word is locked
    pub fn is_locked(&self, index: u32) -> bool {
        self.state
            .borrow()
            .locked
            .get(index as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Make a fuse word unreadable
    pub fn read_protect(&self, index: u32) {
        if let Some(protected) = self.state.borrow_mut().read_protected.get_mut(index as usize) {
            *protected = true;
        }
    }

    /// Make every access to a fuse word fail
    pub fn inject_failure(&self, index: u32) {
        self.state.borrow_mut().failing.insert(index);
    }

    /// All successful programming operations, oldest first
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.borrow().writes.clone()
    }

    /// Number of times the bootloader session was opened
    pub fn open_count(&self) -> usize {
        self.state.borrow().open_count
    }

    /// Number of times the bootloader session was closed
    pub fn close_count(&self) -> usize {
        self.state.borrow().close_count
    }
}

impl Default for DummyFuses {
    fn default() -> Self {
        Self::new_default()
    }
}

impl BootSession for DummyFuses {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.opened = true;
        state.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.opened = false;
        state.close_count += 1;
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.state.borrow().opened
    }

    fn efuse_read_once(&mut self, index: u32) -> Option<u32> {
        let state = self.state.borrow();
        if !state.opened {
            log::warn!("dummy: {}", DummyError::NotOpen);
            return None;
        }
        state
            .read(index)
            .map_err(|e| log::debug!("dummy: {}", e))
            .ok()
    }

    fn efuse_program_once(&mut self, index: u32, value: u32) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.opened {
            log::warn!("dummy: {}", DummyError::NotOpen);
            return false;
        }
        let lock = index & BOOT_LOCK_FLAG != 0;
        state
            .program(index & !BOOT_LOCK_FLAG, value, lock)
            .map_err(|e| log::debug!("dummy: {}", e))
            .is_ok()
    }
}

impl EleHandler for DummyFuses {
    fn send_message(&mut self, message: &EleMessage) -> Result<EleResponse, TransportError> {
        let mut state = self.state.borrow_mut();
        match *message {
            EleMessage::ReadCommonFuse { index } => Ok(EleResponse::FuseValue(state.read(index)?)),
            EleMessage::WriteFuse {
                bit_position,
                bit_length,
                lock,
                value,
            } => {
                if bit_position % 32 != 0 || bit_length != 32 {
                    return Err(DummyError::Unaligned {
                        position: bit_position,
                        length: bit_length,
                    }
                    .into());
                }
                state.program(bit_position / 32, value, lock)?;
                Ok(EleResponse::Ack)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_only_sets_bits() {
        let mut dev = DummyFuses::new_default();
        dev.open().unwrap();
        dev.set_word(2, 0x0F);
        assert!(dev.efuse_program_once(2, 0xF0));
        assert_eq!(dev.efuse_read_once(2), Some(0xFF));
        assert_eq!(dev.writes(), vec![WriteRecord { index: 2, value: 0xF0, lock: false }]);
    }

    #[test]
    fn test_lock_flag() {
        let mut dev = DummyFuses::new_default();
        dev.open().unwrap();
        assert!(dev.efuse_program_once(3 | BOOT_LOCK_FLAG, 0x1));
        assert!(dev.is_locked(3));
        assert!(!dev.efuse_program_once(3, 0x2));
        assert_eq!(dev.word(3), Some(0x1));
    }

    #[test]
    fn test_closed_session() {
        let mut dev = DummyFuses::new_default();
        assert_eq!(dev.efuse_read_once(0), None);
        assert!(!dev.efuse_program_once(0, 1));
        dev.open().unwrap();
        dev.close().unwrap();
        assert_eq!(dev.open_count(), 1);
        assert_eq!(dev.close_count(), 1);
        assert!(!dev.is_opened());
    }

    #[test]
    fn test_read_protection_and_failures() {
        let mut dev = DummyFuses::new(DummyConfig {
            words: 8,
            opened: true,
        });
        dev.read_protect(1);
        dev.inject_failure(2);
        assert_eq!(dev.efuse_read_once(1), None);
        assert_eq!(dev.efuse_read_once(2), None);
        assert_eq!(dev.efuse_read_once(8), None);
        assert_eq!(dev.efuse_read_once(0), Some(0));
    }

    #[test]
    fn test_ele_messages() {
        let mut dev = DummyFuses::new_default();
        let shared = dev.clone();
        let resp = dev
            .send_message(&EleMessage::WriteFuse {
                bit_position: 5 * 32,
                bit_length: 32,
                lock: true,
                value: 0xCAFE,
            })
            .unwrap();
        assert_eq!(resp, EleResponse::Ack);
        assert_eq!(shared.word(5), Some(0xCAFE));
        assert!(shared.is_locked(5));

        let resp = dev
            .send_message(&EleMessage::ReadCommonFuse { index: 5 })
            .unwrap();
        assert_eq!(resp, EleResponse::FuseValue(0xCAFE));

        assert!(dev
            .send_message(&EleMessage::WriteFuse {
                bit_position: 3,
                bit_length: 8,
                lock: false,
                value: 1,
            })
            .is_err());
    }
}

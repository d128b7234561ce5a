//! Device transport capabilities
//!
//! Backends do not speak any wire protocol themselves. They drive one of the
//! sessions below, which a transport implementation (USB, UART, the
//! in-memory emulator) provides.

/// Error reported by a transport
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Session with the MCU bootloader
///
/// Mirrors the bootloader's eFuse commands: failures are reported as `None`
/// or `false`, the status code itself stays in the transport.
pub trait BootSession {
    /// Open the session
    fn open(&mut self) -> Result<(), TransportError>;

    /// Close the session
    fn close(&mut self) -> Result<(), TransportError>;

    /// Check whether the session is open
    fn is_opened(&self) -> bool;

    /// Read one OTP word
    fn efuse_read_once(&mut self, index: u32) -> Option<u32>;

    /// Program one OTP word
    ///
    /// Bit 24 of `index` requests locking the word after programming.
    fn efuse_program_once(&mut self, index: u32, value: u32) -> bool;
}

/// Request sent to the EdgeLock enclave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EleMessage {
    /// Read a common fuse word
    ReadCommonFuse {
        /// Fuse word index
        index: u32,
    },
    /// Program a run of fuse bits
    WriteFuse {
        /// First bit to program
        bit_position: u32,
        /// Number of bits to program
        bit_length: u32,
        /// Lock the fuse word after programming
        lock: bool,
        /// Value to program
        value: u32,
    },
}

/// Response of the EdgeLock enclave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EleResponse {
    /// The request was carried out
    Ack,
    /// Value of the requested fuse word
    FuseValue(u32),
}

/// Message channel to the EdgeLock enclave
pub trait EleHandler {
    /// Send one request and wait for the response
    fn send_message(&mut self, message: &EleMessage) -> Result<EleResponse, TransportError>;
}

impl<T: BootSession + ?Sized> BootSession for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn is_opened(&self) -> bool {
        (**self).is_opened()
    }

    fn efuse_read_once(&mut self, index: u32) -> Option<u32> {
        (**self).efuse_read_once(index)
    }

    fn efuse_program_once(&mut self, index: u32, value: u32) -> bool {
        (**self).efuse_program_once(index, value)
    }
}

impl<T: EleHandler + ?Sized> EleHandler for Box<T> {
    fn send_message(&mut self, message: &EleMessage) -> Result<EleResponse, TransportError> {
        (**self).send_message(message)
    }
}

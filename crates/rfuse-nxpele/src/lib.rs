//! rfuse-nxpele - EdgeLock enclave fuse operator
//!
//! Fuses are read with the "read common fuse" message and written with the
//! "write fuse" message, which addresses fuses by bit position. The message
//! channel is opened and closed by its owner.

mod error;

pub use error::{NxpeleError, Result};

use rfuse_core::operator::{render_operator_script, BackendKind, FuseOperator};
use rfuse_core::register::FuseRegister;
use rfuse_core::transport::{EleHandler, EleMessage, EleResponse};

/// Number of bits in one fuse word
const FUSE_BITS: u32 = 32;

/// Fuse operator driving the EdgeLock enclave
pub struct NxpeleOperator<H: EleHandler> {
    handler: H,
}

impl<H: EleHandler> NxpeleOperator<H> {
    /// Create an operator on top of an EdgeLock message channel
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    /// The underlying message channel
    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn read(&mut self, index: u32) -> Result<u32> {
        let response = self
            .handler
            .send_message(&EleMessage::ReadCommonFuse { index })
            .map_err(NxpeleError::MessageFailed)?;
        match response {
            EleResponse::FuseValue(value) => Ok(value),
            other => Err(NxpeleError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    fn write(&mut self, index: u32, value: u32, lock: bool) -> Result<()> {
        let bit_position = index
            .checked_mul(FUSE_BITS)
            .ok_or(NxpeleError::IndexOutOfRange(index))?;
        self.handler
            .send_message(&EleMessage::WriteFuse {
                bit_position,
                bit_length: FUSE_BITS,
                lock,
                value,
            })
            .map_err(NxpeleError::MessageFailed)?;
        Ok(())
    }
}

impl<H: EleHandler> FuseOperator for NxpeleOperator<H> {
    fn kind(&self) -> BackendKind {
        BackendKind::Nxpele
    }

    fn read_fuse(&mut self, index: u32) -> rfuse_core::Result<u32> {
        Ok(self.read(index)?)
    }

    fn write_fuse(&mut self, index: u32, value: u32, lock: bool) -> rfuse_core::Result<()> {
        log::debug!(
            "nxpele: write fuse {} with {:#x}{}",
            index,
            value,
            if lock { " and lock" } else { "" }
        );
        Ok(self.write(index, value, lock)?)
    }

    fn format_write_command(index: u32, value: u32, lock: bool, verify: bool) -> String {
        let mut cmd = format!("write-fuse --index {} --data 0x{:X}", index, value);
        if verify {
            log::debug!("The 'verify' parameter is not applicable for nxpele command");
        }
        if lock {
            cmd.push_str(" --lock");
        }
        cmd
    }

    fn format_script(
        family: &str,
        revision: &str,
        fuses: &[&FuseRegister],
    ) -> rfuse_core::Result<String> {
        render_operator_script(BackendKind::Nxpele, family, revision, fuses, |index, value| {
            Self::format_write_command(index, value, false, false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfuse_dummy::{DummyFuses, WriteRecord};

    type Operator = NxpeleOperator<DummyFuses>;

    #[test]
    fn test_write_command() {
        assert_eq!(
            Operator::format_write_command(3, 0xDEADBEEF, false, false),
            "write-fuse --index 3 --data 0xDEADBEEF"
        );
        // verify has no effect on the command
        assert_eq!(
            Operator::format_write_command(3, 0xAB, true, true),
            "write-fuse --index 3 --data 0xAB --lock"
        );
    }

    #[test]
    fn test_script() {
        let a = FuseRegister::new("SRK0", Some(128), 32).with_reset_value(0x0102_0304);
        let b = FuseRegister::new("SRK1", Some(129), 32);
        let script = Operator::format_script("mimx9352", "a1", &[&a, &b]).unwrap();
        assert!(script.starts_with("# NXPELE fuses programming script\n"));
        assert!(script.contains(
            "# Fuse SRK0, index 128 and value: 0x01020304.\nwrite-fuse --index 128 --data 0x1020304\n\n"
        ));
        assert!(script.ends_with(
            "# Fuse SRK1, index 129 and value: 0x00000000.\nwrite-fuse --index 129 --data 0x0\n\n"
        ));
    }

    #[test]
    fn test_bit_position_addressing() {
        let dev = DummyFuses::new_default();
        let mut op = NxpeleOperator::new(dev.clone());
        op.write_fuse(3, 0xDEADBEEF, true).unwrap();
        assert_eq!(
            dev.writes(),
            vec![WriteRecord {
                index: 3,
                value: 0xDEADBEEF,
                lock: true
            }]
        );
        assert_eq!(op.read_fuse(3).unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn test_failures() {
        let dev = DummyFuses::new_default();
        dev.read_protect(6);
        dev.lock_word(7);
        let mut op = NxpeleOperator::new(dev);

        assert!(op.read_fuse(6).unwrap_err().is_operation_failure());
        assert!(op.write_fuse(7, 1, false).unwrap_err().is_operation_failure());
        assert!(op.write_fuse(u32::MAX, 1, false).is_err());
    }
}

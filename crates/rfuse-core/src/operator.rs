//! Backend operator trait
//!
//! A fuse operator knows how to read and write single OTP words on a
//! connected device and how to express the same writes as commands of its
//! command line tool. The set of backends is closed: see [`BackendKind`].

use core::str::FromStr;

use crate::error::{Error, Result};
use crate::register::FuseRegister;
use crate::{hex_bytes, TOOL_NAME, TOOL_VERSION};

/// Fuse programming backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// MCU bootloader `efuse-program-once` commands
    Blhost,
    /// EdgeLock secure enclave `write-fuse` messages
    Nxpele,
}

impl BackendKind {
    /// All known backends
    pub const ALL: [BackendKind; 2] = [BackendKind::Blhost, BackendKind::Nxpele];

    /// Lowercase tool name, as used in the database and script file names
    pub const fn name(&self) -> &'static str {
        match self {
            BackendKind::Blhost => "blhost",
            BackendKind::Nxpele => "nxpele",
        }
    }
}

impl core::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Configuration(format!("No such fuse operator: {}", s)))
    }
}

/// Read and write single fuses through a backend
///
/// Implementations convert their own transport errors into
/// [`Error::OperationFailure`]. The associated formatting functions do not
/// need a device and are therefore not part of the object interface.
pub trait FuseOperator {
    /// Backend this operator drives
    fn kind(&self) -> BackendKind;

    /// Read the OTP word at `index`
    fn read_fuse(&mut self, index: u32) -> Result<u32>;

    /// Program the OTP word at `index`, locking it afterwards if `lock` is set
    fn write_fuse(&mut self, index: u32, value: u32, lock: bool) -> Result<()>;

    /// Format one write command of the backend's tool
    fn format_write_command(index: u32, value: u32, lock: bool, verify: bool) -> String
    where
        Self: Sized;

    /// Format a complete programming script for the given leaf registers
    fn format_script(family: &str, revision: &str, fuses: &[&FuseRegister]) -> Result<String>
    where
        Self: Sized;
}

/// Render a programming script in the common layout of all backends
///
/// `command` receives the OTP index and raw value of each fuse. Scripts never
/// lock fuses; locking is an explicit decision of the person running them.
pub fn render_operator_script(
    kind: BackendKind,
    family: &str,
    revision: &str,
    fuses: &[&FuseRegister],
    command: impl Fn(u32, u32) -> String,
) -> Result<String> {
    let mut out = format!(
        "# {} fuses programming script\n# Generated by {} {}\n# Chip: {} rev:{}\n\n\n",
        kind.name().to_uppercase(),
        TOOL_NAME,
        TOOL_VERSION,
        family,
        revision
    );
    for fuse in fuses {
        let index = fuse.otp_index().ok_or_else(|| {
            Error::Configuration(format!("OTP index is not defined for fuse {}", fuse.name()))
        })?;
        out.push_str(&format!(
            "# Fuse {}, index {} and value: {}.\n",
            fuse.name(),
            index,
            hex_bytes(&fuse.get_bytes_value(true))
        ));
        out.push_str(&command(index, fuse.get_value(true)?));
        out.push_str("\n\n");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("blhost".parse::<BackendKind>().unwrap(), BackendKind::Blhost);
        assert_eq!("NXPELE".parse::<BackendKind>().unwrap(), BackendKind::Nxpele);
        let err = "openocd".parse::<BackendKind>().unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(BackendKind::Nxpele.to_string(), "nxpele");
    }

    #[test]
    fn test_render_script() {
        let a = FuseRegister::new("FUSE_A", Some(3), 32)
            .with_reset_value(0x12)
            .with_uid("a");
        let b = FuseRegister::new("FUSE_B", Some(4), 16).with_reset_value(0xBEEF);
        let script = render_operator_script(BackendKind::Blhost, "mcx", "a1", &[&a, &b], |i, v| {
            format!("cmd {} 0x{:X}", i, v)
        })
        .unwrap();

        let expected_head = format!(
            "# BLHOST fuses programming script\n# Generated by rfuse {}\n# Chip: mcx rev:a1\n\n\n",
            TOOL_VERSION
        );
        assert!(script.starts_with(&expected_head));
        assert!(script.contains("# Fuse FUSE_A, index 3 and value: 0x00000012.\ncmd 3 0x12\n\n"));
        assert!(script.ends_with("# Fuse FUSE_B, index 4 and value: 0xbeef.\ncmd 4 0xBEEF\n\n"));
    }

    #[test]
    fn test_render_script_needs_index() {
        let virt = FuseRegister::new("VIRTUAL", None, 32);
        let err = render_operator_script(BackendKind::Nxpele, "imx", "latest", &[&virt], |_, _| {
            String::new()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}

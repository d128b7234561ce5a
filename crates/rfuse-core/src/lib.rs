//! rfuse-core - Core library for OTP fuse programming
//!
//! This crate provides the building blocks shared by every part of rfuse:
//! the typed fuse register map, the lock and write-policy model, the
//! backend operator trait, the per-family fuse database loader and the
//! declarative configuration format.
//!
//! It never talks to hardware itself. Backends (`rfuse-blhost`,
//! `rfuse-nxpele`, `rfuse-dummy`) implement the traits defined here and the
//! `rfuse-otp` crate orchestrates them.
//!
//! # Example
//!
//! ```ignore
//! use rfuse_core::database::FuseDatabase;
//!
//! let mut db = FuseDatabase::new();
//! db.load_dir(Path::new("fuses"))?;
//!
//! let family = db.get("mimxrt1189", "latest")?;
//! let mut regs = family.registers();
//! regs.find_reg_mut("BOOT_CFG0", false)?.set_value(0x10, true)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod database;
pub mod error;
pub mod lock;
pub mod operator;
pub mod register;
pub mod script;
pub mod transport;

pub use error::{Error, Result};

/// Name of the tool written into generated script headers
pub const TOOL_NAME: &str = "rfuse";

/// Version string written into generated script headers
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse a number that can be hex (0x...), binary (0b...) or decimal
pub fn parse_number(s: &str) -> core::result::Result<u64, String> {
    let s = s.trim().replace('_', "");
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex '{}': {}", s, e))
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u64::from_str_radix(bin, 2).map_err(|e| format!("invalid binary '{}': {}", s, e))
    } else {
        s.parse()
            .map_err(|e| format!("invalid number '{}': {}", s, e))
    }
}

/// Parse a `0x` prefixed hex string of any length into big-endian bytes
///
/// An odd number of digits is padded with a leading zero.
pub fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    let hex = hex.replace('_', "");
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let hex = if hex.len() % 2 == 1 {
        format!("0{}", hex)
    } else {
        hex
    };
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// Format bytes as a `0x` prefixed lowercase hex string
pub fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

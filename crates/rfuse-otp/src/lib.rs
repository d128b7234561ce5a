//! High-level fuse programming
//!
//! This crate ties the register model of `rfuse-core` to the backend
//! operators. The CLI only talks to the types exported here.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CLI (bin/rfuse)                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      rfuse-otp (this crate)                  │
//! │  - Fuses: lock-aware reads and writes, config export         │
//! │  - FuseScript: feature scripts from attribute sources        │
//! │  - registry: backend tag -> operator                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │    rfuse-core            │   │  Backend crates          │
//! │  - FuseRegisters         │   │  - rfuse-blhost          │
//! │  - FuseOperator trait    │   │  - rfuse-nxpele          │
//! │  - Fuse database         │   │                          │
//! └──────────────────────────┘   └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use rfuse_core::config::FuseConfig;
//! use rfuse_otp::{open_operator, DeviceHandle, Fuses};
//!
//! let config = FuseConfig::from_toml_file("fuses.toml")?;
//! let mut fuses = Fuses::load_from_config(&db, &config)?;
//! fuses.set_operator(open_operator(fuses.backend(), DeviceHandle::Boot(session))?)?;
//!
//! let names: Vec<String> = fuses.fuse_context().iter().map(|r| r.uid().to_string()).collect();
//! fuses.write_multiple(&names)?;
//! ```

mod fuses;
mod registry;
mod script;

pub use fuses::Fuses;
pub use registry::{
    available_devices, format_script, format_write_command, open_device, open_operator,
    parse_device_params, DeviceHandle, DeviceParams,
};
pub use script::{AttributeSource, AttributeValue, FuseScript};

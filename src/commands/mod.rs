//! CLI command implementations
//!
//! Device commands (`read`, `write`) open the device named on the command
//! line and attach an operator of the family's backend to a [`Fuses`]
//! instance. Script commands never touch a device.
//!
//! [`Fuses`]: rfuse_otp::Fuses

mod list;
mod read;
mod script;
mod write;

pub use list::{list_devices, list_families};
pub use read::run_read;
pub use script::{run_feature_script, run_script};
pub use write::run_write;

/// Result type of the command implementations
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

//! Read command implementation

use rfuse_core::database::FuseDatabase;
use rfuse_core::hex_bytes;
use rfuse_otp::{open_device, Fuses};
use std::path::Path;

use super::CommandResult;

/// Read one register or the whole device and print the values
pub fn run_read(
    db: &FuseDatabase,
    device: &str,
    family: &str,
    revision: &str,
    register: Option<&str>,
    output: Option<&Path>,
    diff: bool,
) -> CommandResult {
    let mut fuses = Fuses::new(db, family, revision)?;
    fuses.set_operator(open_device(device, fuses.backend())?)?;

    match register {
        Some(name) => {
            fuses.read_single(name, true)?;
        }
        None => fuses.read_all()?,
    }

    println!("{:<24} {:>6}  {}", "Register", "Index", "Value");
    println!("{}", "-".repeat(60));
    for reg in fuses.fuse_context() {
        let index = reg
            .otp_index()
            .map(|i| i.to_string())
            .unwrap_or_else(|| "group".to_string());
        println!(
            "{:<24} {:>6}  {}",
            reg.name(),
            index,
            hex_bytes(&reg.get_bytes_value(true))
        );
    }

    if let Some(output) = output {
        fuses.get_config(diff)?.to_toml_file(output)?;
        println!("Configuration saved to {}", output.display());
    }

    Ok(())
}

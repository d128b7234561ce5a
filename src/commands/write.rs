//! Write command implementation

use rfuse_core::config::FuseConfig;
use rfuse_core::database::FuseDatabase;
use rfuse_otp::{open_device, Fuses};
use std::path::Path;

use super::CommandResult;

/// Program every register of a configuration, in file order
pub fn run_write(db: &FuseDatabase, device: &str, config: &Path, lock: bool) -> CommandResult {
    let config = FuseConfig::from_toml_file(config)?;
    let mut fuses = Fuses::load_from_config(db, &config)?;
    fuses.set_operator(open_device(device, fuses.backend())?)?;

    let names: Vec<String> = fuses
        .fuse_context()
        .iter()
        .map(|reg| reg.uid().to_string())
        .collect();
    if names.is_empty() {
        println!("Nothing to write");
        return Ok(());
    }

    if lock {
        for name in &names {
            fuses.write_single(name, true)?;
        }
    } else {
        fuses.write_multiple(&names)?;
    }

    println!(
        "Programmed {} register(s) of {}{}",
        names.len(),
        fuses.family(),
        if lock { " and locked them" } else { "" }
    );
    Ok(())
}

//! Script commands implementation

use rfuse_core::config::FuseConfig;
use rfuse_core::database::FuseDatabase;
use rfuse_otp::{FuseScript, Fuses};
use std::fs;
use std::path::Path;

use super::CommandResult;

/// Render the programming script of a configuration
pub fn run_script(db: &FuseDatabase, config: &Path, output: Option<&Path>) -> CommandResult {
    let config = FuseConfig::from_toml_file(config)?;
    let fuses = Fuses::load_from_config(db, &config)?;
    let script = fuses.create_fuse_script()?;

    match output {
        Some(path) => {
            fs::write(path, &script)?;
            println!("Script written to {}", path.display());
        }
        None => print!("{}", script),
    }
    Ok(())
}

/// Render the fuse script of a family feature from a TOML attribute file
#[allow(clippy::too_many_arguments)]
pub fn run_feature_script(
    db: &FuseDatabase,
    family: &str,
    revision: &str,
    feature: &str,
    index: Option<u32>,
    attributes: &Path,
    output_dir: Option<&Path>,
    info: bool,
) -> CommandResult {
    let attrs: toml::Table = toml::from_str(&fs::read_to_string(attributes)?)?;
    let script = FuseScript::new(db, family, revision, feature, index)?;

    match output_dir {
        Some(dir) if !info => {
            let path = script.write_script(&format!("{}_fuses", feature), dir, &attrs)?;
            println!("Script written to {}", path.display());
        }
        _ => print!("{}", script.generate_script(&attrs, info)?),
    }
    Ok(())
}

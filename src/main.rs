//! rfuse - OTP fuse programmer
//!
//! Reads, programs and scripts one-time-programmable fuses of NXP MCUs and
//! application processors.
//!
//! # Architecture
//!
//! Every device family is described in the fuse database (RON files). A
//! family names the backend used to program it:
//! - **blhost** - MCU bootloader `efuse-program-once` commands
//! - **nxpele** - EdgeLock secure enclave `write-fuse` messages
//!
//! The same commands (read, write, script) work for both backends; the lock
//! rules of the family are enforced before anything reaches the device.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use rfuse_core::database::FuseDatabase;

use std::path::{Path, PathBuf};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    // Load fuse database
    let db = match load_fuse_database(cli.fuse_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load fuse database: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Loaded {} family definitions", db.len());

    let result = match cli.command {
        Commands::ListFamilies => {
            commands::list_families(&db);
            Ok(())
        }
        Commands::ListDevices => {
            commands::list_devices();
            Ok(())
        }
        Commands::Read {
            device,
            family,
            revision,
            register,
            output,
            diff,
        } => commands::run_read(
            &db,
            &device,
            &family,
            &revision,
            register.as_deref(),
            output.as_deref(),
            diff,
        ),
        Commands::Write {
            device,
            config,
            lock,
        } => commands::run_write(&db, &device, &config, lock),
        Commands::Script { config, output } => {
            commands::run_script(&db, &config, output.as_deref())
        }
        Commands::FeatureScript {
            family,
            revision,
            feature,
            index,
            attributes,
            output_dir,
            info,
        } => commands::run_feature_script(
            &db,
            &family,
            &revision,
            &feature,
            index,
            &attributes,
            output_dir.as_deref(),
            info,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Load the fuse database from a path or the default locations
fn load_fuse_database(path: Option<&Path>) -> Result<FuseDatabase, Box<dyn std::error::Error>> {
    let mut db = FuseDatabase::new();

    if let Some(path) = path {
        // User specified a path
        if path.is_dir() {
            db.load_dir(path)?;
        } else if path.is_file() {
            db.load_file(path)?;
        } else {
            return Err(format!("Fuse database path not found: {}", path.display()).into());
        }
    } else {
        // Try default locations
        let default_paths = [
            PathBuf::from("fuses"),
            PathBuf::from("/usr/share/rfuse/fuses"),
            PathBuf::from("/usr/local/share/rfuse/fuses"),
        ];

        let mut loaded = false;
        for dir in &default_paths {
            if dir.is_dir() {
                match db.load_dir(dir) {
                    Ok(count) => {
                        log::debug!("Loaded {} families from {}", count, dir.display());
                        loaded = true;
                    }
                    Err(e) => {
                        log::warn!("Failed to load families from {}: {}", dir.display(), e);
                    }
                }
            }
        }

        if !loaded {
            log::warn!("No fuse database found in default locations");
        }
    }

    Ok(db)
}

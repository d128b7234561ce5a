//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generate dynamic help text for the device argument
fn device_help() -> String {
    format!(
        "Device to use, with optional parameters (e.g. dummy:words=64) [available: {}]",
        rfuse_otp::available_devices().join(", ")
    )
}

#[derive(Parser)]
#[command(name = "rfuse")]
#[command(author, version, about = "OTP fuse programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the fuse database (a .ron file or a directory of them)
    /// Defaults to looking in ./fuses/ and /usr/share/rfuse/fuses/
    #[arg(long, global = true)]
    pub fuse_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List device families of the fuse database
    ListFamilies,

    /// List the devices compiled into this build
    ListDevices,

    /// Read fuses from a device
    Read {
        /// Device to use
        #[arg(short, long, help = device_help())]
        device: String,

        /// Device family
        #[arg(short, long)]
        family: String,

        /// Silicon revision
        #[arg(short, long, default_value = "latest")]
        revision: String,

        /// Read only this register (name or uid)
        #[arg(long)]
        register: Option<String>,

        /// Save the read values as a TOML configuration
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only export registers that differ from their reset value
        #[arg(long)]
        diff: bool,
    },

    /// Program the fuses of a configuration
    Write {
        /// Device to use
        #[arg(short, long, help = device_help())]
        device: String,

        /// Fuse configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Lock every written fuse
        #[arg(long)]
        lock: bool,
    },

    /// Render the programming script of a configuration
    Script {
        /// Fuse configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render the fuse script of a family feature
    FeatureScript {
        /// Device family
        #[arg(short, long)]
        family: String,

        /// Silicon revision
        #[arg(short, long, default_value = "latest")]
        revision: String,

        /// Feature name (e.g. ahab)
        feature: String,

        /// Script index, selects `fuses_<index>` instead of `fuses`
        #[arg(long)]
        index: Option<u32>,

        /// Attribute values (TOML table)
        #[arg(short, long)]
        attributes: PathBuf,

        /// Directory to write `<feature>_fuses_<backend>.bcf` to (stdout if omitted)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Only list OTP indexes and values
        #[arg(long)]
        info: bool,
    },
}

use clap::Parser;

use std::path::PathBuf;

use convpn_lib::{config, logging, ovpn, socket};

/// convpn system service - supervises an OpenVPN connection on Linux desktops
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Socket path for communication with this service
    #[arg(
        short,
        long,
        env = socket::ENV_VAR,
        default_value = socket::DEFAULT_PATH,
    )]
    pub socket_path: PathBuf,

    /// Persisted user configuration file
    #[arg(
        short,
        long,
        env = config::ENV_VAR,
        default_value = config::DEFAULT_PATH,
    )]
    pub config_path: PathBuf,

    /// Directory scanned for selectable `.ovpn` location files
    #[arg(long, env = ovpn::ENV_VAR, default_value = ovpn::DEFAULT_LOCATIONS_DIR)]
    pub locations_dir: PathBuf,

    /// Log file path; omit to log to stdout
    #[arg(long, env = logging::ENV_VAR_LOG_FILE, default_value = logging::DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Run in the foreground without daemonizing (log to stdout, skip pidfile bookkeeping)
    #[arg(long)]
    pub foreground: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

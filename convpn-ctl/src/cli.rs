use clap::{Parser, Subcommand};

use std::path::PathBuf;

use convpn_lib::command::Command;
use convpn_lib::socket;

/// Control client for the convpn connection supervisor
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Socket path for communication with the supervisor daemon
    #[arg(short, long, env = socket::ENV_VAR, default_value = socket::DEFAULT_PATH)]
    pub socket_path: PathBuf,

    /// Print the response as JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Clone, Debug, Subcommand)]
pub enum CliCommand {
    /// Check whether the daemon is reachable
    Ping,
    /// Show current connection status
    Status,
    /// List available `.ovpn` locations
    ListLocations,
    /// Connect to a named location
    Connect { location: String },
    /// Disconnect and restore host networking
    Disconnect,
    /// Toggle DoH and LAN blocking flags
    SetFlags {
        #[arg(long)]
        doh_block: Option<bool>,
        #[arg(long)]
        lan_block: Option<bool>,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}

impl From<CliCommand> for Command {
    fn from(cmd: CliCommand) -> Self {
        match cmd {
            CliCommand::Ping => Command::Ping,
            CliCommand::Status => Command::Status,
            CliCommand::ListLocations => Command::ListLocations,
            CliCommand::Connect { location } => Command::Connect { location },
            CliCommand::Disconnect => Command::Disconnect,
            CliCommand::SetFlags { doh_block, lan_block } => Command::SetFlags { doh_block, lan_block },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec!["convpn-ctl", "--socket-path", "/tmp/convpn.sock", "status"]
    }

    #[test]
    fn parses_cli_with_minimum_arguments() -> anyhow::Result<()> {
        let args = Cli::try_parse_from(base_args())?;
        assert!(matches!(args.command, CliCommand::Status));
        Ok(())
    }

    #[test]
    fn connect_command_converts_to_library_command() {
        let cmd: Command = CliCommand::Connect { location: "zurich".into() }.into();
        assert_eq!(cmd, Command::Connect { location: "zurich".into() });
    }
}

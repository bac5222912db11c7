//! Request/response protocol exchanged between the daemon and `convpn-ctl`
//! over the control socket.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt::{self, Display};

use crate::journal::JournalSnapshot;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed serializing command: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Command {
    Ping,
    Status,
    ListLocations,
    Connect { location: String },
    Disconnect,
    SetFlags { doh_block: Option<bool>, lan_block: Option<bool> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Response {
    Pong,
    Status(StatusResponse),
    Locations(Vec<String>),
    Connecting,
    Disconnected,
    FlagsUpdated,
    Error(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub state: SupervisorState,
    pub location: Option<String>,
    pub uptime_secs: Option<u64>,
    pub expected_public_ip: Option<String>,
    pub forwarded_port: Option<String>,
    pub reconnections: u32,
    pub corrections: u32,
    pub guardian_high_alert: bool,
    pub journal: Option<JournalSnapshot>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Connecting,
    Up,
    Reconnecting,
    FailClosed,
}

impl Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Connecting => "connecting",
            SupervisorState::Up => "up",
            SupervisorState::Reconnecting => "reconnecting",
            SupervisorState::FailClosed => "fail-closed",
        };
        f.write_str(s)
    }
}

pub fn serialize(cmd: &Command) -> Result<String, Error> {
    serde_json::to_string(cmd).map_err(Error::Serialization)
}

pub fn serialize_response(resp: &Response) -> Result<String, Error> {
    serde_json::to_string(resp).map_err(Error::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_command_round_trips_through_json() {
        let cmd = Command::Connect { location: "frankfurt".into() };
        let json = serialize(&cmd).expect("serialize");
        let back: Command = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cmd, back);
    }

    #[test]
    fn supervisor_state_display_is_lowercase() {
        assert_eq!(SupervisorState::FailClosed.to_string(), "fail-closed");
    }
}

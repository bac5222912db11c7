//! Shared error type for the supervisor's network-mutation modules.
//!
//! Mirrors the teacher's per-area aggregation style: one `Error` enum that
//! composes the lower-level errors its mutators actually produce, plus a
//! catch-all for conditions that don't deserve their own variant.

use thiserror::Error;

use convpn_lib::{journal, shell_command_ext};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    ShellCommand(#[from] shell_command_ext::Error),
    #[error(transparent)]
    Journal(#[from] journal::Error),
    #[error("unable to determine default/physical interface")]
    NoInterface,
    #[error("no DNS servers were pushed by the tunnel")]
    NoPushedDns,
    #[error("unable to determine remote tunnel endpoint")]
    NoRemoteEndpoint,
    #[error("tunnel did not reach \"Initialization Sequence Completed\" within the connect timeout")]
    ConnectTimeout,
    #[error("tunnel failed to start after {0} attempts")]
    AllAttemptsFailed(u32),
    #[error("public IP did not change after connecting")]
    PublicIpUnchanged,
    #[error("iptables error: {0}")]
    IpTables(String),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("{0}")]
    General(String),
}

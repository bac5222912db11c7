//! Persisted record of every host mutation the supervisor has applied.
//!
//! The journal is the single source of truth for crash recovery: every
//! mutator writes its key here *before* touching host state, so a crash
//! between the two leaves a recipe for undoing exactly what was started.
//! Keys are never deleted except by a full teardown.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error writing journal at `{path}`: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("IO error reading journal at `{path}`: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("journal at `{path}` is corrupt: {source}")]
    Corrupt { path: PathBuf, source: serde_json::Error },
    #[error("failed serializing journal: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A single recognized mutation key. Kept as a typed enum (rather than raw
/// strings) so a typo cannot silently create a new, unrecovered key.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    PhysicalInterface,
    TunDevice,
    NmConnection,
    NmOriginalState,
    VpnStarted,
    FirewallIface,
    UfwWasActive,
    DohBlocked,
    DnsApplied,
    ResolvedBackend,
    ResolvLocked,
    BackupCreated,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Journal {
    pub pid: u32,
    pub actions: HashMap<Action, serde_json::Value>,
}

/// A read-only view of the journal suitable for exposing over the control
/// socket without handing out the live mutable map.
pub type JournalSnapshot = Journal;

impl Journal {
    pub fn new(pid: u32) -> Self {
        Self { pid, actions: HashMap::new() }
    }

    pub fn set<T: Serialize>(&mut self, action: Action, value: T) -> Result<(), Error> {
        let v = serde_json::to_value(value)?;
        self.actions.insert(action, v);
        Ok(())
    }

    pub fn get<T: for<'de> Deserialize<'de>>(&self, action: Action) -> Option<T> {
        self.actions.get(&action).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, action: Action) -> bool {
        self.actions.contains_key(&action)
    }

    /// Writes the journal atomically: serialize to a temp file in the same
    /// directory, then rename over the destination. A crash mid-write never
    /// leaves a torn journal — it leaves either the old file or the new one.
    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|source| Error::Write { path: tmp.clone(), source })?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|source| Error::Write { path: path.to_path_buf(), source })
    }

    /// Loads a journal from disk. A missing file is not an error at this
    /// layer — callers distinguish "absent" from "present" via `load_opt`.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
        serde_json::from_slice(&bytes).map_err(|source| Error::Corrupt { path: path.to_path_buf(), source })
    }

    /// Loads a journal if present; treats both "file missing" and "file
    /// corrupt" as no journal to adopt, since a torn write looks the same
    /// as never having written at all.
    pub async fn load_opt(path: &Path) -> Option<Self> {
        match Self::load(path).await {
            Ok(j) => Some(j),
            Err(Error::Read { .. }) | Err(Error::Corrupt { .. }) => None,
            Err(_) => None,
        }
    }

    pub async fn delete(path: &Path) -> Result<(), Error> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::Write { path: path.to_path_buf(), source }),
        }
    }
}

//! Ties an in-memory [`Journal`] to its on-disk path so mutators can
//! satisfy the "journal write happens before the host mutation" invariant
//! in one call instead of two.

use serde::Serialize;
use std::path::{Path, PathBuf};

use convpn_lib::journal::{Action, Journal};

use crate::error::Error;

pub struct JournalHandle {
    pub path: PathBuf,
    pub journal: Journal,
}

impl JournalHandle {
    pub fn new(path: PathBuf, journal: Journal) -> Self {
        Self { path, journal }
    }

    /// Records `action` and flushes the journal to disk before returning,
    /// so the caller's subsequent host mutation is always preceded by a
    /// durable record of intent.
    pub async fn set<T: Serialize>(&mut self, action: Action, value: T) -> Result<(), Error> {
        self.journal.set(action, value)?;
        self.journal.save(&self.path).await?;
        Ok(())
    }

    pub fn get<T: for<'de> serde::Deserialize<'de>>(&self, action: Action) -> Option<T> {
        self.journal.get(action)
    }

    pub async fn delete(path: &Path) -> Result<(), Error> {
        Journal::delete(path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_persists_to_disk_immediately() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("convpn.lock");
        let mut handle = JournalHandle::new(path.clone(), Journal::new(42));

        handle.set(Action::VpnStarted, true).await?;

        let reloaded = Journal::load(&path).await?;
        assert_eq!(reloaded.get::<bool>(Action::VpnStarted), Some(true));
        Ok(())
    }
}

//! Discovery of selectable `.ovpn` location files.

use thiserror::Error;

use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOCATIONS_DIR: &str = "/etc/convpn/locations";
pub const ENV_VAR: &str = "CONVPN_LOCATIONS_DIR";

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error reading `{dir}`: {source}")]
    ReadDir { dir: PathBuf, source: io::Error },
    #[error("no `.ovpn` files found in `{0}`")]
    NoLocations(PathBuf),
    #[error("unknown location `{0}`")]
    UnknownLocation(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Location {
    pub name: String,
    pub path: PathBuf,
}

/// Lists `.ovpn` files under `dir`, using each file's stem as its
/// user-facing location name, sorted for stable ordering.
pub async fn list_locations(dir: &Path) -> Result<Vec<Location>, Error> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| Error::ReadDir { dir: dir.to_path_buf(), source })?;

    let mut locations = Vec::new();
    while let Some(entry) =
        entries.next_entry().await.map_err(|source| Error::ReadDir { dir: dir.to_path_buf(), source })?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("ovpn") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                locations.push(Location { name: stem.to_string(), path: path.clone() });
            }
        }
    }

    if locations.is_empty() {
        return Err(Error::NoLocations(dir.to_path_buf()));
    }
    locations.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(locations)
}

pub fn find_location<'a>(locations: &'a [Location], name: &str) -> Result<&'a Location, Error> {
    locations.iter().find(|l| l.name == name).ok_or_else(|| Error::UnknownLocation(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_ovpn_files_sorted_by_name() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("zurich.ovpn"), "").await?;
        tokio::fs::write(dir.path().join("amsterdam.ovpn"), "").await?;
        tokio::fs::write(dir.path().join("readme.txt"), "").await?;

        let locations = list_locations(dir.path()).await?;
        let names: Vec<&str> = locations.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["amsterdam", "zurich"]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_directory_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = list_locations(dir.path()).await.expect_err("should error");
        assert!(matches!(err, Error::NoLocations(_)));
        Ok(())
    }

    #[tokio::test]
    async fn find_location_reports_unknown_names() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("zurich.ovpn"), "").await?;
        let locations = list_locations(dir.path()).await?;
        let err = find_location(&locations, "frankfurt").expect_err("should error");
        assert!(matches!(err, Error::UnknownLocation(_)));
        Ok(())
    }
}

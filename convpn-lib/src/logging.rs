//! Structured logging setup, reloadable on SIGHUP so external log rotation
//! does not require a restart of the supervisor.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

pub type FileFmtLayer =
    fmt::Layer<tracing_subscriber::Registry, fmt::format::DefaultFields, fmt::format::Format, BoxMakeWriter>;

pub type LogReloadHandle = reload::Handle<FileFmtLayer, tracing_subscriber::Registry>;

const DEFAULT_LOG_FILTER: &str = "info";
pub const ENV_VAR_LOG_FILE: &str = "CONVPN_LOG_FILE";
pub const DEFAULT_LOG_FILE: &str = "/var/log/convpn.log";

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open log file `{path}`: {source}")]
    OpenLogFile { path: PathBuf, source: std::io::Error },
}

fn make_layer(path: &Path) -> Result<FileFmtLayer, Error> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::OpenLogFile { path: path.to_path_buf(), source })?;
    Ok(fmt::layer().with_writer(BoxMakeWriter::new(file)).with_ansi(false))
}

fn make_stdout_layer() -> FileFmtLayer {
    fmt::layer().with_writer(BoxMakeWriter::new(std::io::stdout)).with_ansi(true)
}

/// Installs the global subscriber. `log_file` of `None` logs to stdout
/// instead, which is also how the reload handle behaves if later asked to
/// swap in a path — the handle always governs a file-backed writer once one
/// has been requested.
pub fn init(log_file: Option<&Path>) -> Result<LogReloadHandle, Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let layer = match log_file {
        Some(path) => make_layer(path)?,
        None => make_stdout_layer(),
    };
    let (reload_layer, reload_handle) = reload::Layer::new(layer);
    tracing_subscriber::registry().with(reload_layer).with(filter).init();
    Ok(reload_handle)
}

/// Re-opens the configured log file, picking up external rotation (e.g.
/// `logrotate`'s move-then-signal pattern). A no-op when logging to stdout.
pub fn reload(handle: &LogReloadHandle, log_file: Option<&Path>) -> Result<(), Error> {
    let layer = match log_file {
        Some(path) => make_layer(path)?,
        None => make_stdout_layer(),
    };
    handle.reload(layer).map_err(|_| Error::OpenLogFile {
        path: log_file.map(Path::to_path_buf).unwrap_or_default(),
        source: std::io::Error::other("reload handle is gone"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_layer_creates_missing_log_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("convpn.log");
        make_layer(&path)?;
        assert!(path.exists());
        Ok(())
    }
}

//! Per-session file logging shared by the binaries.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::Level;
use uuid::Uuid;

pub struct LogSession {
    pub session_id: String,
    pub log_file: PathBuf,
}

/// Install a `tracing` subscriber writing to `logs/<prefix>_<session>.log`.
pub fn init(prefix: &str, verbose: bool) -> Result<LogSession> {
    init_in(Path::new("logs"), prefix, verbose)
}

pub fn init_in(dir: &Path, prefix: &str, verbose: bool) -> Result<LogSession> {
    let session_id = Uuid::new_v4().to_string();

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let log_file = dir.join(format!("{}_{}.log", prefix, session_id));
    let writer = std::fs::File::create(&log_file)
        .with_context(|| format!("Failed to create log file {}", log_file.display()))?;

    tracing_subscriber::fmt()
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .with_ansi(false)
        .with_writer(writer)
        .init();

    Ok(LogSession {
        session_id,
        log_file,
    })
}

//! `tracing` subscriber bootstrap for the CLI.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::env_string_opt;

pub const LOG_FILE_ENV_VAR: &str = "BRANCH_CHAT_LOG_FILE";
pub const DEFAULT_FILTER: &str = "warn";

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Output goes to the file named by `BRANCH_CHAT_LOG_FILE` when set, else stderr.
/// A subscriber that is already installed is left in place.
pub fn init() -> std::io::Result<()> {
    match env_string_opt(LOG_FILE_ENV_VAR) {
        Some(path) => init_with_file(Path::new(path.trim())),
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init();
            Ok(())
        }
    }
}

fn init_with_file(path: &Path) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

fn env_filter() -> EnvFilter {
    // Falls back to the default when RUST_LOG is unset or invalid.
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_is_created_on_init() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("branch-chat.log");

        init_with_file(&path).expect("log file should open");

        assert!(path.exists());
    }
}

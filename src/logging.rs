use std::{fs, sync::Mutex};

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Environment variable that overrides the configured log filter.
pub const LOG_ENV: &str = "BOSH_LOG";

/// Sets up file logging.
///
/// The writer is a plain `Mutex<File>`: no background thread may exist when
/// the shell forks. Falls back to stderr when the log file cannot be opened.
pub fn init(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .ok()
        .or_else(|| EnvFilter::try_new(&config.log_level).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    if let Some(parent) = config.log_file.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false);

    let installed = match file {
        Ok(file) => builder.with_writer(Mutex::new(file)).try_init(),
        Err(_) => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| anyhow!("cannot set up logging: {e}"))
}

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

use crate::{
    parse::DEFAULT_MAX_ARGS,
    shell::{Flow, Shell},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fixed prompt; `None` builds `user@:cwd$ ` on every read.
    pub prompt: Option<String>,
    pub max_args: usize,
    pub history_file: PathBuf,
    pub history_size: usize,
    pub log_level: String,
    pub log_file: PathBuf,
    pub greeting: bool,
    pub startup: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: None,
            max_args: DEFAULT_MAX_ARGS,
            history_file: data_dir().join("history"),
            history_size: 1000,
            log_level: "warn".to_string(),
            log_file: data_dir().join("bosh.log"),
            greeting: true,
            startup: vec![],
        }
    }
}

//config file
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bosh/bosh.toml")
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bosh")
}

/// Loads the config, falling back to defaults when it is missing or broken.
///
/// Runs before logging is set up, so problems go straight to stderr.
pub fn init(path: Option<&Path>) -> Config {
    let path = path.map_or_else(config_file_path, Path::to_path_buf);
    match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("bosh: {e:#}, using defaults");
            Config::default()
        }
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("cannot read {}", path.display()));
        }
    };
    parse_config(&content).with_context(|| format!("invalid config {}", path.display()))
}

fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

/// Runs the configured startup lines through the normal pipeline.
pub fn run_startup(config: &Config, shell: &mut Shell) -> Flow {
    for cmd_line in &config.startup {
        if cmd_line.trim().is_empty() {
            continue;
        }
        match shell.exec(cmd_line) {
            Ok(Flow::Exit) => return Flow::Exit,
            Ok(Flow::Continue) => {}
            Err(e) => eprintln!("[X] Startup failed: {e}"),
        }
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_config_is_all_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.prompt, None);
        assert_eq!(config.max_args, 100);
        assert_eq!(config.history_size, 1000);
        assert_eq!(config.log_level, "warn");
        assert!(config.greeting);
        assert!(config.startup.is_empty());
    }

    #[test]
    fn fields_override_defaults() {
        let config = parse_config(
            r#"
prompt = "bosh> "
max_args = 8
greeting = false
startup = ["echo ready"]
history_file = "/tmp/bosh-history"
"#,
        )
        .unwrap();
        assert_eq!(config.prompt.as_deref(), Some("bosh> "));
        assert_eq!(config.max_args, 8);
        assert!(!config.greeting);
        assert_eq!(config.startup, ["echo ready"]);
        assert_eq!(config.history_file, PathBuf::from("/tmp/bosh-history"));
        assert_eq!(config.history_size, 1000);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(parse_config("max_args = \"lots\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.max_args, DEFAULT_MAX_ARGS);
    }

    #[test]
    fn broken_file_falls_back_in_init() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bosh.toml");
        fs::write(&path, "prompt = [").unwrap();

        assert!(load_config(&path).is_err());
        let config = init(Some(&path));
        assert_eq!(config.max_args, DEFAULT_MAX_ARGS);
    }
}

//! Command-line interface and config loading.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use vg_domain::config::Config;
use vg_domain::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "voicegate.toml";

#[derive(Parser)]
#[command(name = "voicegate", about = "Real-time multi-agent voice orchestrator")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway (default).
    Serve,
    /// Print the version and exit.
    Version,
}

/// Load the config: an explicit `--config` path must exist; the default
/// path is optional and falls back to built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("cannot read {}: {e}", path.display()))
            })?;
            Ok((Config::from_toml_str(&raw)?, Some(path.to_path_buf())))
        }
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                let raw = std::fs::read_to_string(default)?;
                Ok((Config::from_toml_str(&raw)?, Some(default.to_path_buf())))
            } else {
                Ok((Config::default(), None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_missing_path_errors() {
        assert!(load_config(Some(Path::new("/definitely/not/here.toml"))).is_err());
    }

    #[test]
    fn explicit_path_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9000").unwrap();
        let (config, path) = load_config(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9000);
        assert!(path.is_some());
    }
}

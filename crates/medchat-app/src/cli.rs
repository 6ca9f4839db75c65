//! CLI argument definitions for the medchat binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Medchat - a medical-topic chat service backed by a remote language model.
#[derive(Parser, Debug)]
#[command(name = "medchat", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port", global = true)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Register a user and print the assigned id.
    AddUser {
        /// Unique username.
        username: String,
    },
    /// Write a default configuration file to the resolved config path.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > MEDCHAT_CONFIG env var > ~/.medchat/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("MEDCHAT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".medchat").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let args = CliArgs::try_parse_from(["medchat"]).unwrap();
        assert_eq!(args.command(), Command::Serve);
        assert!(args.port.is_none());
    }

    #[test]
    fn test_add_user_subcommand() {
        let args = CliArgs::try_parse_from(["medchat", "add-user", "ada"]).unwrap();
        assert_eq!(
            args.command(),
            Command::AddUser {
                username: "ada".to_string()
            }
        );
    }

    #[test]
    fn test_flags_after_subcommand() {
        let args =
            CliArgs::try_parse_from(["medchat", "serve", "--port", "9000", "-c", "/tmp/m.toml"])
                .unwrap();
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/m.toml"));
    }

    #[test]
    fn test_log_level_priority() {
        let args = CliArgs::try_parse_from(["medchat", "-l", "debug"]).unwrap();
        assert_eq!(args.resolve_log_level("info"), "debug");

        let args = CliArgs::try_parse_from(["medchat"]).unwrap();
        assert_eq!(args.resolve_log_level("warn"), "warn");
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("data/medchat.db"), PathBuf::from("data/medchat.db"));
        assert_eq!(expand_home("/var/lib/m.db"), PathBuf::from("/var/lib/m.db"));
    }

    #[test]
    fn test_init_config_subcommand() {
        let args = CliArgs::try_parse_from(["medchat", "init-config", "--force"]).unwrap();
        assert_eq!(args.command(), Command::InitConfig { force: true });

        let args = CliArgs::try_parse_from(["medchat", "init-config"]).unwrap();
        assert_eq!(args.command(), Command::InitConfig { force: false });
    }

    #[test]
    fn test_rejects_missing_username() {
        assert!(CliArgs::try_parse_from(["medchat", "add-user"]).is_err());
    }
}

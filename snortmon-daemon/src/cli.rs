//! CLI argument definitions for snortmon-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// snortmon alert ingestion daemon.
///
/// Tails the Snort `alert_json` log into the event store and serves
/// the query API.
#[derive(Parser, Debug)]
#[command(name = "snortmon-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to snortmon.toml configuration file.
    #[arg(short, long, default_value = "/etc/snortmon/snortmon.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply CLI overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut snortmon_core::SnortmonConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_etc() {
        let cli = DaemonCli::parse_from(["snortmon-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/snortmon/snortmon.toml"));
        assert!(!cli.validate);
    }

    #[test]
    fn overrides_take_precedence() {
        let cli = DaemonCli::parse_from([
            "snortmon-daemon",
            "--log-level",
            "debug",
            "--pid-file",
            "",
        ]);
        let mut config = snortmon_core::SnortmonConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "json");
        assert!(config.general.pid_file.is_empty());
    }
}

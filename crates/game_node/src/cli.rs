//! Command-line interface handling for a game node.
//!
//! This module provides command-line argument parsing using the `clap` crate.
//! Every flag is optional and overrides the matching configuration file value.

use crate::config::{AppConfig, NodeRole};
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the node role
    pub role: Option<NodeRole>,
    /// Optional override for bind address
    pub bind_address: Option<String>,
    /// Optional override for upstream address
    pub upstream_address: Option<String>,
    /// Optional override for the worker count
    pub workers: Option<usize>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

fn command() -> Command {
    Command::new("Game Node")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Game backend service node running on the game_net connection engine")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("role")
                .short('r')
                .long("role")
                .value_name("ROLE")
                .help("Service role to run")
                .value_parser(["center", "client"]),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Listen address for the center role (e.g., 127.0.0.1:7100)"),
        )
        .arg(
            Arg::new("upstream")
                .short('u')
                .long("upstream")
                .value_name("ADDRESS")
                .help("Upstream address for the client role"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("COUNT")
                .help("Number of network worker threads")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
}

impl CliArgs {
    /// Parses the process's command line arguments.
    ///
    /// Exits with a usage message on invalid input.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            role: matches
                .get_one::<String>("role")
                .and_then(|role| role.parse().ok()),
            bind_address: matches.get_one::<String>("bind").cloned(),
            upstream_address: matches.get_one::<String>("upstream").cloned(),
            workers: matches.get_one::<usize>("workers").copied(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }

    /// Applies the flags that were given on top of `config`.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(role) = self.role {
            config.server.role = role;
        }
        if let Some(bind_address) = &self.bind_address {
            config.server.bind_address = bind_address.clone();
        }
        if let Some(upstream_address) = &self.upstream_address {
            config.server.upstream_address = upstream_address.clone();
        }
        if let Some(workers) = self.workers {
            config.net.workers = workers;
        }
        if let Some(log_level) = &self.log_level {
            config.logging.level = log_level.clone();
        }
        if self.json_logs {
            config.logging.json_format = true;
        }
    }
}

//! Command-line interface handling for the `vast` runner.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// Every option except the config path overrides a value from the
/// configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the number of nodes
    pub node_count: Option<usize>,
    /// Optional override for the number of relay nodes
    pub relay_count: Option<usize>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for the tick interval in milliseconds
    pub tick_interval_ms: Option<u64>,
    /// Optional tick limit
    pub max_ticks: Option<u64>,
}

fn command() -> Command {
    Command::new("vast")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs a local VAST relay mesh with a shared spatial neighbor engine")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("vast.toml"),
        )
        .arg(
            Arg::new("nodes")
                .short('n')
                .long("nodes")
                .value_name("COUNT")
                .help("Number of nodes to spawn")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("relays")
                .short('r')
                .long("relays")
                .value_name("COUNT")
                .help("Number of public relay nodes")
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
        .arg(
            Arg::new("tick")
                .short('t')
                .long("tick")
                .value_name("MS")
                .help("Tick interval in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("max-ticks")
                .long("max-ticks")
                .value_name("TICKS")
                .help("Stop after this many ticks")
                .value_parser(clap::value_parser!(u64)),
        )
}

impl CliArgs {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list, the first item being the binary name.
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
                .unwrap_or_else(|| PathBuf::from("vast.toml")),
            node_count: matches.get_one::<usize>("nodes").copied(),
            relay_count: matches.get_one::<usize>("relays").copied(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            tick_interval_ms: matches.get_one::<u64>("tick").copied(),
            max_ticks: matches.get_one::<u64>("max-ticks").copied(),
        }
    }
}

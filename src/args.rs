//! Module for processing command-line arguments
#![cfg(feature = "cli")]

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{DEFAULT_PORT, VERBOSE_PREFIX};

/// A Finger protocol (RFC 1288) client
///
/// Queries may name a user ("alice"), a user on a host ("alice@example.com"), every user on a
/// host ("@example.com"), or a chain of hosts to forward through ("alice@host1@host2").
#[derive(Debug, Parser)]
#[command(version, about, next_line_help = true)]
pub struct Cli {
    /// What to look up; leave empty to list logged-in users
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Host to query when QUERY doesn't name one
    #[arg(long, short = 'H', value_name = "IP or HOSTNAME")]
    pub host: Option<String>,

    /// If present, log all output to the provided file
    #[arg(long, short, value_hint = clap::ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Port to connect to
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Reduce output
    ///
    /// This option is ignored if any number of --verbose flags are present
    #[arg(long, short)]
    quiet: bool,

    /// Seconds to wait for the whole exchange before giving up
    #[arg(long, short, default_value = "30.0", value_parser = parse_timeout)]
    pub timeout: Duration,

    /// Increase verbosity
    ///
    /// This flag may appear multiple times, each appearance (up to 3) increasing the level of verbosity
    #[arg(short, long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,

    /// Ask the server for its long (whois-style) output, same as prefixing QUERY with "/W "
    #[arg(long, short = 'W')]
    whois: bool,
}

impl Cli {
    /// The query to send, with the "/W" prefix applied if --whois was given
    pub fn query(&self) -> String {
        let query = self.query.as_deref().unwrap_or_default();
        let already_verbose = query == VERBOSE_PREFIX
            || query
                .strip_prefix(VERBOSE_PREFIX)
                .is_some_and(|rest| rest.starts_with(' '));

        if !self.whois || already_verbose {
            query.to_string()
        } else if query.is_empty() {
            VERBOSE_PREFIX.to_string()
        } else {
            format!("{VERBOSE_PREFIX} {query}")
        }
    }

    /// Whether there's anything to do at all; if not we just show the help
    pub fn has_target(&self) -> bool {
        self.query.is_some() || self.host.is_some()
    }

    pub fn verbosity(&self) -> tracing::level_filters::LevelFilter {
        Self::level_for(self.verbosity, self.quiet)
    }

    /// The log file gets one level more detail than the terminal
    pub fn file_verbosity(&self) -> tracing::level_filters::LevelFilter {
        Self::level_for(self.verbosity.saturating_add(1), false)
    }

    fn level_for(verbosity: u8, quiet: bool) -> tracing::level_filters::LevelFilter {
        match verbosity {
            0 => {
                if quiet {
                    tracing::Level::ERROR
                } else {
                    tracing::Level::WARN
                }
            }
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
        .into()
    }
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("\"{value}\" is not a number of seconds"))?;
    if seconds <= 0.0 {
        return Err("timeout must be greater than zero".to_string());
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

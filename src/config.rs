//! Configuration types for irr-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Conversion into the library's client and query options

use crate::client::{ClientOptions, QueryOptions};
use crate::error::ConfigError;
use crate::irr::{DialectKind, Endpoint, DEFAULT_PORT};
use clap::{ArgAction, Parser, ValueEnum};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Maximum reasonable worker count per server
pub const MAX_WORKERS: usize = 64;

/// Resolve IRR / Whois objects into prefixes
#[derive(Parser, Debug, Clone)]
#[command(
    name = "irr-walker",
    version,
    about = "Resolve as-set, route-set or aut-num objects into prefixes",
    long_about = "Queries an IRR (IRRd) or Whois (RIPE-style) server and recursively expands \
                  as-set, route-set and aut-num objects into the prefixes they cover.\n\n\
                  If neither -4 nor -6 is given, both IPv4 and IPv6 prefixes are resolved.",
    after_help = "EXAMPLES:\n    \
        irr-walker -h jpirr AS-JPNIC\n    \
        irr-walker -h radb -s radb -s jpirr -4 AS-JPNIC AS-GOOGLE\n    \
        irr-walker -h whois.apnic.net -t 4 -f json AS-JPNIC\n    \
        irr-walker -h 127.0.0.1 --port 4343 --dialect irrd RS-EXAMPLE",
    disable_help_flag = true
)]
pub struct CliArgs {
    /// IRR / Whois server: a registry name (eg. jpirr) or an FQDN
    #[arg(short = 'h', long, value_name = "HOST")]
    pub host: String,

    /// Authoritative source name; repeat for multiple sources
    #[arg(short = 's', long = "source", value_name = "SOURCE", action = ArgAction::Append)]
    pub sources: Vec<String>,

    /// Resolve IPv4 prefixes
    #[arg(short = '4', long)]
    pub ipv4: bool,

    /// Resolve IPv6 prefixes
    #[arg(short = '6', long)]
    pub ipv6: bool,

    /// Number of threads per server
    #[arg(short = 't', long, default_value_t = 1, value_name = "NUMBER")]
    pub threads: usize,

    /// Print raw queries, answers and additional information
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// TCP port
    #[arg(long, default_value_t = DEFAULT_PORT, value_name = "PORT")]
    pub port: u16,

    /// Socket timeout in seconds
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    pub timeout: u64,

    /// Force the server dialect instead of looking it up (irrd or whoisd)
    #[arg(long, value_name = "DIALECT")]
    pub dialect: Option<DialectKind>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,

    /// Objects to resolve (as-set, route-set or aut-num)
    #[arg(value_name = "OBJECTS")]
    pub objects: Vec<String>,
}

/// Log filter for the `--debug` setting
///
/// With `debug` this crate logs commands and raw responses; otherwise only
/// warnings are shown.
pub fn log_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("irr_walker=debug,warn")
    } else {
        EnvFilter::new("irr_walker=warn")
    }
}

/// Output format for resolved prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// YAML document
    Yaml,
    /// Pretty-printed JSON
    Json,
}

/// Validated runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveConfig {
    /// Server name or address as given
    pub host: String,

    /// Forced dialect, if any
    pub dialect: Option<DialectKind>,

    /// TCP port
    pub port: u16,

    /// Authoritative sources
    pub sources: Vec<String>,

    /// Requested protocols; `None` means both
    pub protocols: Option<Vec<String>>,

    /// Workers per server
    pub worker_count: usize,

    /// Socket timeout
    pub timeout: Duration,

    /// Verbose protocol logging
    pub debug: bool,

    /// Output format
    pub format: OutputFormat,

    /// Objects to resolve
    pub objects: Vec<String>,
}

impl ResolveConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.threads == 0 || args.threads > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.threads,
                max: MAX_WORKERS,
            });
        }

        if args.timeout == 0 {
            return Err(ConfigError::InvalidTimeout { secs: args.timeout });
        }

        if args.objects.is_empty() {
            return Err(ConfigError::MissingObjects);
        }

        let mut protocols = Vec::new();
        if args.ipv4 {
            protocols.push("ipv4".to_string());
        }
        if args.ipv6 {
            protocols.push("ipv6".to_string());
        }

        Ok(Self {
            host: args.host,
            dialect: args.dialect,
            port: args.port,
            sources: args.sources,
            protocols: (!protocols.is_empty()).then_some(protocols),
            worker_count: args.threads,
            timeout: Duration::from_secs(args.timeout),
            debug: args.debug,
            format: args.format,
            objects: args.objects,
        })
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::default()
            .worker_count(self.worker_count)
            .timeout(self.timeout)
            .port(self.port)
    }

    pub fn query_options(&self) -> QueryOptions {
        let options = QueryOptions::new().sources(self.sources.iter().cloned());
        match &self.protocols {
            Some(protocols) => options.protocols(protocols.iter().cloned()),
            None => options,
        }
    }

    /// Endpoint to use when the dialect is forced
    pub fn forced_endpoint(&self) -> Option<Endpoint> {
        self.dialect
            .map(|dialect| Endpoint::new(self.host.clone(), self.port, dialect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("irr-walker").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ResolveConfig::from_args(parse(&["-h", "jpirr", "AS-JPNIC"])).unwrap();

        assert_eq!(config.host, "jpirr");
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.port, 43);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.protocols, None);
        assert!(config.sources.is_empty());
        assert_eq!(config.format, OutputFormat::Yaml);
        assert_eq!(config.forced_endpoint(), None);
    }

    #[test]
    fn test_all_flags() {
        let args = parse(&[
            "-h", "127.0.0.1", "-s", "JPIRR", "--source", "RADB", "-4", "-t", "4", "-d",
            "--port", "4343", "--timeout", "5", "--dialect", "whoisd", "-f", "json", "AS-JPNIC",
            "RS-X",
        ]);
        let config = ResolveConfig::from_args(args).unwrap();

        assert_eq!(config.sources, vec!["JPIRR", "RADB"]);
        assert_eq!(config.protocols, Some(vec!["ipv4".to_string()]));
        assert_eq!(config.worker_count, 4);
        assert!(config.debug);
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.objects, vec!["AS-JPNIC", "RS-X"]);
        assert_eq!(
            config.forced_endpoint(),
            Some(Endpoint::new("127.0.0.1", 4343, DialectKind::Whoisd))
        );

        let options = config.query_options();
        assert_eq!(options.sources, vec!["JPIRR", "RADB"]);
        assert_eq!(options.protocols, Some(vec!["ipv4".to_string()]));
        assert_eq!(config.client_options().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            ResolveConfig::from_args(parse(&["-h", "jpirr", "-t", "0", "AS-JPNIC"])).unwrap_err(),
            ConfigError::InvalidWorkerCount { count: 0, max: MAX_WORKERS }
        );
        assert_eq!(
            ResolveConfig::from_args(parse(&["-h", "jpirr", "--timeout", "0", "AS-JPNIC"])).unwrap_err(),
            ConfigError::InvalidTimeout { secs: 0 }
        );
        assert_eq!(
            ResolveConfig::from_args(parse(&["-h", "jpirr"])).unwrap_err(),
            ConfigError::MissingObjects
        );
    }

    #[test]
    fn test_host_is_required() {
        assert!(CliArgs::try_parse_from(["irr-walker", "AS-JPNIC"]).is_err());
        assert!(CliArgs::try_parse_from(["irr-walker", "-h", "jpirr", "--dialect", "bogus", "AS1"]).is_err());
    }
}

//! Runtime configuration.
//!
//! CLI parsing via `clap`, mirroring the teacher crate's derive-macro style.
//! Built once in `main` and handed to [`crate::proxy::run`]; not hot-reloaded.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::dns::{self, rcode};

#[derive(Parser)]
#[command(name = "dnsward")]
#[command(about = "Filtering DNS forwarder", long_about = None)]
pub struct Args {
    /// Bind address for the client-facing listener
    #[arg(short, long, default_value = "127.0.0.1")]
    pub bind: String,

    /// Preferred UDP port to listen on
    #[arg(short, long, default_value_t = 53)]
    pub port: u16,

    /// Port to fall back to if binding `port` fails for lack of privilege
    #[arg(long, default_value_t = 5353)]
    pub fallback_port: u16,

    /// Upstream resolver (host:port), repeatable; forwarded to round-robin
    #[arg(short, long, default_values_t = [
        "1.1.1.1:53".to_string(),
        "8.8.8.8:53".to_string(),
        "9.9.9.9:53".to_string(),
    ])]
    pub upstream: Vec<String>,

    /// Path to a newline-delimited blacklist file
    #[arg(short = 'l', long)]
    pub blacklist: Option<PathBuf>,

    /// RCODE returned for blacklisted names in refusal mode
    #[arg(long, default_value_t = rcode::NXDOMAIN)]
    pub blacklisted_rcode: u8,

    /// Transaction timeout in milliseconds
    #[arg(long, default_value_t = 4000)]
    pub timeout_ms: u64,

    /// Domain to redirect blacklisted queries to (only with `--features redirect`)
    #[cfg(feature = "redirect")]
    #[arg(long)]
    pub redirect_to: Option<String>,

    /// Increase log verbosity (-v INFO, -vv DEBUG, -vvv TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address {0}:{1}")]
    InvalidBindAddr(String, u16),
    #[error("invalid upstream address {0:?}")]
    InvalidUpstream(String),
    #[error("no upstream resolvers configured")]
    NoUpstreams,
    #[error("failed to load blacklist file {path}: {source}")]
    Blacklist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid redirect target: {0}")]
    InvalidRedirect(#[from] dns::CodecError),
}

/// The action taken for a blacklisted query.
pub enum BlacklistAction {
    /// Synthesize a refusal response with this RCODE.
    Refuse { rcode: u8 },
    /// Rewrite the question to this pre-encoded wire-format domain and
    /// still forward upstream.
    #[cfg(feature = "redirect")]
    Redirect { wire_name: Vec<u8> },
}

pub struct Config {
    pub bind_addr: SocketAddr,
    pub fallback_addr: SocketAddr,
    pub upstreams: Vec<SocketAddr>,
    pub blacklist_action: BlacklistAction,
    pub timeout: Duration,
    pub log_level: tracing::Level,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let bind_addr = format!("{}:{}", args.bind, args.port)
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(args.bind.clone(), args.port))?;
        let fallback_addr = format!("{}:{}", args.bind, args.fallback_port)
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(args.bind.clone(), args.fallback_port))?;

        let upstreams = args
            .upstream
            .iter()
            .map(|s| {
                s.parse::<SocketAddr>()
                    .map_err(|_| ConfigError::InvalidUpstream(s.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if upstreams.is_empty() {
            return Err(ConfigError::NoUpstreams);
        }

        let blacklist_action = blacklist_action(args)?;

        let log_level = match args.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        Ok(Self {
            bind_addr,
            fallback_addr,
            upstreams,
            blacklist_action,
            timeout: Duration::from_millis(args.timeout_ms),
            log_level,
        })
    }
}

#[cfg(feature = "redirect")]
fn blacklist_action(args: &Args) -> Result<BlacklistAction, ConfigError> {
    let target = args.redirect_to.as_deref().unwrap_or("torproject.org");
    let wire_name = dns::encode_qname_wire(target)?;
    Ok(BlacklistAction::Redirect { wire_name })
}

#[cfg(not(feature = "redirect"))]
fn blacklist_action(args: &Args) -> Result<BlacklistAction, ConfigError> {
    Ok(BlacklistAction::Refuse {
        rcode: args.blacklisted_rcode,
    })
}

//! dnsward - a filtering DNS forwarder.
//!
//! Forwards UDP DNS queries to a round-robin pool of upstream resolvers,
//! refusing or redirecting queries for blacklisted domains.

mod blacklist;
mod client;
mod config;
mod dns;
mod netutil;
mod proxy;
mod server;
mod transaction;

use std::process::ExitCode;

use clap::Parser;

use blacklist::Blacklist;
use config::{Args, Config};

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::from_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("dnsward: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let blacklist = match &args.blacklist {
        Some(path) => match Blacklist::load_file(path) {
            Ok(bl) => bl,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to load blacklist");
                return ExitCode::FAILURE;
            }
        },
        None => {
            tracing::warn!("no blacklist configured, all queries will be forwarded");
            Blacklist::empty()
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("dnsward: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(proxy::run(config, blacklist)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "proxy exited with error");
            ExitCode::FAILURE
        }
    }
}

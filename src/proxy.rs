//! Event loop tying the listener, upstream pool, blacklist and transaction
//! table together.
//!
//! Everything below runs on one task: the listener, the upstream-reply
//! channel, and the timeout sweep are all polled from a single
//! `tokio::select!`, so the transaction table and blacklist need no
//! synchronization despite being touched from several logical sources.

use std::io;

use tokio::sync::mpsc;

use crate::blacklist::Blacklist;
use crate::client::Client;
use crate::config::{BlacklistAction, Config};
use crate::dns;
use crate::server::Server;
use crate::transaction::TransactionTable;

#[derive(Default)]
struct Stats {
    requests: u64,
    blacklisted: u64,
    forwarded: u64,
    timed_out: u64,
}

pub struct Proxy {
    server: Server,
    client: Client,
    blacklist: Blacklist,
    table: TransactionTable,
    config: Config,
    stats: Stats,
}

impl Proxy {
    pub async fn new(config: Config, blacklist: Blacklist) -> io::Result<Self> {
        let server = Server::bind(config.bind_addr, config.fallback_addr).await?;
        let client = Client::bind(&config.upstreams)?;
        tracing::info!(
            bind = %server.local_addr()?,
            upstreams = client.upstream_count(),
            blacklist_entries = blacklist.len(),
            "proxy ready"
        );
        Ok(Self {
            server,
            client,
            blacklist,
            table: TransactionTable::new(),
            config,
            stats: Stats::default(),
        })
    }

    /// The address the client-facing listener actually bound to — useful for
    /// tests and for logging when the configured port falls back.
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.server.local_addr()
    }

    pub async fn run(mut self) -> io::Result<()> {
        let (upstream_tx, mut upstream_rx) = mpsc::unbounded_channel::<(u16, Vec<u8>)>();
        self.client.spawn_receivers(upstream_tx);

        let mut sweep = tokio::time::interval(self.config.timeout);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut buf = [0u8; crate::server::MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                recvd = self.server.recv(&mut buf) => {
                    if let Some((client_addr, tx_id, len)) = recvd {
                        self.stats.requests += 1;
                        self.handle_request(client_addr, tx_id, &buf[..len]).await;
                    }
                }
                Some((tx_id, payload)) = upstream_rx.recv() => {
                    self.handle_response(tx_id, &payload).await;
                }
                _ = sweep.tick() => {
                    self.handle_timeouts().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    break;
                }
            }
        }

        tracing::info!(
            requests = self.stats.requests,
            blacklisted = self.stats.blacklisted,
            forwarded = self.stats.forwarded,
            timed_out = self.stats.timed_out,
            in_flight = self.table.len(),
            "shutting down"
        );
        Ok(())
    }

    async fn handle_request(&mut self, client_addr: std::net::SocketAddr, tx_id: u16, request: &[u8]) {
        if let Err(e) = dns::validate_header(request) {
            tracing::warn!(error = %e, %client_addr, "rejecting malformed request");
            return;
        }

        let (qname, qname_len) = match dns::parse_qname(request, dns::HEADER_LEN) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, %client_addr, "rejecting request with malformed name");
                return;
            }
        };

        if self.blacklist.is_blacklisted(qname.as_str()) {
            self.stats.blacklisted += 1;
            match &self.config.blacklist_action {
                BlacklistAction::Refuse { rcode } => {
                    tracing::info!(name = qname.as_str(), %client_addr, "refusing blacklisted query");
                    let resp = dns::synthesize_refusal(request, *rcode);
                    self.server.send_response(client_addr, &resp).await;
                }
                #[cfg(feature = "redirect")]
                BlacklistAction::Redirect { wire_name } => {
                    tracing::info!(name = qname.as_str(), %client_addr, "redirecting blacklisted query");
                    let redirected = dns::synthesize_redirect(request, qname_len, wire_name);
                    self.forward(client_addr, tx_id, &redirected).await;
                }
            }
            return;
        }
        let _ = qname_len;

        self.forward(client_addr, tx_id, request).await;
    }

    async fn forward(&mut self, client_addr: std::net::SocketAddr, tx_id: u16, request: &[u8]) {
        match self.client.send_request(request).await {
            Ok(upstream) => {
                self.table.insert(tx_id, client_addr);
                self.stats.forwarded += 1;
                tracing::debug!(%client_addr, %upstream, tx_id, "forwarded query");
            }
            Err(e) => {
                tracing::error!(error = %e, %client_addr, "failed to forward to any upstream");
                let resp = dns::synthesize_servfail(tx_id);
                self.server.send_response(client_addr, &resp).await;
            }
        }
    }

    async fn handle_response(&mut self, tx_id: u16, payload: &[u8]) {
        match self.table.remove(tx_id) {
            Some(tx) => {
                self.server.send_response(tx.client_addr, payload).await;
            }
            None => {
                tracing::error!(tx_id, "dropping reply with no matching transaction");
            }
        }
    }

    async fn handle_timeouts(&mut self) {
        let expired = self.table.expire(self.config.timeout);
        for (tx_id, tx) in expired {
            self.stats.timed_out += 1;
            tracing::warn!(tx_id, client_addr = %tx.client_addr, "upstream timed out");
            let resp = dns::synthesize_servfail(tx_id);
            self.server.send_response(tx.client_addr, &resp).await;
        }
    }
}

pub async fn run(config: Config, blacklist: Blacklist) -> io::Result<()> {
    Proxy::new(config, blacklist).await?.run().await
}

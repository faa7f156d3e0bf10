//! In-flight transaction table.
//!
//! Maps the 16-bit id an upstream query was sent with back to the client
//! that originated it, so the proxy can correlate an upstream reply (or a
//! watchdog timeout) with the right client address. Accessed only from the
//! event-loop task, so no locking.

use std::net::SocketAddr;
use std::time::Instant;

use rustc_hash::FxHashMap;

/// A single in-flight request, created when a query is forwarded upstream
/// and removed when a reply (or timeout) is delivered to the client.
pub struct Transaction {
    pub client_addr: SocketAddr,
    pub sent_at: Instant,
}

/// Table of in-flight transactions keyed by the id the client (and, since
/// the proxy never rewrites ids, the upstream) uses.
///
/// A record's presence is the sole evidence that an upstream reply with that
/// id should be proxied back to a client.
#[derive(Default)]
pub struct TransactionTable {
    entries: FxHashMap<u16, Transaction>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Record a forwarded query. If a transaction with this id is already
    /// in flight (a source collision), it is replaced — the new query's
    /// client will get the next matching reply; the old one is left without
    /// a response.
    pub fn insert(&mut self, tx_id: u16, client_addr: SocketAddr) {
        self.entries.insert(
            tx_id,
            Transaction {
                client_addr,
                sent_at: Instant::now(),
            },
        );
    }

    pub fn remove(&mut self, tx_id: u16) -> Option<Transaction> {
        self.entries.remove(&tx_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove and return every transaction older than `timeout`.
    pub fn expire(&mut self, timeout: std::time::Duration) -> Vec<(u16, Transaction)> {
        let now = Instant::now();
        let expired: Vec<u16> = self
            .entries
            .iter()
            .filter(|(_, tx)| now.duration_since(tx.sent_at) > timeout)
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|tx| (id, tx)))
            .collect()
    }
}

//! Upstream resolver pool.
//!
//! Holds one bound socket per configured upstream and hands out the next one
//! in round-robin order. Each socket also gets a background receiver task
//! (plain `tokio::spawn`, not `spawn_local` — `UdpSocket` is `Send` and
//! nothing here needs thread affinity) that feeds replies back into the
//! proxy's single event loop over an unbounded channel.

use std::cell::Cell;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::dns;
use crate::netutil;

const MAX_DATAGRAM: usize = 1500;

pub struct Client {
    sockets: Vec<Arc<UdpSocket>>,
    addrs: Vec<SocketAddr>,
    /// Index of the last resolver used. The original proxy advances this
    /// *before* picking a resolver, so the first query after startup goes to
    /// index 1, not index 0.
    cursor: Cell<usize>,
}

impl Client {
    pub fn bind(upstreams: &[SocketAddr]) -> io::Result<Self> {
        let mut sockets = Vec::with_capacity(upstreams.len());
        for &addr in upstreams {
            sockets.push(Arc::new(netutil::bind_upstream_socket(addr)?));
        }
        Ok(Self {
            sockets,
            addrs: upstreams.to_vec(),
            cursor: Cell::new(0),
        })
    }

    pub fn upstream_count(&self) -> usize {
        self.sockets.len()
    }

    /// Send `data` to the next upstream in round-robin order and report which
    /// one it went to.
    pub async fn send_request(&self, data: &[u8]) -> io::Result<SocketAddr> {
        let idx = (self.cursor.get() + 1) % self.sockets.len();
        self.cursor.set(idx);
        let addr = self.addrs[idx];
        self.sockets[idx].send_to(data, addr).await?;
        Ok(addr)
    }

    /// Spawn one receiver task per upstream socket, each forwarding
    /// `(tx_id, payload)` through `tx` as replies arrive. Datagrams too short
    /// to carry a transaction id are dropped.
    pub fn spawn_receivers(&self, tx: mpsc::UnboundedSender<(u16, Vec<u8>)>) {
        for socket in &self.sockets {
            let socket = Arc::clone(socket);
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; MAX_DATAGRAM];
                loop {
                    match socket.recv(&mut buf).await {
                        Ok(len) => {
                            if len < 2 {
                                continue;
                            }
                            let tx_id = dns::id(&buf[..len]);
                            if tx.send((tx_id, buf[..len].to_vec())).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "recv failed on upstream socket");
                            return;
                        }
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_pre_increments_cursor() {
        // cursor starts at 0, so the first pick lands on index 1, then 2.
        let cursor = Cell::new(0usize);
        let len = 3usize;
        let first = (cursor.get() + 1) % len;
        cursor.set(first);
        assert_eq!(first, 1);
        let second = (cursor.get() + 1) % len;
        cursor.set(second);
        assert_eq!(second, 2);
    }
}

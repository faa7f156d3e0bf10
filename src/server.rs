//! Client-facing UDP listener.
//!
//! Owns the single socket clients send queries to. Receiving is reduced to
//! "read one datagram, pull out the id, hand it to the caller" — Tokio's
//! async `recv_from` already absorbs the EAGAIN/EWOULDBLOCK busy-loop the
//! original event-driven version had to check for explicitly.

use std::io;
use std::net::SocketAddr;

use crate::dns;
use crate::netutil;

/// Datagrams this size or larger are never expected on the client-facing
/// socket (Ethernet MTU headroom above the 512-byte classic DNS cap).
const MAX_DATAGRAM: usize = 1500;

pub struct Server {
    socket: tokio::net::UdpSocket,
}

impl Server {
    /// Bind `addr`; on `PermissionDenied` (unprivileged process asking for a
    /// sub-1024 port) retry once on `fallback_addr` before giving up.
    pub async fn bind(addr: SocketAddr, fallback_addr: SocketAddr) -> io::Result<Self> {
        match netutil::bind_udp(addr) {
            Ok(socket) => Ok(Self { socket }),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied && addr != fallback_addr => {
                tracing::warn!(
                    %addr, %fallback_addr,
                    "insufficient privilege to bind, retrying on fallback port"
                );
                Ok(Self {
                    socket: netutil::bind_udp(fallback_addr)?,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Read one datagram. Returns `None` (after logging, where appropriate)
    /// for transient I/O errors or a datagram too short to carry a
    /// transaction id — both are silently-dropped per the spec.
    pub async fn recv(&self, buf: &mut [u8; MAX_DATAGRAM]) -> Option<(SocketAddr, u16, usize)> {
        match self.socket.recv_from(buf).await {
            Ok((len, src)) => {
                if len < 2 {
                    return None;
                }
                Some((src, dns::id(&buf[..len]), len))
            }
            Err(e) => {
                tracing::error!(error = %e, "recvfrom failed on listen socket");
                None
            }
        }
    }

    pub async fn send_response(&self, addr: SocketAddr, data: &[u8]) {
        if let Err(e) = self.socket.send_to(data, addr).await {
            tracing::error!(error = %e, %addr, "sendto client failed");
        }
    }
}

pub const MAX_DATAGRAM_SIZE: usize = MAX_DATAGRAM;

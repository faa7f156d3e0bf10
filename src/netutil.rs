//! Shared socket setup.
//!
//! Both the listening socket and each upstream socket need the same
//! treatment: `SO_REUSEADDR` and 4 MiB send/receive buffers, set before the
//! socket is handed to Tokio.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

const SOCKET_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Bind a non-blocking UDP socket at `addr` with `SO_REUSEADDR` and 4 MiB
/// send/receive buffers.
pub fn bind_udp(addr: SocketAddr) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES) {
        tracing::warn!(error = %e, "failed to set SO_RCVBUF");
    }
    if let Err(e) = socket.set_send_buffer_size(SOCKET_BUFFER_BYTES) {
        tracing::warn!(error = %e, "failed to set SO_SNDBUF");
    }
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

/// An ephemeral-port socket used to talk to a single upstream resolver,
/// bound to the wildcard address of the same family as `upstream`.
pub fn bind_upstream_socket(upstream: SocketAddr) -> io::Result<UdpSocket> {
    let wildcard: SocketAddr = if upstream.is_ipv6() {
        "[::]:0".parse().unwrap()
    } else {
        "0.0.0.0:0".parse().unwrap()
    };
    bind_udp(wildcard)
}

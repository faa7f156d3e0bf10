//! End-to-end tests driving the proxy over real loopback UDP sockets.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use dnsward::blacklist::Blacklist;
use dnsward::config::{BlacklistAction, Config};
use dnsward::dns::{self, rcode};
use dnsward::proxy::Proxy;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn encode_query(id: u16, domain: &str) -> Vec<u8> {
    let mut pkt = Vec::new();
    pkt.extend_from_slice(&id.to_be_bytes());
    pkt.extend_from_slice(&[0x01, 0x00]);
    pkt.extend_from_slice(&[0x00, 0x01]);
    pkt.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    for label in domain.split('.') {
        pkt.push(label.len() as u8);
        pkt.extend_from_slice(label.as_bytes());
    }
    pkt.push(0);
    pkt.extend_from_slice(&[0x00, 0x01]);
    pkt.extend_from_slice(&[0x00, 0x01]);
    pkt
}

/// Bind a UDP socket standing in for a resolver, returning the socket and
/// the address the proxy should be configured to forward to.
async fn fake_upstream() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind(loopback(0)).await.unwrap();
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

async fn start_proxy(config: Config, blacklist: Blacklist) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let proxy = Proxy::new(config, blacklist).await.unwrap();
    let addr = proxy.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = proxy.run().await;
    });
    (addr, handle)
}

fn base_config(upstreams: Vec<SocketAddr>) -> Config {
    Config {
        bind_addr: loopback(0),
        fallback_addr: loopback(0),
        upstreams,
        blacklist_action: BlacklistAction::Refuse {
            rcode: rcode::NXDOMAIN,
        },
        timeout: Duration::from_millis(300),
        log_level: tracing::Level::ERROR,
    }
}

#[tokio::test]
async fn forwards_allowed_query_and_relays_reply() {
    let (upstream, upstream_addr) = fake_upstream().await;
    let (proxy_addr, handle) = start_proxy(base_config(vec![upstream_addr]), Blacklist::empty()).await;

    let client = UdpSocket::bind(loopback(0)).await.unwrap();
    let query = encode_query(0xBEEF, "example.com");
    client.send_to(&query, proxy_addr).await.unwrap();

    let mut ubuf = [0u8; 512];
    let (len, from) = timeout(RECV_TIMEOUT, upstream.recv_from(&mut ubuf))
        .await
        .expect("upstream should receive forwarded query")
        .unwrap();
    assert_eq!(&ubuf[..len], &query[..]);

    let canned_reply = dns::synthesize_refusal(&query, rcode::NOERROR);
    upstream.send_to(&canned_reply, from).await.unwrap();

    let mut cbuf = [0u8; 512];
    let (len, _) = timeout(RECV_TIMEOUT, client.recv_from(&mut cbuf))
        .await
        .expect("client should receive relayed reply")
        .unwrap();
    assert_eq!(&cbuf[..len], &canned_reply[..]);
    assert_eq!(dns::id(&cbuf[..len]), 0xBEEF);

    handle.abort();
}

#[tokio::test]
async fn refuses_blacklisted_query_without_forwarding() {
    let (upstream, upstream_addr) = fake_upstream().await;

    let dir = std::env::temp_dir().join(format!("dnsward-test-bl-{}", std::process::id()));
    std::fs::write(&dir, "blocked.example\n").unwrap();
    let blacklist = Blacklist::load_file(&dir).unwrap();
    let _ = std::fs::remove_file(&dir);

    let (proxy_addr, handle) = start_proxy(base_config(vec![upstream_addr]), blacklist).await;

    let client = UdpSocket::bind(loopback(0)).await.unwrap();
    let query = encode_query(0x1, "blocked.example");
    client.send_to(&query, proxy_addr).await.unwrap();

    let mut cbuf = [0u8; 512];
    let (len, _) = timeout(RECV_TIMEOUT, client.recv_from(&mut cbuf))
        .await
        .expect("client should receive a refusal")
        .unwrap();
    assert!(dns::qr(&cbuf[..len]));
    assert_eq!(dns::rcode(&cbuf[..len]), rcode::NXDOMAIN);
    assert_eq!(dns::an_count(&cbuf[..len]), 0);

    // The fake upstream should never have been contacted.
    let mut ubuf = [0u8; 512];
    let got_anything = timeout(Duration::from_millis(300), upstream.recv_from(&mut ubuf)).await;
    assert!(got_anything.is_err(), "blacklisted query must not be forwarded");

    handle.abort();
}

#[tokio::test]
async fn watchdog_sends_servfail_when_upstream_never_replies() {
    // Upstream socket is bound but nothing ever reads/replies from it.
    let (_upstream, upstream_addr) = fake_upstream().await;
    let mut config = base_config(vec![upstream_addr]);
    config.timeout = Duration::from_millis(200);

    let (proxy_addr, handle) = start_proxy(config, Blacklist::empty()).await;

    let client = UdpSocket::bind(loopback(0)).await.unwrap();
    let query = encode_query(0x42, "slow.example.com");
    client.send_to(&query, proxy_addr).await.unwrap();

    let mut cbuf = [0u8; 512];
    let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut cbuf))
        .await
        .expect("client should eventually receive a SERVFAIL")
        .unwrap();
    assert_eq!(dns::id(&cbuf[..len]), 0x42);
    assert!(dns::qr(&cbuf[..len]));
    assert_eq!(dns::rcode(&cbuf[..len]), rcode::SERVFAIL);

    handle.abort();
}

#[tokio::test]
async fn round_robins_across_multiple_upstreams() {
    let (up_a, addr_a) = fake_upstream().await;
    let (up_b, addr_b) = fake_upstream().await;
    let (proxy_addr, handle) =
        start_proxy(base_config(vec![addr_a, addr_b]), Blacklist::empty()).await;

    let client = UdpSocket::bind(loopback(0)).await.unwrap();

    client
        .send_to(&encode_query(1, "one.example.com"), proxy_addr)
        .await
        .unwrap();
    client
        .send_to(&encode_query(2, "two.example.com"), proxy_addr)
        .await
        .unwrap();

    let mut buf = [0u8; 512];
    let first = timeout(RECV_TIMEOUT, up_a.recv_from(&mut buf)).await;
    let second = timeout(RECV_TIMEOUT, up_b.recv_from(&mut buf)).await;
    assert!(
        first.is_ok() && second.is_ok(),
        "both upstreams should receive one query each in round-robin order"
    );

    handle.abort();
}

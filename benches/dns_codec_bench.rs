//! Benchmarks for the DNS wire codec.
//!
//! Measures QNAME decoding (the hot path for every forwarded query) and
//! refusal-response synthesis.

use criterion::{black_box, BenchmarkId, Criterion, Throughput};

use dnsward::dns::{self, rcode};

fn query_packet(domain: &str) -> Vec<u8> {
    let mut pkt = Vec::new();
    pkt.extend_from_slice(&0x1234u16.to_be_bytes());
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

fn bench_parse_qname(c: &mut Criterion) {
    let short = query_packet("example.com");
    let long = query_packet("a.b.c.d.e.f.g.h.deeply.nested.subdomain.example.com");

    let mut group = c.benchmark_group("dns_codec");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("parse_qname", "short"), |b| {
        b.iter(|| dns::parse_qname(black_box(&short), dns::HEADER_LEN).unwrap())
    });
    group.bench_function(BenchmarkId::new("parse_qname", "long"), |b| {
        b.iter(|| dns::parse_qname(black_box(&long), dns::HEADER_LEN).unwrap())
    });
    group.bench_function(BenchmarkId::new("synthesize_refusal", "short"), |b| {
        b.iter(|| dns::synthesize_refusal(black_box(&short), rcode::NXDOMAIN))
    });

    group.finish();
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_parse_qname(&mut criterion);
    criterion.final_summary();
}

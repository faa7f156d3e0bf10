//! DNS message parsing and construction.
//!
//! Covers exactly what the forwarder needs: header field accessors, a
//! zero-copy QNAME decoder for the first question, and synthesis of the
//! three response shapes the proxy ever sends on its own behalf (refusal,
//! SERVFAIL, redirect). Answer/authority/additional records are never
//! interpreted — upstream answers are returned byte-for-byte.

use thiserror::Error;

/// Size of the fixed DNS header.
pub const HEADER_LEN: usize = 12;

/// RFC 1035 caps a fully-qualified domain name (with separators) at this
/// many octets.
pub const MAX_NAME_LEN: usize = 253;

/// Response codes the forwarder is allowed to produce. 6-9 are defined by
/// RFC 1035 but this crate never emits them.
pub mod rcode {
    pub const NOERROR: u8 = 0;
    pub const FORMERR: u8 = 1;
    pub const SERVFAIL: u8 = 2;
    pub const NXDOMAIN: u8 = 3;
    pub const NOTIMP: u8 = 4;
    pub const REFUSED: u8 = 5;
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum CodecError {
    #[error("packet shorter than the DNS header")]
    HeaderTooShort,
    #[error("request has zero questions")]
    NoQuestions,
    #[error("label or pointer walks past the end of the packet")]
    Truncated,
    #[error("decoded name exceeds {MAX_NAME_LEN} octets")]
    NameTooLong,
    #[error("compression pointer does not strictly decrease position")]
    PointerLoop,
    #[error("label length byte uses a reserved bit pattern")]
    ReservedLabelBits,
    #[error("domain label longer than 63 octets")]
    LabelTooLong,
}

// --- Header field accessors -------------------------------------------------
//
// Fixed 12-byte, network-byte-order header. Bit layout matches RFC 1035
// exactly: byte 2 is QR(1) OPCODE(4) AA(1) TC(1) RD(1); byte 3 is RA(1)
// Z(3) RCODE(4).

#[inline]
pub fn id(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}

#[inline]
pub fn set_id(buf: &mut [u8], v: u16) {
    buf[0..2].copy_from_slice(&v.to_be_bytes());
}

#[inline]
pub fn qr(buf: &[u8]) -> bool {
    buf[2] & 0x80 != 0
}

#[inline]
pub fn set_qr(buf: &mut [u8], v: bool) {
    set_bit(&mut buf[2], 0x80, v);
}

#[inline]
pub fn opcode(buf: &[u8]) -> u8 {
    (buf[2] >> 3) & 0x0F
}

#[inline]
pub fn aa(buf: &[u8]) -> bool {
    buf[2] & 0x04 != 0
}

#[inline]
pub fn set_aa(buf: &mut [u8], v: bool) {
    set_bit(&mut buf[2], 0x04, v);
}

#[inline]
pub fn tc(buf: &[u8]) -> bool {
    buf[2] & 0x02 != 0
}

#[inline]
pub fn set_tc(buf: &mut [u8], v: bool) {
    set_bit(&mut buf[2], 0x02, v);
}

#[inline]
pub fn rd(buf: &[u8]) -> bool {
    buf[2] & 0x01 != 0
}

#[inline]
pub fn set_rd(buf: &mut [u8], v: bool) {
    set_bit(&mut buf[2], 0x01, v);
}

#[inline]
pub fn ra(buf: &[u8]) -> bool {
    buf[3] & 0x80 != 0
}

#[inline]
pub fn set_ra(buf: &mut [u8], v: bool) {
    set_bit(&mut buf[3], 0x80, v);
}

#[inline]
pub fn rcode(buf: &[u8]) -> u8 {
    buf[3] & 0x0F
}

#[inline]
pub fn set_rcode(buf: &mut [u8], v: u8) {
    buf[3] = (buf[3] & 0xF0) | (v & 0x0F);
}

#[inline]
pub fn qd_count(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[4], buf[5]])
}

#[inline]
pub fn an_count(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[6], buf[7]])
}

#[inline]
pub fn set_an_count(buf: &mut [u8], v: u16) {
    buf[6..8].copy_from_slice(&v.to_be_bytes());
}

#[inline]
pub fn ns_count(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[8], buf[9]])
}

#[inline]
pub fn set_ns_count(buf: &mut [u8], v: u16) {
    buf[8..10].copy_from_slice(&v.to_be_bytes());
}

#[inline]
pub fn ar_count(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[10], buf[11]])
}

#[inline]
pub fn set_ar_count(buf: &mut [u8], v: u16) {
    buf[10..12].copy_from_slice(&v.to_be_bytes());
}

#[inline]
fn set_bit(byte: &mut u8, mask: u8, v: bool) {
    if v {
        *byte |= mask;
    } else {
        *byte &= !mask;
    }
}

/// Returns `Err` if `buf` is too short to contain a header, or has no
/// questions.
pub fn validate_header(buf: &[u8]) -> Result<(), CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::HeaderTooShort);
    }
    if qd_count(buf) == 0 {
        return Err(CodecError::NoQuestions);
    }
    Ok(())
}

// --- QNAME decoding ----------------------------------------------------------

/// A decoded domain name, lowercased ASCII, stored inline (no heap
/// allocation). `.`-joined labels, no trailing dot.
#[derive(Clone)]
pub struct QName {
    buf: [u8; MAX_NAME_LEN],
    len: usize,
}

impl QName {
    fn empty() -> Self {
        Self {
            buf: [0; MAX_NAME_LEN],
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), CodecError> {
        if self.len >= MAX_NAME_LEN {
            return Err(CodecError::NameTooLong);
        }
        self.buf[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        // Constructed entirely from ASCII bytes (labels + b'.'), always valid UTF-8.
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode the domain name starting at `start`, following compression
/// pointers. Returns the name and the number of bytes consumed from the
/// packet's own contiguous encoding starting at `start` (i.e. up to and
/// including the terminating zero byte, or the two pointer bytes if a
/// pointer is the first thing found at `start`) — this is the length to use
/// when splicing the question section, regardless of how far a followed
/// pointer walks elsewhere in the packet.
///
/// Pointer targets must strictly decrease on every jump (both relative to
/// the pointer's own offset and to the previous jump's target), which bounds
/// the number of jumps by the packet length and rules out loops.
pub fn parse_qname(packet: &[u8], start: usize) -> Result<(QName, usize), CodecError> {
    let mut name = QName::empty();
    let mut pos = start;
    let mut consumed = None;
    let mut ceiling = packet.len();

    loop {
        if pos >= packet.len() {
            return Err(CodecError::Truncated);
        }
        let marker = packet[pos];

        if marker == 0 {
            consumed.get_or_insert(pos + 1 - start);
            break;
        }

        if marker & 0xC0 == 0xC0 {
            if pos + 2 > packet.len() {
                return Err(CodecError::Truncated);
            }
            let target = (((marker & 0x3F) as usize) << 8) | packet[pos + 1] as usize;
            consumed.get_or_insert(pos + 2 - start);
            if target >= pos || target >= ceiling {
                return Err(CodecError::PointerLoop);
            }
            ceiling = target;
            pos = target;
            continue;
        }

        if marker & 0xC0 != 0 {
            return Err(CodecError::ReservedLabelBits);
        }

        let label_len = marker as usize;
        if label_len > 63 {
            return Err(CodecError::LabelTooLong);
        }
        if pos + 1 + label_len > packet.len() {
            return Err(CodecError::Truncated);
        }

        if !name.is_empty() {
            name.push(b'.')?;
        }
        for &b in &packet[pos + 1..pos + 1 + label_len] {
            name.push(b.to_ascii_lowercase())?;
        }
        pos += 1 + label_len;
    }

    Ok((name, consumed.expect("terminator or pointer always sets consumed")))
}

/// Encode a domain name (no trailing dot, already validated) to wire format:
/// length-prefixed labels terminated by a zero byte. Not on the hot path —
/// used once at startup to prepare the redirect target.
pub fn encode_qname_wire(domain: &str) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(domain.len() + 2);
    let mut total = 0usize;
    for label in domain.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(CodecError::LabelTooLong);
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
        total += label.len() + 1;
        if total > MAX_NAME_LEN {
            return Err(CodecError::NameTooLong);
        }
    }
    out.push(0);
    Ok(out)
}

// --- Response synthesis ------------------------------------------------------

/// Synthesize a refusal response: same size as the request, question section
/// byte-identical, QR=1/RD=0/RA=0/AA=0/TC=0, an/ns/ar counts zeroed, `rcode`
/// set, id and qd_count preserved.
pub fn synthesize_refusal(request: &[u8], rcode_value: u8) -> Vec<u8> {
    let mut resp = request.to_vec();
    set_qr(&mut resp, true);
    set_rd(&mut resp, false);
    set_ra(&mut resp, false);
    set_aa(&mut resp, false);
    set_tc(&mut resp, false);
    set_rcode(&mut resp, rcode_value);
    set_an_count(&mut resp, 0);
    set_ns_count(&mut resp, 0);
    set_ar_count(&mut resp, 0);
    resp
}

/// Synthesize the SERVFAIL sent to a client whose upstream transaction timed
/// out: id preserved, QR=1, RCODE=SERVFAIL, empty question/answer sections.
pub fn synthesize_servfail(tx_id: u16) -> [u8; HEADER_LEN] {
    let mut resp = [0u8; HEADER_LEN];
    set_id(&mut resp, tx_id);
    set_qr(&mut resp, true);
    set_rcode(&mut resp, rcode::SERVFAIL);
    resp
}

/// Splice `redirect_wire` (a pre-encoded wire-format domain) into the
/// question section in place of the original QNAME, preserving the header
/// (including id), the trailing QTYPE/QCLASS, and any bytes beyond the first
/// question byte-for-byte.
///
/// `qname_len` is the `consumed` value `parse_qname` returned for the
/// original QNAME.
pub fn synthesize_redirect(request: &[u8], qname_len: usize, redirect_wire: &[u8]) -> Vec<u8> {
    let question_start = HEADER_LEN;
    let rest_start = question_start + qname_len;
    let mut out = Vec::with_capacity(question_start + redirect_wire.len() + request.len() - rest_start);
    out.extend_from_slice(&request[..question_start]);
    out.extend_from_slice(redirect_wire);
    out.extend_from_slice(&request[rest_start..]);
    out
}

//! VRRPv3 advertisement framing.
//!
//! RFC 5798 Section 5.1 - VRRP Packet Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Version| Type  | Virtual Rtr ID|   Priority    |Count IPvX Addr|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |(rsvd) |     Max Adver Int     |          Checksum             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                                                               +
//! |                       IPv4 Address(es)                        |
//! +                                                               +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! On the wire an advertisement travels inside Ethernet + IPv4; the
//! functions here handle the whole stack so the agent can keep
//! pre-serialized frames per group.

use bytes::{BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

use crate::checksum::{ip_checksum, vrrp_pseudo_sum};
use crate::MacAddr;

/// VRRP protocol version (3 per RFC 5798).
pub const VRRP_VERSION: u8 = 3;

/// VRRP packet type (the only type defined in v3 is ADVERTISEMENT).
pub const VRRP_TYPE_ADVERTISEMENT: u8 = 1;

/// VRRP IP protocol number.
pub const VRRP_PROTOCOL: u8 = 112;

/// IPv4 TTL required on VRRP advertisements.
pub const VRRP_TTL: u8 = 255;

/// VRRP multicast group for IPv4.
pub const VRRP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 18);

/// Destination MAC for the VRRP multicast group.
pub const VRRP_MULTICAST_MAC: MacAddr = [0x01, 0x00, 0x5e, 0x00, 0x00, 0x12];

/// EtherType for IPv4.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

const ETHERNET_HEADER_LEN: usize = 14;
const IPV4_MIN_HEADER_LEN: usize = 20;
const VRRP_HEADER_LEN: usize = 8;
const IPV4_ADDR_LEN: usize = 4;

/// Virtual-router MAC address for a VRID (`00:00:5e:00:01:{vrid}`).
pub fn virtual_router_mac(vrid: u8) -> MacAddr {
    [0x00, 0x00, 0x5e, 0x00, 0x01, vrid]
}

/// Errors raised while parsing a received frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame truncated ({0} bytes)")]
    Truncated(usize),

    #[error("not an IPv4 frame (ethertype {0:#06x})")]
    BadEtherType(u16),

    #[error("bad IPv4 header")]
    BadIpHeader,

    #[error("not VRRP (IP protocol {0})")]
    BadProtocol(u8),

    #[error("bad TTL: {0}")]
    BadTtl(u8),

    #[error("bad version or type: version = {version}, type = {kind}")]
    BadVersionType { version: u8, kind: u8 },

    #[error("address count is zero")]
    NoAddresses,

    #[error("bad address block length: {0}")]
    BadAddressLength(usize),

    #[error("address count {count} does not match {actual} trailing addresses")]
    CountMismatch { count: u8, actual: usize },

    #[error("bad checksum")]
    BadChecksum,
}

/// Errors raised while building an outgoing frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("advertisement carries no addresses")]
    NoAddresses,

    #[error("too many addresses: {0}")]
    TooManyAddresses(usize),
}

/// Ethernet header of a parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
}

/// The IPv4 header fields the agent cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub ttl: u8,
    pub protocol: u8,
}

/// A VRRPv3 advertisement body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrrpV3Advert {
    /// Virtual Router ID (1-255).
    pub vrid: u8,

    /// Priority (1-254 normally, 255 for the address owner, 0 while the
    /// sender is shutting down).
    pub priority: u8,

    /// Maximum advertisement interval in centiseconds (12 bits on the wire).
    pub max_adver_int: u16,

    /// Virtual addresses, in sender order.
    pub addresses: Vec<Ipv4Addr>,
}

impl VrrpV3Advert {
    pub fn new(vrid: u8, priority: u8, max_adver_int: u16, addresses: Vec<Ipv4Addr>) -> Self {
        Self {
            vrid,
            priority,
            max_adver_int,
            addresses,
        }
    }

    fn body_len(&self) -> usize {
        VRRP_HEADER_LEN + IPV4_ADDR_LEN * self.addresses.len()
    }
}

/// Serialize the VRRP body alone, checksummed against `src_ip` and the
/// VRRP multicast destination.
pub fn serialize_vrrp_body(src_ip: Ipv4Addr, adv: &VrrpV3Advert) -> Result<Bytes, EncodeError> {
    if adv.addresses.is_empty() {
        return Err(EncodeError::NoAddresses);
    }
    if adv.addresses.len() > u8::MAX as usize {
        return Err(EncodeError::TooManyAddresses(adv.addresses.len()));
    }

    let mut buf = BytesMut::with_capacity(adv.body_len());
    put_vrrp_body(&mut buf, src_ip, adv);
    Ok(buf.freeze())
}

fn put_vrrp_body(buf: &mut BytesMut, src_ip: Ipv4Addr, adv: &VrrpV3Advert) {
    let start = buf.len();

    buf.put_u8((VRRP_VERSION << 4) | VRRP_TYPE_ADVERTISEMENT);
    buf.put_u8(adv.vrid);
    buf.put_u8(adv.priority);
    buf.put_u8(adv.addresses.len() as u8);
    buf.put_u16(adv.max_adver_int & 0x0fff);
    buf.put_u16(0); // checksum, patched below
    for addr in &adv.addresses {
        buf.put_slice(&addr.octets());
    }

    let body_len = (buf.len() - start) as u16;
    let pseudo = vrrp_pseudo_sum(src_ip, VRRP_MULTICAST_ADDR, body_len);
    let csum = ip_checksum(&buf[start..], pseudo);
    buf[start + 6..start + 8].copy_from_slice(&csum.to_be_bytes());
}

/// Serialize a complete advertisement frame: Ethernet, IPv4 and the
/// VRRP body, with both checksums computed.
///
/// The source MAC is the virtual-router MAC derived from the VRID, the
/// source IP the primary address of the sending sub-interface.
pub fn serialize_advert(src_ip: Ipv4Addr, adv: &VrrpV3Advert) -> Result<Bytes, EncodeError> {
    if adv.addresses.is_empty() {
        return Err(EncodeError::NoAddresses);
    }
    if adv.addresses.len() > u8::MAX as usize {
        return Err(EncodeError::TooManyAddresses(adv.addresses.len()));
    }

    let body_len = adv.body_len();
    let total_len = IPV4_MIN_HEADER_LEN + body_len;
    let mut buf = BytesMut::with_capacity(ETHERNET_HEADER_LEN + total_len);

    // Ethernet
    buf.put_slice(&VRRP_MULTICAST_MAC);
    buf.put_slice(&virtual_router_mac(adv.vrid));
    buf.put_u16(ETHERTYPE_IPV4);

    // IPv4, IHL 5, no options
    let ip_start = buf.len();
    buf.put_u8(0x45);
    buf.put_u8(0); // TOS
    buf.put_u16(total_len as u16);
    buf.put_u16(0); // identification
    buf.put_u16(0); // flags + fragment offset
    buf.put_u8(VRRP_TTL);
    buf.put_u8(VRRP_PROTOCOL);
    buf.put_u16(0); // header checksum, patched below
    buf.put_slice(&src_ip.octets());
    buf.put_slice(&VRRP_MULTICAST_ADDR.octets());

    let ip_csum = ip_checksum(&buf[ip_start..ip_start + IPV4_MIN_HEADER_LEN], 0);
    buf[ip_start + 10..ip_start + 12].copy_from_slice(&ip_csum.to_be_bytes());

    put_vrrp_body(&mut buf, src_ip, adv);

    Ok(buf.freeze())
}

/// Parse and validate a received advertisement frame.
///
/// Returns the Ethernet and IPv4 headers along with the advertisement body.
/// Trailing Ethernet padding beyond the IPv4 total length is ignored.
pub fn decode_advert(
    frame: &[u8],
) -> Result<(EthernetHeader, Ipv4Header, VrrpV3Advert), DecodeError> {
    if frame.len() < ETHERNET_HEADER_LEN + IPV4_MIN_HEADER_LEN + VRRP_HEADER_LEN {
        return Err(DecodeError::Truncated(frame.len()));
    }

    let eth = EthernetHeader {
        dst: [frame[0], frame[1], frame[2], frame[3], frame[4], frame[5]],
        src: [frame[6], frame[7], frame[8], frame[9], frame[10], frame[11]],
        ethertype: u16::from_be_bytes([frame[12], frame[13]]),
    };
    if eth.ethertype != ETHERTYPE_IPV4 {
        return Err(DecodeError::BadEtherType(eth.ethertype));
    }

    let ip_bytes = &frame[ETHERNET_HEADER_LEN..];
    let version = ip_bytes[0] >> 4;
    let header_len = usize::from(ip_bytes[0] & 0x0f) * 4;
    if version != 4 || header_len < IPV4_MIN_HEADER_LEN {
        return Err(DecodeError::BadIpHeader);
    }

    let total_len = usize::from(u16::from_be_bytes([ip_bytes[2], ip_bytes[3]]));
    if total_len < header_len || ip_bytes.len() < total_len {
        return Err(DecodeError::BadIpHeader);
    }

    let ip = Ipv4Header {
        src: Ipv4Addr::new(ip_bytes[12], ip_bytes[13], ip_bytes[14], ip_bytes[15]),
        dst: Ipv4Addr::new(ip_bytes[16], ip_bytes[17], ip_bytes[18], ip_bytes[19]),
        ttl: ip_bytes[8],
        protocol: ip_bytes[9],
    };
    if ip.protocol != VRRP_PROTOCOL {
        return Err(DecodeError::BadProtocol(ip.protocol));
    }
    if ip.ttl != VRRP_TTL {
        return Err(DecodeError::BadTtl(ip.ttl));
    }

    let body = &ip_bytes[header_len..total_len];
    let adv = decode_vrrp_body(body, ip.src, ip.dst)?;

    Ok((eth, ip, adv))
}

fn decode_vrrp_body(
    body: &[u8],
    src: Ipv4Addr,
    dst: Ipv4Addr,
) -> Result<VrrpV3Advert, DecodeError> {
    if body.len() < VRRP_HEADER_LEN {
        return Err(DecodeError::Truncated(body.len()));
    }

    let version = body[0] >> 4;
    let kind = body[0] & 0x0f;
    if version != VRRP_VERSION || kind != VRRP_TYPE_ADVERTISEMENT {
        return Err(DecodeError::BadVersionType { version, kind });
    }

    let count = body[3];
    if count == 0 {
        return Err(DecodeError::NoAddresses);
    }

    let addr_bytes = &body[VRRP_HEADER_LEN..];
    if addr_bytes.is_empty()
        || addr_bytes.len() % IPV4_ADDR_LEN != 0
        || addr_bytes.len() / IPV4_ADDR_LEN > u8::MAX as usize
    {
        return Err(DecodeError::BadAddressLength(addr_bytes.len()));
    }

    let actual = addr_bytes.len() / IPV4_ADDR_LEN;
    if usize::from(count) != actual {
        return Err(DecodeError::CountMismatch { count, actual });
    }

    let pseudo = vrrp_pseudo_sum(src, dst, body.len() as u16);
    if ip_checksum(body, pseudo) != 0 {
        return Err(DecodeError::BadChecksum);
    }

    let addresses = addr_bytes
        .chunks_exact(IPV4_ADDR_LEN)
        .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
        .collect();

    Ok(VrrpV3Advert {
        vrid: body[1],
        priority: body[2],
        max_adver_int: u16::from_be_bytes([body[4] & 0x0f, body[5]]),
        addresses,
    })
}

//! Frame codec for VRRPv3 over IPv4.
//!
//! Serializes and parses the two frame kinds the agent puts on the wire:
//!
//! - VRRPv3 advertisements (RFC 5798 section 5.1), carried as
//!   Ethernet + IPv4 (protocol 112) + VRRP body, multicast to `224.0.0.18`.
//! - Gratuitous ARP requests announcing a virtual address after a
//!   Master transition.
//!
//! Parsing is strict: anything that violates the RFC 5798 receive checks
//! (version, type, TTL, address count, checksum) is rejected with a
//! distinct [`DecodeError`] variant so callers can log what was wrong.

mod arp;
mod checksum;
mod vrrp;

pub use arp::{serialize_gratuitous_arp, BROADCAST_MAC, ETHERTYPE_ARP};
pub use checksum::{ip_checksum, vrrp_pseudo_sum};
pub use vrrp::{
    decode_advert, serialize_advert, serialize_vrrp_body, virtual_router_mac, DecodeError,
    EncodeError, EthernetHeader, Ipv4Header, VrrpV3Advert, ETHERTYPE_IPV4, VRRP_MULTICAST_ADDR,
    VRRP_MULTICAST_MAC, VRRP_PROTOCOL, VRRP_TTL, VRRP_TYPE_ADVERTISEMENT, VRRP_VERSION,
};

/// A MAC address as raw octets.
pub type MacAddr = [u8; 6];

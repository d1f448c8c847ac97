//! Gratuitous ARP framing.
//!
//! After a Master transition the agent broadcasts one ARP request per
//! virtual address with sender and target protocol address both set to the
//! virtual IP, so that neighbor caches repoint at the new holder.

use bytes::{BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

use crate::MacAddr;

/// EtherType for ARP.
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// Broadcast MAC address.
pub const BROADCAST_MAC: MacAddr = [0xff; 6];

const ARP_HW_ETHERNET: u16 = 1;
const ARP_OP_REQUEST: u16 = 1;
const ETHERTYPE_IPV4: u16 = 0x0800;

/// Build a gratuitous ARP request for `ip`, sent from `mac`.
pub fn serialize_gratuitous_arp(ip: Ipv4Addr, mac: MacAddr) -> Bytes {
    let mut buf = BytesMut::with_capacity(42);

    // Ethernet
    buf.put_slice(&BROADCAST_MAC);
    buf.put_slice(&mac);
    buf.put_u16(ETHERTYPE_ARP);

    // ARP
    buf.put_u16(ARP_HW_ETHERNET);
    buf.put_u16(ETHERTYPE_IPV4);
    buf.put_u8(6); // hardware address length
    buf.put_u8(4); // protocol address length
    buf.put_u16(ARP_OP_REQUEST);
    buf.put_slice(&mac);
    buf.put_slice(&ip.octets());
    buf.put_slice(&BROADCAST_MAC);
    buf.put_slice(&ip.octets());

    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garp_layout() {
        let mac = [0x02, 0x42, 0xac, 0x11, 0x00, 0x02];
        let ip = Ipv4Addr::new(10, 0, 0, 100);
        let frame = serialize_gratuitous_arp(ip, mac);

        assert_eq!(frame.len(), 42);
        assert_eq!(&frame[0..6], &BROADCAST_MAC);
        assert_eq!(&frame[6..12], &mac);
        assert_eq!(u16::from_be_bytes([frame[12], frame[13]]), ETHERTYPE_ARP);

        // hardware type 1, protocol type IPv4, lengths 6/4, opcode request
        assert_eq!(&frame[14..22], &[0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);

        // sender hardware/protocol, target hardware/protocol
        assert_eq!(&frame[22..28], &mac);
        assert_eq!(&frame[28..32], &ip.octets());
        assert_eq!(&frame[32..38], &BROADCAST_MAC);
        assert_eq!(&frame[38..42], &ip.octets());
    }
}

//! Dataplane collaborator interface.
//!
//! The agent never touches interfaces itself; it instructs the dataplane
//! agent that owns them. Addresses are passed in CIDR notation because the
//! dataplane needs prefix lengths to plumb the VIFs.

use async_trait::async_trait;
use bytes::Bytes;

use vrrpd_common::Result;

/// A MAC address as raw octets.
pub type MacAddr = [u8; 6];

/// A raw frame tagged with the sub-interface it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub subif: String,
    pub data: Bytes,
}

impl Packet {
    pub fn new(subif: impl Into<String>, data: Bytes) -> Self {
        Self {
            subif: subif.into(),
            data,
        }
    }
}

/// Remote agent that owns the physical interfaces.
#[async_trait]
pub trait Dataplane: Send + Sync {
    /// Fetch the physical MAC address of a sub-interface.
    async fn vif_mac(&self, subif: &str) -> Result<MacAddr>;

    /// Claim the virtual addresses on behalf of this router.
    async fn to_master(&self, subif: &str, primary: &str, virtual_addrs: &[String]) -> Result<()>;

    /// Release the virtual addresses.
    async fn to_backup(&self, subif: &str, primary: &str, virtual_addrs: &[String]) -> Result<()>;

    /// Transmit a batch of frames.
    async fn send_bulk(&self, packets: Vec<Packet>) -> Result<()>;
}

/// Parse a MAC address in `aa:bb:cc:dd:ee:ff` notation.
pub fn parse_mac(s: &str) -> Result<MacAddr> {
    let mut mac = [0u8; 6];
    let mut parts = s.split(':');
    for octet in mac.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| vrrpd_common::Error::dataplane(format!("invalid mac address: {s}")))?;
        *octet = u8::from_str_radix(part, 16)
            .map_err(|_| vrrpd_common::Error::dataplane(format!("invalid mac address: {s}")))?;
    }
    if parts.next().is_some() {
        return Err(vrrpd_common::Error::dataplane(format!(
            "invalid mac address: {s}"
        )));
    }
    Ok(mac)
}

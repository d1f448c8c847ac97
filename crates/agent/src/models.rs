//! Committed configuration snapshot models.
//!
//! The configuration service streams set/delete/commit events; what reaches
//! the agent is a committed snapshot of interfaces, sub-interfaces and their
//! VRRP entries. Tunnel interfaces carry no VRRP and are skipped when the
//! snapshot is flattened.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

/// Default priority for a non-owner router.
pub const DEFAULT_PRIORITY: u8 = 100;

/// Default preempt mode.
pub const DEFAULT_PREEMPT: bool = true;

/// Default accept mode.
pub const DEFAULT_ACCEPT: bool = false;

/// Default advertisement interval in centiseconds (one second).
pub const DEFAULT_INTERVAL: u16 = 100;

/// Maximum advertisement interval representable on the wire (12 bits).
pub const MAX_INTERVAL: u16 = 4095;

/// Interface type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Ethernet,
    Tunnel,
    #[serde(other)]
    Unknown,
}

/// One VRRP entry under a sub-interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrrpEntry {
    pub vrid: u8,

    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default = "default_preempt")]
    pub preempt: bool,

    #[serde(default)]
    pub accept: bool,

    /// Advertisement interval in centiseconds.
    #[serde(default = "default_interval")]
    pub interval: u16,

    /// Virtual addresses, insertion order preserved.
    #[serde(default)]
    pub virtual_addrs: Vec<Ipv4Addr>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

fn default_preempt() -> bool {
    DEFAULT_PREEMPT
}

fn default_interval() -> u16 {
    DEFAULT_INTERVAL
}

impl VrrpEntry {
    pub fn new(vrid: u8) -> Self {
        Self {
            vrid,
            priority: DEFAULT_PRIORITY,
            preempt: DEFAULT_PREEMPT,
            accept: DEFAULT_ACCEPT,
            interval: DEFAULT_INTERVAL,
            virtual_addrs: Vec::new(),
        }
    }

    /// Reports whether the entry can back a group.
    pub fn is_valid(&self) -> bool {
        self.vrid > 0
            && !self.virtual_addrs.is_empty()
            && self.priority >= 1
            && self.priority <= 254
            && self.interval >= 1
            && self.interval <= MAX_INTERVAL
    }

    /// Reports whether `addr` makes this router the address owner.
    pub fn is_owner(&self, addr: Ipv4Addr) -> bool {
        self.virtual_addrs.contains(&addr)
    }
}

/// A sub-interface carrying zero or more VRRP entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subinterface {
    pub name: String,
    pub index: u32,
    pub ip: Ipv4Addr,
    pub prefix: u8,

    #[serde(default)]
    pub vrrps: BTreeMap<u8, VrrpEntry>,
}

impl Subinterface {
    /// Reports whether the sub-interface and all of its entries are valid.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && self.prefix <= 32
            && self.vrrps.values().all(VrrpEntry::is_valid)
    }
}

/// A physical interface grouping sub-interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub kind: InterfaceKind,

    #[serde(default)]
    pub subinterfaces: HashMap<String, Subinterface>,
}

/// A committed configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default)]
    pub interfaces: HashMap<String, Interface>,
}

impl ConfigSnapshot {
    /// Flatten to a sub-interface table, ignoring tunnel interfaces.
    ///
    /// Later interfaces overwrite earlier ones on a duplicate sub-interface
    /// name, matching the coarse overwrite semantics of the update path.
    pub fn subif_table(&self) -> HashMap<String, Subinterface> {
        let mut table = HashMap::new();
        for iface in self.interfaces.values() {
            if iface.kind == InterfaceKind::Tunnel {
                continue;
            }
            for subif in iface.subinterfaces.values() {
                table.insert(subif.name.clone(), subif.clone());
            }
        }
        table
    }
}

//! Standalone agent example with a logging dataplane.
//!
//! Wires a full agent core around a dataplane stub that only logs what it
//! is asked to do, pushes one committed snapshot and lets the group elect
//! itself Master. Useful for watching the moving parts without a real
//! dataplane or capture path.
//!
//! Usage:
//!   cargo run --example standalone [priority]

use std::collections::BTreeMap;
use std::env;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::signal;
use tokio::time::sleep;

use vrrpd_agent::{
    Agent, ConfigSnapshot, Dataplane, Interface, InterfaceKind, MacAddr, Packet, Settings,
    Subinterface, VrrpEntry,
};
use vrrpd_common::Result;

struct LoggingDataplane;

#[async_trait]
impl Dataplane for LoggingDataplane {
    async fn vif_mac(&self, subif: &str) -> Result<MacAddr> {
        println!("dataplane: vif_mac({subif})");
        Ok([0x02, 0x42, 0xac, 0x11, 0x00, 0x02])
    }

    async fn to_master(&self, subif: &str, primary: &str, virtual_addrs: &[String]) -> Result<()> {
        println!("dataplane: to_master({subif}, {primary}, {virtual_addrs:?})");
        Ok(())
    }

    async fn to_backup(&self, subif: &str, primary: &str, virtual_addrs: &[String]) -> Result<()> {
        println!("dataplane: to_backup({subif}, {primary}, {virtual_addrs:?})");
        Ok(())
    }

    async fn send_bulk(&self, packets: Vec<Packet>) -> Result<()> {
        for packet in &packets {
            println!(
                "dataplane: send_bulk {} bytes on {}",
                packet.data.len(),
                packet.subif
            );
        }
        Ok(())
    }
}

fn snapshot(priority: u8) -> ConfigSnapshot {
    let mut entry = VrrpEntry::new(1);
    entry.priority = priority;
    entry.interval = 100; // 1 second
    entry.virtual_addrs = vec![Ipv4Addr::new(10, 0, 10, 1)];

    let mut vrrps = BTreeMap::new();
    vrrps.insert(entry.vrid, entry);

    let subif = Subinterface {
        name: "ge0.0".to_string(),
        index: 1,
        ip: Ipv4Addr::new(10, 0, 0, 1),
        prefix: 24,
        vrrps,
    };

    let mut iface = Interface {
        name: "ge0".to_string(),
        kind: InterfaceKind::Ethernet,
        subinterfaces: Default::default(),
    };
    iface.subinterfaces.insert(subif.name.clone(), subif);

    let mut snapshot = ConfigSnapshot::default();
    snapshot.interfaces.insert(iface.name.clone(), iface);
    snapshot
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    vrrpd_common::logging::init();

    let args: Vec<String> = env::args().collect();
    let priority: u8 = if args.len() > 1 {
        args[1].parse().unwrap_or(100)
    } else {
        100
    };

    println!("VRRP agent example: vrid 1, priority {priority}, vip 10.0.10.1");
    println!("No peers are wired in, so the group promotes itself after the");
    println!("master-down interval. Press Ctrl+C to stop.");
    println!();

    let mut agent = Agent::new(Settings::default(), Arc::new(LoggingDataplane));
    agent.start().await?;

    agent.updates().send(snapshot(priority)).await?;

    // Give the group time to run its election.
    sleep(Duration::from_millis(100)).await;

    signal::ctrl_c().await?;
    println!("shutting down");
    agent.shutdown().await?;

    Ok(())
}

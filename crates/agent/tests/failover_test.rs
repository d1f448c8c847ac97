//! End-to-end scenarios through the wired agent: election, failover,
//! preemption, tie-break and rebuild, driven over the public queues with an
//! in-memory dataplane.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use vrrpd_agent::{
    Agent, ConfigSnapshot, Dataplane, GroupState, Interface, InterfaceKind, MacAddr, ModuleState,
    Packet, Settings, Subinterface, VrrpEntry,
};
use vrrpd_common::{Error, Result};
use vrrpd_packet::{serialize_advert, VrrpV3Advert, ETHERTYPE_ARP};

const MAC: MacAddr = [0x02, 0x42, 0xac, 0x11, 0x00, 0x02];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    ToMaster(String, String, Vec<String>),
    ToBackup(String, String, Vec<String>),
}

#[derive(Default)]
struct MockDataplane {
    fail_mac: bool,
    calls: Mutex<Vec<Call>>,
    sent: Mutex<Vec<Packet>>,
}

impl MockDataplane {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing_mac() -> Arc<Self> {
        Arc::new(Self {
            fail_mac: true,
            ..Self::default()
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn sent(&self) -> Vec<Packet> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dataplane for MockDataplane {
    async fn vif_mac(&self, subif: &str) -> Result<MacAddr> {
        if self.fail_mac {
            return Err(Error::dataplane(format!("no such vif: {subif}")));
        }
        Ok(MAC)
    }

    async fn to_master(&self, subif: &str, primary: &str, virtual_addrs: &[String]) -> Result<()> {
        self.calls.lock().unwrap().push(Call::ToMaster(
            subif.to_string(),
            primary.to_string(),
            virtual_addrs.to_vec(),
        ));
        Ok(())
    }

    async fn to_backup(&self, subif: &str, primary: &str, virtual_addrs: &[String]) -> Result<()> {
        self.calls.lock().unwrap().push(Call::ToBackup(
            subif.to_string(),
            primary.to_string(),
            virtual_addrs.to_vec(),
        ));
        Ok(())
    }

    async fn send_bulk(&self, packets: Vec<Packet>) -> Result<()> {
        self.sent.lock().unwrap().extend(packets);
        Ok(())
    }
}

/// One Ethernet interface, one sub-interface, one VRRP entry.
fn snapshot(ip: Ipv4Addr, vrid: u8, priority: u8, interval: u16, vaddrs: &[Ipv4Addr]) -> ConfigSnapshot {
    let mut entry = VrrpEntry::new(vrid);
    entry.priority = priority;
    entry.interval = interval;
    entry.virtual_addrs = vaddrs.to_vec();

    let mut vrrps = BTreeMap::new();
    vrrps.insert(vrid, entry);

    let subif = Subinterface {
        name: "ge0.0".to_string(),
        index: 1,
        ip,
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

fn peer_advert_frame(src: Ipv4Addr, vrid: u8, priority: u8, interval: u16, vaddrs: &[Ipv4Addr]) -> Packet {
    let adv = VrrpV3Advert::new(vrid, priority, interval, vaddrs.to_vec());
    Packet::new("ge0.0", serialize_advert(src, &adv).unwrap())
}

async fn group_state(agent: &Agent, id: &str) -> Option<GroupState> {
    match agent.registry().get(id).await {
        Some(group) => Some(group.lock().await.state()),
        None => None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_owner_start_becomes_master_and_advertises() {
    let dataplane = MockDataplane::new();
    let mut agent = Agent::new(Settings::default(), dataplane.clone());
    agent.start().await.unwrap();

    let vip = Ipv4Addr::new(10, 0, 0, 1);
    agent
        .updates()
        .send(snapshot(vip, 50, 100, 10, &[vip]))
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;

    assert_eq!(group_state(&agent, "ge0.0:50").await, Some(GroupState::Master));

    let calls = dataplane.calls();
    assert_eq!(
        calls,
        vec![Call::ToMaster(
            "ge0.0".to_string(),
            "10.0.0.1/24".to_string(),
            vec!["10.0.0.1/24".to_string()],
        )]
    );

    let sent = dataplane.sent();
    assert!(!sent.is_empty());

    // The gratuitous ARP precedes the first advertisement.
    let first = &sent[0].data;
    assert_eq!(u16::from_be_bytes([first[12], first[13]]), ETHERTYPE_ARP);

    // Owner advertisements carry priority 255 and the configured interval.
    let advert = sent
        .iter()
        .find(|p| p.data[23] == 112)
        .expect("an advertisement was sent");
    assert_eq!(&advert.data[34..40], &[0x31, 0x32, 0xff, 0x01, 0x00, 0x0a]);

    agent.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_backup_holds_while_master_alive_then_fails_over() {
    let dataplane = MockDataplane::new();
    let mut agent = Agent::new(Settings::default(), dataplane.clone());
    agent.start().await.unwrap();

    let vip = Ipv4Addr::new(10, 0, 0, 100);
    agent
        .updates()
        .send(snapshot(Ipv4Addr::new(10, 0, 0, 5), 50, 100, 10, &[vip]))
        .await
        .unwrap();

    sleep(Duration::from_millis(100)).await;
    assert_eq!(group_state(&agent, "ge0.0:50").await, Some(GroupState::Backup));
    assert!(matches!(dataplane.calls().first(), Some(Call::ToBackup(..))));

    // A live higher-priority Master refreshes the down-timer each time.
    let ingress = agent.ingress();
    for _ in 0..8 {
        ingress
            .push(vec![peer_advert_frame(
                Ipv4Addr::new(10, 0, 0, 9),
                50,
                200,
                10,
                &[vip],
            )])
            .await;
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(group_state(&agent, "ge0.0:50").await, Some(GroupState::Backup));

    // Master goes quiet; the down-timer (36 centiseconds) elapses.
    sleep(Duration::from_millis(800)).await;
    assert_eq!(group_state(&agent, "ge0.0:50").await, Some(GroupState::Master));
    assert!(dataplane.calls().contains(&Call::ToMaster(
        "ge0.0".to_string(),
        "10.0.0.5/24".to_string(),
        vec!["10.0.0.100/24".to_string()],
    )));

    agent.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_preemption_is_immediate() {
    let dataplane = MockDataplane::new();
    let mut agent = Agent::new(Settings::default(), dataplane.clone());
    agent.start().await.unwrap();

    let vip = Ipv4Addr::new(10, 0, 0, 100);
    agent
        .updates()
        .send(snapshot(Ipv4Addr::new(10, 0, 0, 5), 50, 200, 100, &[vip]))
        .await
        .unwrap();

    sleep(Duration::from_millis(100)).await;
    assert_eq!(group_state(&agent, "ge0.0:50").await, Some(GroupState::Backup));

    // A weaker Master advertises; with preempt on we take over without
    // waiting out the down-timer (which is over 3 seconds here).
    agent
        .ingress()
        .push(vec![peer_advert_frame(
            Ipv4Addr::new(10, 0, 0, 9),
            50,
            100,
            100,
            &[vip],
        )])
        .await;

    sleep(Duration::from_millis(200)).await;
    assert_eq!(group_state(&agent, "ge0.0:50").await, Some(GroupState::Master));

    agent.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_priority_tie_higher_source_ip_wins() {
    let dataplane = MockDataplane::new();
    let mut agent = Agent::new(Settings::default(), dataplane.clone());
    agent.start().await.unwrap();

    let vip = Ipv4Addr::new(10, 0, 0, 100);
    agent
        .updates()
        .send(snapshot(Ipv4Addr::new(10, 0, 0, 5), 50, 100, 10, &[vip]))
        .await
        .unwrap();

    // Nobody is advertising, so the group promotes itself.
    sleep(Duration::from_millis(800)).await;
    assert_eq!(group_state(&agent, "ge0.0:50").await, Some(GroupState::Master));

    // Equal priority from a numerically higher source address wins.
    agent
        .ingress()
        .push(vec![peer_advert_frame(
            Ipv4Addr::new(10, 0, 0, 9),
            50,
            100,
            10,
            &[vip],
        )])
        .await;

    sleep(Duration::from_millis(200)).await;
    assert_eq!(group_state(&agent, "ge0.0:50").await, Some(GroupState::Backup));

    agent.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rebuild_announces_departure_and_suspends() {
    let dataplane = MockDataplane::new();
    let mut agent = Agent::new(Settings::default(), dataplane.clone());
    agent.start().await.unwrap();

    let vip = Ipv4Addr::new(10, 0, 0, 1);
    agent
        .updates()
        .send(snapshot(vip, 50, 100, 10, &[vip]))
        .await
        .unwrap();

    sleep(Duration::from_millis(200)).await;
    assert_eq!(group_state(&agent, "ge0.0:50").await, Some(GroupState::Master));

    // An empty snapshot tears the group down and idles the agent.
    agent.updates().send(ConfigSnapshot::default()).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    assert_eq!(group_state(&agent, "ge0.0:50").await, None);
    assert!(agent.registry().is_empty().await);
    assert_eq!(agent.modules().state().await, ModuleState::Suspended);

    // Exactly one priority-zero advertisement announced the departure.
    let zero_adverts: Vec<_> = dataplane
        .sent()
        .into_iter()
        .filter(|p| p.data[23] == 112 && p.data[36] == 0)
        .collect();
    assert_eq!(zero_adverts.len(), 1);

    // The final dataplane instruction released the addresses.
    assert!(matches!(dataplane.calls().last(), Some(Call::ToBackup(..))));

    agent.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_vrid_does_not_instantiate_groups() {
    let dataplane = MockDataplane::new();
    let mut agent = Agent::new(Settings::default(), dataplane.clone());
    agent.start().await.unwrap();

    let vip = Ipv4Addr::new(10, 0, 0, 100);
    agent
        .updates()
        .send(snapshot(Ipv4Addr::new(10, 0, 0, 5), 50, 100, 100, &[vip]))
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    agent
        .ingress()
        .push(vec![peer_advert_frame(
            Ipv4Addr::new(10, 0, 0, 9),
            77,
            100,
            100,
            &[vip],
        )])
        .await;
    sleep(Duration::from_millis(100)).await;

    assert_eq!(agent.registry().len().await, 1);
    assert!(agent.registry().get("ge0.0:77").await.is_none());

    agent.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dataplane_mac_failure_is_fatal() {
    let dataplane = MockDataplane::failing_mac();
    let mut agent = Agent::new(Settings::default(), dataplane);
    agent.start().await.unwrap();

    let vip = Ipv4Addr::new(10, 0, 0, 100);
    agent
        .updates()
        .send(snapshot(Ipv4Addr::new(10, 0, 0, 5), 50, 100, 100, &[vip]))
        .await
        .unwrap();

    let result = agent.join().await;
    assert!(result.is_err());
}

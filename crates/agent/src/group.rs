//! Per-group VRRP state and transitions.
//!
//! A [`Group`] is one VRRP instance on one sub-interface. Transitions are
//! driven through [`Group::apply`], which returns the ordered side effects
//! of the transition instead of performing them; the caller executes the
//! effects while still serialized on the group's lock. This keeps the state
//! machine free of I/O and directly assertable in tests.
//!
//! ```text
//!     +---+   [Start]
//!     | . |------------------+
//!     +---+                  |
//!                            V
//!     [Shutdown]         +-----------------+         [Shutdown]
//!            +---------->|                 |<----------+
//!            |           |   Initialize    |           |
//!            |   +-------|                 |-------+   |
//!            |   |       +-----------------+       |   |
//!            |   |[StartMaster]                    |   |
//!            |   |                    [StartBackup]|   |
//!            |   V                                 V   |
//!    +---------------+   [DetectedNewMaster]  +---------------+
//!    |               |------------------------>|              |
//!    |    Master     |                         |    Backup    |
//!    |               |<------------------------|              |
//!    +---------------+      [MasterDown]       +--------------+
//!                            [Preempt]
//! ```

use std::net::Ipv4Addr;
use std::time::Instant;

use tracing::{debug, error, info};

use vrrpd_common::{Error, Result};
use vrrpd_packet::{serialize_advert, serialize_gratuitous_arp, VrrpV3Advert};

use crate::dataplane::{MacAddr, Packet};
use crate::models::{Subinterface, VrrpEntry};
use crate::types::{centiseconds, GroupEvent, GroupState};

/// Identity of a group: `"{subif}:{vrid}"`.
pub type GroupId = String;

/// Build the identity string for a (sub-interface, VRID) pair.
pub fn group_id(subif: &str, vrid: u8) -> GroupId {
    format!("{subif}:{vrid}")
}

/// A side effect of a state transition, executed by the caller in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Instruct the dataplane to claim the virtual addresses.
    ToMaster {
        subif: String,
        primary: String,
        virtual_addrs: Vec<String>,
    },

    /// Instruct the dataplane to release the virtual addresses.
    ToBackup {
        subif: String,
        primary: String,
        virtual_addrs: Vec<String>,
    },

    /// Hand a batch of frames to the egress sink.
    SendPackets(Vec<Packet>),

    AddToAdvTable(GroupId),
    RemoveFromAdvTable(GroupId),
    AddToBackupTable(GroupId),
    RemoveFromBackupTable(GroupId),
}

/// Transition counters, useful for tests and debugging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub master_transitions: u64,
    pub backup_transitions: u64,
    pub adverts_sent: u64,
}

/// One VRRP instance.
#[derive(Debug)]
pub struct Group {
    id: GroupId,
    subif_name: String,
    subif_ip: Ipv4Addr,
    subif_prefix: u8,
    subif_mac: MacAddr,
    vrid: u8,
    priority: u8,
    preempt: bool,
    accept: bool,
    max_adver_int: u16,
    skew_time: u16,
    master_down_interval: u16,
    state: GroupState,
    virtual_addrs: Vec<Ipv4Addr>,
    next_master_adv_time: Instant,
    next_down_time: Instant,
    adv_packets: Vec<Packet>,
    adv_priority_zero_packets: Vec<Packet>,
    garp_packets: Vec<Packet>,
    stats: GroupStats,
}

impl Group {
    /// Construct a group from a sub-interface and one of its VRRP entries.
    ///
    /// `mac` is the physical MAC of the sub-interface, fetched once from the
    /// dataplane by the caller. The address owner gets priority 255
    /// regardless of the configured value.
    pub fn new(subif: &Subinterface, entry: &VrrpEntry, mac: MacAddr) -> Result<Self> {
        if !entry.is_valid() {
            return Err(Error::config(format!(
                "invalid vrrp entry on {}: vrid {}",
                subif.name, entry.vrid
            )));
        }

        let priority = if entry.is_owner(subif.ip) {
            255
        } else {
            entry.priority
        };

        let now = Instant::now();
        let mut group = Self {
            id: group_id(&subif.name, entry.vrid),
            subif_name: subif.name.clone(),
            subif_ip: subif.ip,
            subif_prefix: subif.prefix,
            subif_mac: mac,
            vrid: entry.vrid,
            priority,
            preempt: entry.preempt,
            accept: entry.accept,
            max_adver_int: entry.interval,
            skew_time: 0,
            master_down_interval: 0,
            state: GroupState::Initialize,
            virtual_addrs: entry.virtual_addrs.clone(),
            next_master_adv_time: now,
            next_down_time: now,
            adv_packets: Vec::new(),
            adv_priority_zero_packets: Vec::new(),
            garp_packets: Vec::new(),
            stats: GroupStats::default(),
        };

        group.recompute_timers();
        group.next_down_time = now + centiseconds(group.master_down_interval);
        group.rebuild_packets()?;

        Ok(group)
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn max_adver_int(&self) -> u16 {
        self.max_adver_int
    }

    pub fn skew_time(&self) -> u16 {
        self.skew_time
    }

    pub fn master_down_interval(&self) -> u16 {
        self.master_down_interval
    }

    pub fn accept_mode(&self) -> bool {
        self.accept
    }

    pub fn stats(&self) -> GroupStats {
        self.stats
    }

    pub fn next_master_adv_time(&self) -> Instant {
        self.next_master_adv_time
    }

    pub fn next_down_time(&self) -> Instant {
        self.next_down_time
    }

    /// Skew time and master-down interval derived from priority and the
    /// advertisement interval (RFC 5798 section 6.1, centisecond integer
    /// arithmetic).
    fn recompute_timers(&mut self) {
        let interval = u32::from(self.max_adver_int);
        let skew = ((256 - u32::from(self.priority)) * interval) / 256;
        let master_down = 3 * interval + skew;

        if skew as u16 != self.skew_time || master_down as u16 != self.master_down_interval {
            self.skew_time = skew as u16;
            self.master_down_interval = master_down as u16;
            info!(
                group = %self.id,
                skew_time = self.skew_time,
                master_down_interval = self.master_down_interval,
                "timers recomputed"
            );
        }
    }

    /// Regenerate the pre-serialized advertisement, priority-zero
    /// advertisement and gratuitous ARP templates.
    fn rebuild_packets(&mut self) -> Result<()> {
        let adv = VrrpV3Advert::new(
            self.vrid,
            self.priority,
            self.max_adver_int,
            self.virtual_addrs.clone(),
        );
        let frame = serialize_advert(self.subif_ip, &adv).map_err(Error::codec)?;
        self.adv_packets = vec![Packet::new(self.subif_name.clone(), frame)];

        let zero = VrrpV3Advert { priority: 0, ..adv };
        let frame = serialize_advert(self.subif_ip, &zero).map_err(Error::codec)?;
        self.adv_priority_zero_packets = vec![Packet::new(self.subif_name.clone(), frame)];

        self.garp_packets = self
            .virtual_addrs
            .iter()
            .map(|addr| {
                Packet::new(
                    self.subif_name.clone(),
                    serialize_gratuitous_arp(*addr, self.subif_mac),
                )
            })
            .collect();

        Ok(())
    }

    fn cidr_args(&self) -> (String, Vec<String>) {
        let primary = format!("{}/{}", self.subif_ip, self.subif_prefix);
        let virtuals = self
            .virtual_addrs
            .iter()
            .map(|addr| format!("{}/{}", addr, self.subif_prefix))
            .collect();
        (primary, virtuals)
    }

    fn to_master_effect(&self) -> Effect {
        let (primary, virtual_addrs) = self.cidr_args();
        Effect::ToMaster {
            subif: self.subif_name.clone(),
            primary,
            virtual_addrs,
        }
    }

    fn to_backup_effect(&self) -> Effect {
        let (primary, virtual_addrs) = self.cidr_args();
        Effect::ToBackup {
            subif: self.subif_name.clone(),
            primary,
            virtual_addrs,
        }
    }

    fn contains_interface_ip(&self, addrs: &[Ipv4Addr]) -> bool {
        addrs.contains(&self.subif_ip)
    }

    fn set_next_down_time(&mut self, now: Instant, interval: u16) {
        self.next_down_time = now + centiseconds(interval);
    }

    fn adopt_master_interval(&mut self, interval: u16) {
        if interval == self.max_adver_int {
            return;
        }
        self.max_adver_int = interval;
        self.recompute_timers();
        if let Err(e) = self.rebuild_packets() {
            error!(group = %self.id, error = %e, "failed to rebuild packet templates");
        }
    }

    fn become_master(&mut self) -> Vec<Effect> {
        info!(group = %self.id, "become Master");

        let effects = vec![
            Effect::RemoveFromBackupTable(self.id.clone()),
            self.to_master_effect(),
            Effect::SendPackets(self.garp_packets.clone()),
            Effect::AddToAdvTable(self.id.clone()),
        ];

        self.state = GroupState::Master;
        self.stats.master_transitions += 1;
        effects
    }

    fn become_backup(&mut self) -> Vec<Effect> {
        info!(group = %self.id, "become Backup");

        let effects = vec![
            Effect::RemoveFromAdvTable(self.id.clone()),
            Effect::AddToBackupTable(self.id.clone()),
            self.to_backup_effect(),
        ];

        self.state = GroupState::Backup;
        self.stats.backup_transitions += 1;
        effects
    }

    fn become_initialize(&mut self) -> Vec<Effect> {
        info!(group = %self.id, "become Initialize");

        let effects = match self.state {
            GroupState::Initialize => Vec::new(),
            GroupState::Backup => vec![Effect::RemoveFromBackupTable(self.id.clone())],
            GroupState::Master => vec![
                Effect::RemoveFromAdvTable(self.id.clone()),
                Effect::SendPackets(self.adv_priority_zero_packets.clone()),
                self.to_backup_effect(),
            ],
        };

        self.state = GroupState::Initialize;
        effects
    }

    /// Drive the state machine with an event, returning the transition's
    /// side effects in execution order. Illegal event/state pairs are
    /// logged and ignored.
    pub fn apply(&mut self, event: GroupEvent) -> Vec<Effect> {
        match (self.state, event) {
            (GroupState::Initialize, GroupEvent::Start) => {
                if self.contains_interface_ip(&self.virtual_addrs) || self.priority == 255 {
                    self.apply(GroupEvent::StartMaster)
                } else {
                    self.apply(GroupEvent::StartBackup)
                }
            }
            (GroupState::Initialize, GroupEvent::StartMaster) => self.become_master(),
            (GroupState::Initialize, GroupEvent::StartBackup) => self.become_backup(),
            (GroupState::Master, GroupEvent::DetectedNewMaster) => self.become_backup(),
            (GroupState::Backup, GroupEvent::MasterDown)
            | (GroupState::Backup, GroupEvent::Preempt) => self.become_master(),
            (GroupState::Master, GroupEvent::Shutdown)
            | (GroupState::Backup, GroupEvent::Shutdown) => self.become_initialize(),
            (state, event) => {
                error!(group = %self.id, %state, %event, "bad event in state, ignoring");
                Vec::new()
            }
        }
    }

    /// Process a validated advertisement received at `now`.
    pub fn handle_advertisement(
        &mut self,
        adv: &VrrpV3Advert,
        src: Ipv4Addr,
        now: Instant,
    ) -> Vec<Effect> {
        // An advertisement listing our own primary address is an echo of
        // ourselves or another owner of the same address; never act on it.
        if self.contains_interface_ip(&adv.addresses) {
            debug!(group = %self.id, %src, "discarding advertisement carrying our address");
            return Vec::new();
        }

        match self.state {
            GroupState::Initialize => Vec::new(),
            GroupState::Backup => {
                if self.priority == 0 {
                    // Local shutdown in progress; wait only the skew time.
                    self.set_next_down_time(now, self.skew_time);
                    Vec::new()
                } else if self.preempt && adv.priority < self.priority {
                    debug!(
                        group = %self.id,
                        adv_priority = adv.priority,
                        priority = self.priority,
                        "preempting lower-priority Master"
                    );
                    self.apply(GroupEvent::Preempt)
                } else if !self.preempt || adv.priority >= self.priority {
                    self.adopt_master_interval(adv.max_adver_int);
                    self.set_next_down_time(now, self.master_down_interval);
                    Vec::new()
                } else {
                    debug!(group = %self.id, %src, "discarding advertisement");
                    Vec::new()
                }
            }
            GroupState::Master => {
                if self.priority == 0 {
                    self.next_master_adv_time = now;
                    Vec::new()
                } else if adv.priority > self.priority
                    || (adv.priority == self.priority && src.octets() > self.subif_ip.octets())
                {
                    debug!(
                        group = %self.id,
                        adv_priority = adv.priority,
                        priority = self.priority,
                        %src,
                        "yielding to new Master"
                    );
                    let mut effects = vec![Effect::RemoveFromAdvTable(self.id.clone())];
                    self.adopt_master_interval(adv.max_adver_int);
                    self.set_next_down_time(now, self.master_down_interval);
                    effects.extend(self.apply(GroupEvent::DetectedNewMaster));
                    effects
                } else {
                    debug!(group = %self.id, %src, "discarding advertisement");
                    Vec::new()
                }
            }
        }
    }

    /// If the advertisement timer has expired, advance it and return the
    /// pre-serialized advertisement batch.
    pub fn take_due_advertisement(&mut self, now: Instant) -> Option<Vec<Packet>> {
        if self.state != GroupState::Master {
            return None;
        }
        if self.next_master_adv_time > now {
            return None;
        }

        self.next_master_adv_time = now + centiseconds(self.max_adver_int);
        self.stats.adverts_sent += 1;
        Some(self.adv_packets.clone())
    }

    /// Reports whether the master-down timer has elapsed.
    pub fn master_down_expired(&self, now: Instant) -> bool {
        self.next_down_time <= now
    }
}

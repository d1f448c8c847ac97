//! Group registry, timer tables and receive dispatch.
//!
//! The registry is the single owner of all groups, keyed by
//! `"{subif}:{vrid}"`. The timer tables hold group identifiers only; the
//! tickers re-acquire the group through the registry on every tick, so
//! deleting a group from the registry is always safe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use vrrpd_common::Result;
use vrrpd_packet::decode_advert;

use crate::dataplane::Packet;
use crate::effects::EffectCtx;
use crate::group::{group_id, Group, GroupId};
use crate::models::Subinterface;
use crate::module::{ModuleState, Modules};
use crate::types::GroupEvent;

/// A set of group identifiers owned by one of the ticker loops.
#[derive(Default)]
pub struct TimerTable {
    entries: DashMap<GroupId, ()>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: GroupId) {
        self.entries.insert(id, ());
    }

    pub fn remove(&self, id: &str) {
        self.entries.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Clone out the current identifiers so callers never hold table locks
    /// while locking groups.
    pub fn snapshot(&self) -> Vec<GroupId> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

/// Owner of all live groups.
#[derive(Default)]
pub struct Registry {
    groups: RwLock<HashMap<GroupId, Arc<Mutex<Group>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Group>>> {
        self.groups.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.groups.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.groups.read().await.is_empty()
    }

    /// Route a batch of received frames into their groups.
    ///
    /// Holds the registry read lock for the whole batch so a concurrent
    /// rebuild cannot hand frames to groups that are being torn down.
    /// Undecodable frames and frames for unknown groups are dropped.
    pub async fn dispatch(&self, batch: Vec<Packet>, ctx: &EffectCtx) {
        let groups = self.groups.read().await;

        for packet in batch {
            let now = Instant::now();
            let (_eth, ip, adv) = match decode_advert(&packet.data) {
                Ok(layers) => layers,
                Err(e) => {
                    warn!(subif = %packet.subif, error = %e, "dropping bad frame");
                    continue;
                }
            };

            let id = group_id(&packet.subif, adv.vrid);
            let Some(group) = groups.get(&id) else {
                warn!(group = %id, "advertisement for unknown group");
                continue;
            };

            let mut group = group.lock().await;
            let effects = group.handle_advertisement(&adv, ip.src, now);
            ctx.run(effects).await;
        }
    }

    /// Rebuild all groups from a committed snapshot.
    ///
    /// Runs under the registry's exclusive lock: shut down and drop every
    /// existing group, resume the agent if it was suspended, then create a
    /// group for every valid entry. Construction failure is fatal to the
    /// caller. If the rebuild ends with no groups, the agent suspends.
    pub async fn update_settings(
        &self,
        subif_table: &HashMap<String, Subinterface>,
        ctx: &EffectCtx,
        modules: &Modules,
    ) -> Result<()> {
        let mut groups = self.groups.write().await;

        debug!("update settings");

        for (id, group) in groups.drain() {
            let mut group = group.lock().await;
            let effects = group.apply(GroupEvent::Shutdown);
            ctx.run(effects).await;
            debug!(group = %id, "deleted");
        }

        if modules.state().await == ModuleState::Suspended {
            modules.resume().await?;
        }

        for subif in subif_table.values() {
            if !subif.is_valid() {
                error!(subif = %subif.name, "skipping invalid subinterface");
                continue;
            }
            for entry in subif.vrrps.values() {
                let mac = ctx.dataplane.vif_mac(&subif.name).await?;
                let mut group = Group::new(subif, entry, mac)?;
                let effects = group.apply(GroupEvent::Start);
                ctx.run(effects).await;

                let id = group.id().clone();
                info!(group = %id, state = %group.state(), "created");
                groups.insert(id, Arc::new(Mutex::new(group)));
            }
        }

        if groups.is_empty() {
            modules.suspend().await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::mpsc;

    use vrrpd_packet::{serialize_advert, VrrpV3Advert};

    use crate::dataplane::{Dataplane, MacAddr};
    use crate::models::VrrpEntry;
    use crate::types::GroupState;

    struct NullDataplane;

    #[async_trait]
    impl Dataplane for NullDataplane {
        async fn vif_mac(&self, _subif: &str) -> Result<MacAddr> {
            Ok([0x02, 0, 0, 0, 0, 0x01])
        }

        async fn to_master(
            &self,
            _subif: &str,
            _primary: &str,
            _virtual_addrs: &[String],
        ) -> Result<()> {
            Ok(())
        }

        async fn to_backup(
            &self,
            _subif: &str,
            _primary: &str,
            _virtual_addrs: &[String],
        ) -> Result<()> {
            Ok(())
        }

        async fn send_bulk(&self, _packets: Vec<Packet>) -> Result<()> {
            Ok(())
        }
    }

    fn ctx() -> (EffectCtx, mpsc::Receiver<Vec<Packet>>) {
        let (tx, rx) = mpsc::channel(100);
        let ctx = EffectCtx {
            dataplane: Arc::new(NullDataplane),
            egress: tx,
            egress_paused: Arc::new(AtomicBool::new(false)),
            adv_table: Arc::new(TimerTable::new()),
            backup_table: Arc::new(TimerTable::new()),
        };
        (ctx, rx)
    }

    fn subif(name: &str, ip: Ipv4Addr, entries: &[(u8, u8, Ipv4Addr)]) -> Subinterface {
        let mut vrrps = BTreeMap::new();
        for (vrid, priority, vip) in entries {
            let mut entry = VrrpEntry::new(*vrid);
            entry.priority = *priority;
            entry.virtual_addrs = vec![*vip];
            vrrps.insert(*vrid, entry);
        }
        Subinterface {
            name: name.to_string(),
            index: 1,
            ip,
            prefix: 24,
            vrrps,
        }
    }

    async fn started_modules() -> Modules {
        let modules = Modules::new();
        modules.mark_started().await.unwrap();
        modules
    }

    #[tokio::test]
    async fn test_timer_table_snapshot() {
        let table = TimerTable::new();
        table.insert("a:1".to_string());
        table.insert("b:2".to_string());
        assert_eq!(table.len(), 2);

        let mut ids = table.snapshot();
        ids.sort();
        assert_eq!(ids, vec!["a:1".to_string(), "b:2".to_string()]);

        table.remove("a:1");
        assert!(!table.contains("a:1"));
        assert!(table.contains("b:2"));
    }

    #[tokio::test]
    async fn test_update_settings_builds_groups_into_disjoint_tables() {
        let registry = Registry::new();
        let (ctx, _egress) = ctx();
        let modules = started_modules().await;

        // vrid 1 owns its virtual address, vrid 2 does not.
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let mut table = HashMap::new();
        table.insert(
            "ge0.0".to_string(),
            subif("ge0.0", ip, &[(1, 100, ip), (2, 100, Ipv4Addr::new(10, 0, 0, 200))]),
        );

        registry.update_settings(&table, &ctx, &modules).await.unwrap();
        assert_eq!(registry.len().await, 2);

        let owner = registry.get("ge0.0:1").await.unwrap();
        assert_eq!(owner.lock().await.state(), GroupState::Master);
        let backup = registry.get("ge0.0:2").await.unwrap();
        assert_eq!(backup.lock().await.state(), GroupState::Backup);

        for id in ["ge0.0:1", "ge0.0:2"] {
            assert!(ctx.adv_table.contains(id) ^ ctx.backup_table.contains(id));
        }
        assert!(ctx.adv_table.contains("ge0.0:1"));
        assert!(ctx.backup_table.contains("ge0.0:2"));
    }

    #[tokio::test]
    async fn test_update_settings_rebuild_replaces_everything() {
        let registry = Registry::new();
        let (ctx, _egress) = ctx();
        let modules = started_modules().await;

        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let mut table = HashMap::new();
        table.insert("ge0.0".to_string(), subif("ge0.0", ip, &[(1, 100, ip)]));
        registry.update_settings(&table, &ctx, &modules).await.unwrap();

        let mut table = HashMap::new();
        table.insert(
            "ge0.1".to_string(),
            subif("ge0.1", Ipv4Addr::new(10, 0, 1, 1), &[(9, 100, Ipv4Addr::new(10, 0, 1, 200))]),
        );
        registry.update_settings(&table, &ctx, &modules).await.unwrap();

        assert!(registry.get("ge0.0:1").await.is_none());
        assert!(registry.get("ge0.1:9").await.is_some());
        assert!(!ctx.adv_table.contains("ge0.0:1"));
        assert_eq!(modules.state().await, ModuleState::Started);
    }

    #[tokio::test]
    async fn test_update_settings_empty_suspends_and_next_resumes() {
        let registry = Registry::new();
        let (ctx, _egress) = ctx();
        let modules = started_modules().await;

        registry
            .update_settings(&HashMap::new(), &ctx, &modules)
            .await
            .unwrap();
        assert_eq!(modules.state().await, ModuleState::Suspended);

        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let mut table = HashMap::new();
        table.insert("ge0.0".to_string(), subif("ge0.0", ip, &[(1, 100, ip)]));
        registry.update_settings(&table, &ctx, &modules).await.unwrap();
        assert_eq!(modules.state().await, ModuleState::Started);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_settings_skips_invalid_subinterface() {
        let registry = Registry::new();
        let (ctx, _egress) = ctx();
        let modules = started_modules().await;

        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let mut bad = subif("ge0.0", ip, &[(1, 100, ip)]);
        bad.prefix = 40;
        let mut table = HashMap::new();
        table.insert("ge0.0".to_string(), bad);
        table.insert(
            "ge0.1".to_string(),
            subif("ge0.1", Ipv4Addr::new(10, 0, 1, 1), &[(2, 100, Ipv4Addr::new(10, 0, 1, 200))]),
        );

        registry.update_settings(&table, &ctx, &modules).await.unwrap();
        assert!(registry.get("ge0.0:1").await.is_none());
        assert!(registry.get("ge0.1:2").await.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_group() {
        let registry = Registry::new();
        let (ctx, _egress) = ctx();
        let modules = started_modules().await;

        let mut table = HashMap::new();
        table.insert(
            "ge0.0".to_string(),
            subif(
                "ge0.0",
                Ipv4Addr::new(10, 0, 0, 5),
                &[(50, 200, Ipv4Addr::new(10, 0, 0, 100))],
            ),
        );
        registry.update_settings(&table, &ctx, &modules).await.unwrap();

        // A weaker Master advertises; preemption promotes the group.
        let adv = VrrpV3Advert::new(50, 100, 100, vec![Ipv4Addr::new(10, 0, 0, 100)]);
        let frame = serialize_advert(Ipv4Addr::new(10, 0, 0, 9), &adv).unwrap();
        registry
            .dispatch(vec![Packet::new("ge0.0", frame)], &ctx)
            .await;

        let group = registry.get("ge0.0:50").await.unwrap();
        assert_eq!(group.lock().await.state(), GroupState::Master);
        assert!(ctx.adv_table.contains("ge0.0:50"));
        assert!(!ctx.backup_table.contains("ge0.0:50"));
    }

    #[tokio::test]
    async fn test_dispatch_drops_unknown_group_and_garbage() {
        let registry = Registry::new();
        let (ctx, _egress) = ctx();

        let adv = VrrpV3Advert::new(7, 100, 100, vec![Ipv4Addr::new(10, 0, 0, 100)]);
        let frame = serialize_advert(Ipv4Addr::new(10, 0, 0, 9), &adv).unwrap();

        registry
            .dispatch(
                vec![
                    Packet::new("ge0.0", frame),
                    Packet::new("ge0.0", bytes::Bytes::from_static(&[0u8; 10])),
                ],
                &ctx,
            )
            .await;

        // Unknown VRIDs never instantiate groups.
        assert_eq!(registry.len().await, 0);
    }
}

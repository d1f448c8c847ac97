//! Execution of state-machine effects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::dataplane::{Dataplane, Packet};
use crate::group::Effect;
use crate::registry::TimerTable;

/// Everything an effect needs to run: the dataplane collaborator, the
/// egress sink and the two timer tables.
///
/// Dataplane RPC failures are logged and swallowed; the state machine has
/// already advanced and a flaky participant is preferable to a wedged one.
#[derive(Clone)]
pub struct EffectCtx {
    pub dataplane: Arc<dyn Dataplane>,
    pub egress: mpsc::Sender<Vec<Packet>>,
    pub egress_paused: Arc<AtomicBool>,
    pub adv_table: Arc<TimerTable>,
    pub backup_table: Arc<TimerTable>,
}

impl EffectCtx {
    /// Execute effects in order.
    pub async fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ToMaster {
                    subif,
                    primary,
                    virtual_addrs,
                } => {
                    if let Err(e) = self
                        .dataplane
                        .to_master(&subif, &primary, &virtual_addrs)
                        .await
                    {
                        error!(%subif, error = %e, "ToMaster failed");
                    }
                }
                Effect::ToBackup {
                    subif,
                    primary,
                    virtual_addrs,
                } => {
                    if let Err(e) = self
                        .dataplane
                        .to_backup(&subif, &primary, &virtual_addrs)
                        .await
                    {
                        error!(%subif, error = %e, "ToBackup failed");
                    }
                }
                Effect::SendPackets(packets) => {
                    if self.egress_paused.load(Ordering::SeqCst) {
                        debug!(frames = packets.len(), "egress suspended, dropping batch");
                        continue;
                    }
                    if self.egress.send(packets).await.is_err() {
                        warn!("egress sink closed, dropping packets");
                    }
                }
                Effect::AddToAdvTable(id) => self.adv_table.insert(id),
                Effect::RemoveFromAdvTable(id) => self.adv_table.remove(&id),
                Effect::AddToBackupTable(id) => self.backup_table.insert(id),
                Effect::RemoveFromBackupTable(id) => self.backup_table.remove(&id),
            }
        }
    }
}

//! Master-down ticker.
//!
//! Walks the Backup groups once per centisecond tick and fires the
//! MasterDown event on every group whose down-timer has elapsed. Kept
//! separate from the advertisement ticker so the two tables never contend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::info;

use crate::effects::EffectCtx;
use crate::registry::{Registry, TimerTable};
use crate::types::{GroupEvent, GroupState};

pub struct MasterDownTimer {
    registry: Arc<Registry>,
    backup_table: Arc<TimerTable>,
    ctx: EffectCtx,
    tick: Duration,
}

impl MasterDownTimer {
    pub fn new(
        registry: Arc<Registry>,
        backup_table: Arc<TimerTable>,
        ctx: EffectCtx,
        tick: Duration,
    ) -> Self {
        Self {
            registry,
            backup_table,
            ctx,
            tick,
        }
    }

    pub async fn run(self, mut stop: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.tick);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick().await,
                _ = stop.recv() => {
                    info!("stop master-down timer loop");
                    return;
                }
            }
        }
    }

    async fn on_tick(&self) {
        let ids = self.backup_table.snapshot();
        if ids.is_empty() {
            return;
        }

        let now = Instant::now();
        for id in ids {
            let Some(group) = self.registry.get(&id).await else {
                self.backup_table.remove(&id);
                continue;
            };
            let mut group = group.lock().await;
            if !group.master_down_expired(now) {
                continue;
            }

            self.backup_table.remove(&id);
            if group.state() == GroupState::Backup {
                info!(group = %id, "master down interval expired");
                let effects = group.apply(GroupEvent::MasterDown);
                self.ctx.run(effects).await;
            }
        }
    }
}

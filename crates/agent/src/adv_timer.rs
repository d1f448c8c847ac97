//! Advertisement interval ticker.
//!
//! Walks the Master groups once per centisecond tick, collects every
//! advertisement that has come due and hands them to the egress sink as a
//! single batch. Priority-zero shutdown advertisements do not pass through
//! here; the state machine emits those eagerly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dataplane::Packet;
use crate::registry::{Registry, TimerTable};

pub struct AdvTimer {
    registry: Arc<Registry>,
    adv_table: Arc<TimerTable>,
    egress: mpsc::Sender<Vec<Packet>>,
    tick: Duration,
}

impl AdvTimer {
    pub fn new(
        registry: Arc<Registry>,
        adv_table: Arc<TimerTable>,
        egress: mpsc::Sender<Vec<Packet>>,
        tick: Duration,
    ) -> Self {
        Self {
            registry,
            adv_table,
            egress,
            tick,
        }
    }

    pub async fn run(self, mut stop: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.tick);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick().await,
                _ = stop.recv() => {
                    info!("stop advertisement timer loop");
                    return;
                }
            }
        }
    }

    async fn on_tick(&self) {
        let ids = self.adv_table.snapshot();
        if ids.is_empty() {
            return;
        }

        let now = Instant::now();
        let mut batch = Vec::new();
        for id in ids {
            let Some(group) = self.registry.get(&id).await else {
                self.adv_table.remove(&id);
                continue;
            };
            let mut group = group.lock().await;
            if let Some(packets) = group.take_due_advertisement(now) {
                batch.extend(packets);
            }
        }

        if !batch.is_empty() && self.egress.send(batch).await.is_err() {
            warn!("egress sink closed, dropping advertisements");
        }
    }
}

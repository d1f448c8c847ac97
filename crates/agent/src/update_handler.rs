//! Update handler.
//!
//! Drains committed configuration snapshots into the registry rebuild. Any
//! rebuild failure is fatal: a partially constructed redundancy set is worse
//! than a restart, so the error propagates out for the supervisor to act on.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use vrrpd_common::Result;

use crate::effects::EffectCtx;
use crate::models::ConfigSnapshot;
use crate::module::Modules;
use crate::registry::Registry;

pub struct UpdateHandler {
    rx: mpsc::Receiver<ConfigSnapshot>,
    registry: Arc<Registry>,
    ctx: EffectCtx,
    modules: Arc<Modules>,
}

impl UpdateHandler {
    pub fn new(
        rx: mpsc::Receiver<ConfigSnapshot>,
        registry: Arc<Registry>,
        ctx: EffectCtx,
        modules: Arc<Modules>,
    ) -> Self {
        Self {
            rx,
            registry,
            ctx,
            modules,
        }
    }

    pub async fn run(mut self, mut stop: mpsc::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                snapshot = self.rx.recv() => match snapshot {
                    Some(snapshot) => {
                        let table = snapshot.subif_table();
                        if let Err(e) = self
                            .registry
                            .update_settings(&table, &self.ctx, &self.modules)
                            .await
                        {
                            error!(error = %e, "update settings failed");
                            return Err(e);
                        }
                    }
                    None => {
                        info!("update queue closed");
                        return Ok(());
                    }
                },
                _ = stop.recv() => {
                    info!("stop update handler loop");
                    return Ok(());
                }
            }
        }
    }
}

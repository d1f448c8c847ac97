//! Agent composition root.
//!
//! Owns the registry, timer tables and worker tasks, and hands out the two
//! externally-driven queues: the ingress queue for the capture collaborator
//! and the update queue for committed configuration snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vrrpd_common::{Error, Result};

use crate::adv_timer::AdvTimer;
use crate::config::Settings;
use crate::dataplane::Dataplane;
use crate::effects::EffectCtx;
use crate::master_down_timer::MasterDownTimer;
use crate::models::ConfigSnapshot;
use crate::module::Modules;
use crate::packet_io::PacketIo;
use crate::recv_handler::{RecvHandler, RecvQueue};
use crate::registry::{Registry, TimerTable};
use crate::update_handler::UpdateHandler;

struct Workers {
    recv_handler: RecvHandler,
    update_handler: UpdateHandler,
    packet_io: PacketIo,
    adv_timer: AdvTimer,
    master_down_timer: MasterDownTimer,
}

/// A fully wired agent core.
pub struct Agent {
    settings: Settings,
    registry: Arc<Registry>,
    modules: Arc<Modules>,
    ingress: RecvQueue,
    updates: mpsc::Sender<ConfigSnapshot>,
    workers: Option<Workers>,
    stop_txs: Vec<mpsc::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
    update_handle: Option<JoinHandle<Result<()>>>,
}

impl Agent {
    /// Wire an agent around a dataplane collaborator. Nothing runs until
    /// [`Agent::start`].
    pub fn new(settings: Settings, dataplane: Arc<dyn Dataplane>) -> Self {
        let registry = Arc::new(Registry::new());
        let adv_table = Arc::new(TimerTable::new());
        let backup_table = Arc::new(TimerTable::new());
        let modules = Arc::new(Modules::new());

        let (egress_tx, egress_rx) = mpsc::channel(settings.channels.egress);
        let (recv_tx, recv_rx) = mpsc::channel(settings.channels.receive);
        let (update_tx, update_rx) = mpsc::channel(settings.channels.update);

        let ctx = EffectCtx {
            dataplane: dataplane.clone(),
            egress: egress_tx.clone(),
            egress_paused: modules.egress_paused(),
            adv_table: adv_table.clone(),
            backup_table: backup_table.clone(),
        };

        let workers = Workers {
            recv_handler: RecvHandler::new(recv_rx, registry.clone(), ctx.clone()),
            update_handler: UpdateHandler::new(
                update_rx,
                registry.clone(),
                ctx.clone(),
                modules.clone(),
            ),
            packet_io: PacketIo::new(egress_rx, dataplane),
            adv_timer: AdvTimer::new(
                registry.clone(),
                adv_table,
                egress_tx,
                settings.timers.tick,
            ),
            master_down_timer: MasterDownTimer::new(
                registry.clone(),
                backup_table,
                ctx,
                settings.timers.tick,
            ),
        };

        let ingress = RecvQueue::new(recv_tx, modules.ingress_paused());

        Self {
            settings,
            registry,
            modules,
            ingress,
            updates: update_tx,
            workers: Some(workers),
            stop_txs: Vec::new(),
            handles: Vec::new(),
            update_handle: None,
        }
    }

    /// Handle for the capture collaborator to push received frames.
    pub fn ingress(&self) -> RecvQueue {
        self.ingress.clone()
    }

    /// Handle for the configuration source to push committed snapshots.
    pub fn updates(&self) -> mpsc::Sender<ConfigSnapshot> {
        self.updates.clone()
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn modules(&self) -> Arc<Modules> {
        self.modules.clone()
    }

    /// Spawn the worker tasks. Errors if called twice.
    pub async fn start(&mut self) -> Result<()> {
        let workers = self
            .workers
            .take()
            .ok_or_else(|| Error::other("agent already started"))?;

        self.modules.mark_started().await?;
        info!("agent starting");

        let mut stop_rx = Vec::new();
        for _ in 0..5 {
            let (tx, rx) = mpsc::channel(1);
            self.stop_txs.push(tx);
            stop_rx.push(rx);
        }

        self.handles
            .push(tokio::spawn(workers.adv_timer.run(stop_rx.remove(0))));
        self.handles
            .push(tokio::spawn(workers.master_down_timer.run(stop_rx.remove(0))));
        self.handles
            .push(tokio::spawn(workers.recv_handler.run(stop_rx.remove(0))));
        self.handles
            .push(tokio::spawn(workers.packet_io.run(stop_rx.remove(0))));
        self.update_handle = Some(tokio::spawn(workers.update_handler.run(stop_rx.remove(0))));

        Ok(())
    }

    /// Wait for the update worker to exit. An `Err` means a fatal update
    /// failure; the supervisor is expected to restart the process.
    pub async fn join(&mut self) -> Result<()> {
        match self.update_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| Error::other(format!("update worker panicked: {e}")))?,
            None => Ok(()),
        }
    }

    /// Stop all workers, aborting any that outlive the shutdown deadline.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("agent shutting down");

        for tx in &self.stop_txs {
            let _ = tx.send(()).await;
        }

        let deadline = self.settings.timers.shutdown_deadline;
        if !self.join_within(deadline).await {
            warn!(?deadline, "clean shutdown stalled, aborting workers");
            for handle in &self.handles {
                handle.abort();
            }
            if let Some(handle) = &self.update_handle {
                handle.abort();
            }
        }

        self.modules.mark_stopped().await;
        info!("agent stopped");
        Ok(())
    }

    async fn join_within(&mut self, deadline: Duration) -> bool {
        let handles = &mut self.handles;
        let update_handle = &mut self.update_handle;

        tokio::time::timeout(deadline, async {
            for handle in handles {
                let _ = handle.await;
            }
            if let Some(handle) = update_handle {
                let _ = handle.await;
            }
        })
        .await
        .is_ok()
    }
}

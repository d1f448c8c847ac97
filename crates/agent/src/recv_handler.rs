//! Receive handler.
//!
//! The capture collaborator pushes batches of raw frames through a bounded
//! queue and returns immediately; a dedicated worker drains the queue into
//! the dispatcher so capture is never coupled to protocol work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dataplane::Packet;
use crate::effects::EffectCtx;
use crate::registry::Registry;

/// Handle given to the ingress collaborator.
#[derive(Clone)]
pub struct RecvQueue {
    tx: mpsc::Sender<Vec<Packet>>,
    paused: Arc<AtomicBool>,
}

impl RecvQueue {
    pub fn new(tx: mpsc::Sender<Vec<Packet>>, paused: Arc<AtomicBool>) -> Self {
        Self { tx, paused }
    }

    /// Enqueue a batch of captured frames. Blocks while the queue is full;
    /// drops the batch while the agent is suspended or shutting down.
    pub async fn push(&self, batch: Vec<Packet>) {
        if self.paused.load(Ordering::SeqCst) {
            debug!(frames = batch.len(), "ingress suspended, dropping batch");
            return;
        }
        if self.tx.send(batch).await.is_err() {
            debug!("receive worker gone, dropping batch");
        }
    }
}

/// Worker that drains the receive queue into the dispatcher.
pub struct RecvHandler {
    rx: mpsc::Receiver<Vec<Packet>>,
    registry: Arc<Registry>,
    ctx: EffectCtx,
}

impl RecvHandler {
    pub fn new(rx: mpsc::Receiver<Vec<Packet>>, registry: Arc<Registry>, ctx: EffectCtx) -> Self {
        Self { rx, registry, ctx }
    }

    pub async fn run(mut self, mut stop: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                batch = self.rx.recv() => match batch {
                    Some(batch) => self.registry.dispatch(batch, &self.ctx).await,
                    None => {
                        info!("receive queue closed");
                        return;
                    }
                },
                _ = stop.recv() => {
                    info!("stop receive handler loop");
                    return;
                }
            }
        }
    }
}

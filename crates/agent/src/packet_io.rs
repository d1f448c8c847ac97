//! Egress worker.
//!
//! Drains the egress queue and hands each batch to the dataplane. Transmit
//! failures are logged and dropped; the state machines have already moved
//! on and peers resolve any resulting flap through normal election.
//!
//! Suspension gates the producers, not this loop: batches that were queued
//! before a suspend (a departing Master's priority-zero advertisement in
//! particular) still reach the wire.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dataplane::{Dataplane, Packet};

pub struct PacketIo {
    rx: mpsc::Receiver<Vec<Packet>>,
    dataplane: Arc<dyn Dataplane>,
}

impl PacketIo {
    pub fn new(rx: mpsc::Receiver<Vec<Packet>>, dataplane: Arc<dyn Dataplane>) -> Self {
        Self { rx, dataplane }
    }

    pub async fn run(mut self, mut stop: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                batch = self.rx.recv() => match batch {
                    Some(batch) => {
                        if let Err(e) = self.dataplane.send_bulk(batch).await {
                            warn!(error = %e, "send_bulk failed");
                        }
                    }
                    None => {
                        info!("egress queue closed");
                        return;
                    }
                },
                _ = stop.recv() => {
                    info!("stop egress loop");
                    return;
                }
            }
        }
    }
}

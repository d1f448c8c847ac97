//! Process-wide lifecycle state.
//!
//! The update handler suspends the agent when no groups remain and resumes
//! it when a snapshot brings groups back. Suspension pauses the ingress and
//! egress paths through shared flags; the worker tasks keep running and
//! simply discard traffic while paused.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use vrrpd_common::{Error, Result};

/// Lifecycle state of the agent as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Initialize,
    Started,
    Suspended,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Initialize => write!(f, "Initialize"),
            ModuleState::Started => write!(f, "Started"),
            ModuleState::Suspended => write!(f, "Suspended"),
        }
    }
}

/// Composition root handle for suspend/resume of the I/O paths.
pub struct Modules {
    state: Mutex<ModuleState>,
    ingress_paused: Arc<AtomicBool>,
    egress_paused: Arc<AtomicBool>,
}

impl Default for Modules {
    fn default() -> Self {
        Self::new()
    }
}

impl Modules {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ModuleState::Initialize),
            ingress_paused: Arc::new(AtomicBool::new(false)),
            egress_paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn state(&self) -> ModuleState {
        *self.state.lock().await
    }

    /// Shared flag the ingress queue consults before accepting a batch.
    pub fn ingress_paused(&self) -> Arc<AtomicBool> {
        self.ingress_paused.clone()
    }

    /// Shared flag the egress worker consults before transmitting a batch.
    pub fn egress_paused(&self) -> Arc<AtomicBool> {
        self.egress_paused.clone()
    }

    /// Transition `Initialize -> Started` when the workers are spawned.
    pub async fn mark_started(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            ModuleState::Initialize => {
                *state = ModuleState::Started;
                Ok(())
            }
            other => Err(Error::other(format!("bad state {other}"))),
        }
    }

    /// Transition `Started -> Suspended`, pausing ingress and egress.
    pub async fn suspend(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            ModuleState::Started => {
                self.ingress_paused.store(true, Ordering::SeqCst);
                self.egress_paused.store(true, Ordering::SeqCst);
                *state = ModuleState::Suspended;
                info!("modules suspended");
                Ok(())
            }
            other => Err(Error::other(format!("bad state {other}"))),
        }
    }

    /// Transition `Suspended -> Started`, unpausing ingress and egress.
    pub async fn resume(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            ModuleState::Suspended => {
                self.ingress_paused.store(false, Ordering::SeqCst);
                self.egress_paused.store(false, Ordering::SeqCst);
                *state = ModuleState::Started;
                info!("modules resumed");
                Ok(())
            }
            other => Err(Error::other(format!("bad state {other}"))),
        }
    }

    /// Transition back to `Initialize` on shutdown.
    pub async fn mark_stopped(&self) {
        let mut state = self.state.lock().await;
        *state = ModuleState::Initialize;
    }
}

//! Core protocol types: states, events and timer units.

use std::fmt;
use std::time::Duration;

/// One centisecond, the unit VRRPv3 uses on the wire.
pub const CENTISECOND: Duration = Duration::from_millis(10);

/// Granularity of the ticker loops.
pub const TICK_INTERVAL: Duration = CENTISECOND;

/// State of a VRRP group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Not participating; timers detached.
    Initialize,
    /// Monitoring the current Master.
    Backup,
    /// Owning the virtual addresses and advertising.
    Master,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupState::Initialize => write!(f, "Initialize"),
            GroupState::Backup => write!(f, "Backup"),
            GroupState::Master => write!(f, "Master"),
        }
    }
}

/// Events driving the group state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEvent {
    Start,
    StartMaster,
    StartBackup,
    MasterDown,
    DetectedNewMaster,
    Preempt,
    Shutdown,
}

impl fmt::Display for GroupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupEvent::Start => write!(f, "Start"),
            GroupEvent::StartMaster => write!(f, "StartMaster"),
            GroupEvent::StartBackup => write!(f, "StartBackup"),
            GroupEvent::MasterDown => write!(f, "MasterDown"),
            GroupEvent::DetectedNewMaster => write!(f, "DetectedNewMaster"),
            GroupEvent::Preempt => write!(f, "Preempt"),
            GroupEvent::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Convert a centisecond count into a [`Duration`].
pub fn centiseconds(count: u16) -> Duration {
    CENTISECOND * u32::from(count)
}

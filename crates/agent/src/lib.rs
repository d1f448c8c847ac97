//! Host-resident VRRPv3 (RFC 5798) agent core for IPv4.
//!
//! For every configured (sub-interface, VRID) pair the agent runs one
//! independent VRRP instance that elects Master/Backup against peers on the
//! same segment and, when local, tells the dataplane collaborator to claim
//! or release the virtual addresses.
//!
//! The core is built from a handful of cooperating pieces:
//!
//! - [`group::Group`]: one state machine per instance, with pre-serialized
//!   advertisement and gratuitous-ARP templates. Transitions return
//!   [`group::Effect`]s executed by the caller.
//! - [`registry::Registry`]: owner of all groups; routes received
//!   advertisements and performs the coarse delete-all/create-all rebuild
//!   on configuration updates.
//! - [`adv_timer::AdvTimer`] / [`master_down_timer::MasterDownTimer`]:
//!   centisecond tickers driving Master egress and Backup timeouts.
//! - [`recv_handler::RecvHandler`] / [`update_handler::UpdateHandler`]:
//!   bounded-queue workers decoupling capture and configuration delivery
//!   from protocol work.
//! - [`agent::Agent`]: the composition root wiring it all together.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vrrpd_agent::{Agent, ConfigSnapshot, Dataplane, Settings};
//!
//! # async fn example(dataplane: Arc<dyn Dataplane>) -> vrrpd_common::Result<()> {
//! let mut agent = Agent::new(Settings::default(), dataplane);
//! agent.start().await?;
//!
//! // The configuration source pushes committed snapshots:
//! let snapshot: ConfigSnapshot = serde_yaml::from_str("interfaces: {}").unwrap();
//! agent.updates().send(snapshot).await.ok();
//!
//! // The capture collaborator pushes received frames through
//! // `agent.ingress()`. Shut down cleanly when done:
//! agent.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod adv_timer;
pub mod agent;
pub mod config;
pub mod dataplane;
pub mod effects;
pub mod group;
pub mod master_down_timer;
pub mod models;
pub mod module;
pub mod packet_io;
pub mod recv_handler;
pub mod registry;
pub mod types;
pub mod update_handler;

pub use agent::Agent;
pub use config::Settings;
pub use dataplane::{Dataplane, MacAddr, Packet};
pub use effects::EffectCtx;
pub use group::{group_id, Effect, Group, GroupId, GroupStats};
pub use models::{ConfigSnapshot, Interface, InterfaceKind, Subinterface, VrrpEntry};
pub use module::{ModuleState, Modules};
pub use registry::{Registry, TimerTable};
pub use types::{centiseconds, GroupEvent, GroupState, CENTISECOND, TICK_INTERVAL};

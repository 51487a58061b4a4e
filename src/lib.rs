//! # mcrouter - command routing proxy for MeshCom mesh networks
//!
//! mcrouter sits between a MeshCom LoRa node and its chat client. It answers `!`
//! commands from the mesh, keeps the local user's own commands from echoing across
//! every proxy on air, and measures round trips to other nodes.
//!
//! ## Features
//!
//! - **Decentralized routing**: every proxy decides on its own, from the frame alone,
//!   whether it is the node that answers a command (`target:CALL` or a positional
//!   callsign selects the node). No coordinator, no shared state between nodes.
//! - **Exactly-once execution**: duplicate mesh deliveries are dropped by message id.
//! - **Rate limiting**: per-command cooldowns plus a temporary block after repeated
//!   failed commands.
//! - **Radio-sized replies**: responses are chunked into at most three 140-byte frames
//!   and paced 12 seconds apart.
//! - **CTC ping**: multi-probe RTT measurement from echo to ACK.
//! - **Topic beacons**: periodic group announcements configured by the admin.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcrouter::config::Config;
//! use mcrouter::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut server = Server::new(config);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`router`] - the inbound/outbound pipeline and its state machines
//! - [`commands`] - command registry, argument parsing and built-in handlers
//! - [`outbound`] - reply chunking and the pacing scheduler
//! - [`ping`] - CTC ping tests
//! - [`topic`] - topic beacons
//! - [`transport`] - MeshCom UDP/JSON adapter
//! - [`server`] - main loop and housekeeping
//! - [`config`] - TOML configuration
//! - [`validation`] - callsign and argument validation

pub mod commands;
pub mod config;
pub mod logutil;
pub mod metrics;
pub mod outbound;
pub mod ping;
pub mod router;
pub mod server;
pub mod topic;
pub mod transport;
pub mod validation;

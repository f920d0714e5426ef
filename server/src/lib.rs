//! # Party Server Library
//!
//! This library provides the authoritative implementation of player groups:
//! parties of up to five and raids of up to forty, with the invitations,
//! leadership, loot rules, ready checks and raid markers that come with them.
//! Every state change is decided here and pushed to the affected players as
//! bit-packed world packets.
//!
//! ## Core Responsibilities
//!
//! ### Group Lifecycle
//! A group starts out *forming* when its first invite is sent, becomes
//! *created* once somebody accepts, and is *disbanded* when its leader
//! leaves, disbands it, or too few members remain. A player belongs to at
//! most one group and holds at most one pending invite at any time.
//!
//! ### Command Validation
//! Each client command is checked against the sender's rights and the
//! group's state before anything changes. Failures the client can display
//! are answered with a result code; everything else is dropped quietly.
//!
//! ### Event Fan-Out
//! Roster updates, ready-check progress, target icons and similar
//! notifications are queued for delivery without ever blocking the command
//! that produced them.
//!
//! ## Architecture Design
//!
//! ### Per-Group Locking
//! Groups live in a concurrent registry, each behind its own async lock.
//! Commands touching different groups run in parallel; commands touching
//! the same group are serialized. A player-to-group index is kept in step
//! with every membership change under the owning group's lock.
//!
//! ### Per-Session Ordering
//! Each logged-in session has a worker task fed through a channel, so one
//! player's commands are applied in the order they arrived.
//!
//! ### UDP-Based Communication
//! Sessions talk to the server over UDP with a small bincode envelope
//! (`Packet` in the `shared` crate). Group traffic travels inside that
//! envelope in the game's own bit-packed format.
//!
//! ## Module Organization
//!
//! - `config`: server and group rule settings
//! - `directory`: player lookups (names, presence, ignore lists, stats)
//! - `dispatcher`: fire-and-forget delivery of server events
//! - `error`: group operation errors and their client result codes
//! - `group`: a single group's state and its mutations
//! - `loot`: loot settings and roll vote collection
//! - `network`: the UDP server loop
//! - `persistence`: the storage seam for membership changes
//! - `ready_check`: the ready-check state machine
//! - `registry`: all groups plus the player-to-group index
//! - `service`: decoding, validating and executing client commands
//! - `session_manager`: logged-in sessions and their addresses
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default()).await?;
//!
//!     // Runs until a Shutdown message arrives:
//!     // - receives logins, heartbeats and world packets
//!     // - hands each session's world packets to its worker
//!     // - delivers queued group events to online players
//!     // - closes silent sessions and expires ready checks
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The group logic can also be driven without any networking:
//!
//! ```rust
//! use server::config::GroupConfig;
//! use server::directory::InMemoryDirectory;
//! use server::dispatcher::Dispatcher;
//! use server::loot::LogResolver;
//! use server::persistence::LogPersistence;
//! use server::registry::GroupRegistry;
//! use server::service::GroupService;
//! use shared::{ClientCommand, ObjectGuid, PlayerProfile, Team};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let directory = Arc::new(InMemoryDirectory::new());
//! let leader = directory.login(PlayerProfile::new("Jaina", Team::Alliance)).unwrap();
//! directory.login(PlayerProfile::new("Anduin", Team::Alliance)).unwrap();
//!
//! let (dispatcher, mut outbound) = Dispatcher::new();
//! let registry = Arc::new(GroupRegistry::new(Arc::new(LogPersistence)));
//! let service = GroupService::new(
//!     registry,
//!     directory.clone(),
//!     dispatcher,
//!     Arc::new(LogResolver),
//!     GroupConfig::default(),
//! );
//!
//! let invite = ClientCommand::Invite {
//!     name: "anduin".to_string(),
//!     realm: String::new(),
//!     cross_realm: ObjectGuid::EMPTY,
//! };
//! service.handle(leader, &invite.encode().unwrap()).await;
//! assert!(outbound.try_recv().is_ok());
//! # });
//! ```

pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod group;
pub mod loot;
pub mod network;
pub mod persistence;
pub mod ready_check;
pub mod registry;
pub mod service;
pub mod session_manager;

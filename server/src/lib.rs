//! # Session Server Library
//!
//! This library provides the authoritative session coordinator for the
//! cooperative platformer. It decides when a session starts, which level every
//! client should be in, and when the group advances to the next level or
//! retries the current one.
//!
//! ## Core Responsibilities
//!
//! ### Roster Management
//! Tracks every live connection and the player bound to it:
//! - Player identity assignment and generated display names
//! - Capacity enforcement against the configured player limit
//! - Player list updates whenever the roster changes
//!
//! ### Session Start
//! Holds the group in the lobby until a quorum of players has spawned, then
//! moves everyone into the first level exactly once.
//!
//! ### Level Flow
//! Collects finish and fail signals for the current level. A single failure
//! reloads the level for the whole group; the group only advances once every
//! live player has finished.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All transport events are funnelled into one loop and handled sequentially
//! by the [`session::Session`]. Session state is never shared between tasks,
//! so handlers need no locking and run to completion before the next event.
//!
//! ### TCP-Based Communication
//! Every connection gets a reader task and a writer task. Packets are framed
//! with a length prefix and encoded with bincode. The stream delivers every
//! scene change reliably and in order, so the server never waits for clients
//! to acknowledge a load.
//!
//! ### Readiness Instead of Scene Ids
//! Finish and fail signals carry no scene id. A connection is marked not ready
//! whenever a scene change is addressed to it and becomes ready again once it
//! reports the new scene as loaded. Signals from connections that are not ready
//! belong to a level the session already left and are dropped.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! Live connections, their readiness and their bound player identities.
//!
//! ### Gate Module (`gate`)
//! Quorum rules and the one-shot start trigger.
//!
//! ### Coordinator Module (`coordinator`)
//! The level sequence and the transition state machine:
//! - Allow-list validation of every transition target
//! - `Idle -> AwaitingLoad -> Loading -> Idle` bookkeeping
//! - Reload of the current level and advance past the last one
//!
//! ### Outcome Module (`outcome`)
//! The per-level outcome set and the finish/fail decision logic.
//!
//! ### Levels Module (`levels`)
//! Remote level list fetched over HTTP with a static fallback.
//!
//! ### Session Module (`session`)
//! Composes the above into packet and connection handlers that return the
//! packets to deliver.
//!
//! ### Network Module (`network`)
//! TCP accept loop, per-connection tasks and the main event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::levels::{resolve_level_sequence, HttpLevelList};
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ServerConfig::default();
//!     config.validate()?;
//!
//!     // Remote list first, the configured sequence if that fails
//!     let remote = HttpLevelList::new("https://maps.example.com");
//!     let levels = resolve_level_sequence(
//!         Some(&remote),
//!         config.level_sequence.clone(),
//!         config.level_fetch_timeout(),
//!     )
//!     .await;
//!
//!     let mut server = Server::new(&config, levels).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod levels;
pub mod network;
pub mod outcome;
pub mod registry;
pub mod session;

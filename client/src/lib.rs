//! # Session Client Library
//!
//! This library provides a headless client for the cooperative session
//! server. It joins a session, follows every scene change the server issues,
//! and sends this player's finish and fail signals.
//!
//! ## Architecture Overview
//!
//! The server decides which scene every player is in. The client never picks
//! a scene on its own; it only mirrors commands and reports back once a scene
//! is loaded.
//!
//! ### Scene Transitions
//! Each scene change runs through the transition agent: input is locked, the
//! screen fades out to opaque, the scene loads, the screen fades back in and
//! input is unlocked. A newer command abandons the current transition and
//! starts over toward the new target.
//!
//! ### Signals
//! A player sends at most one finish or fail signal per loaded scene, and
//! never while input is locked. The server discards signals that belong to
//! a scene it has already moved past.
//!
//! ## Module Organization
//!
//! ### Transition Module (`transition`)
//! The time-stepped transition state machine and its fade alpha.
//!
//! ### Loader Module (`loader`)
//! The `SceneLoader` seam and a simulated loader with a fixed load time.
//!
//! ### Flags Module (`flags`)
//! Flags that survive scene changes, such as collected keys.
//!
//! ### Input Module (`input`)
//! Console command parsing and the input lock.
//!
//! ### Game Module (`game`)
//! The client's mirrored view of the session:
//! - Identity assigned by the server
//! - Player list for display
//! - Scene history and the once-per-scene signal rule
//!
//! ### Network Module (`network`)
//! TCP connection, reader task and the 16 ms frame loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ClientOptions {
//!         name: Some("Alice".to_string()),
//!         auto_finish: Some(Duration::from_secs(2)),
//!         ..ClientOptions::default()
//!     };
//!
//!     let mut client = Client::new("127.0.0.1:7777", options).await?;
//!     client.run().await?;
//!
//!     println!("Visited {:?}", client.session().history);
//!     Ok(())
//! }
//! ```

pub mod flags;
pub mod game;
pub mod input;
pub mod loader;
pub mod network;
pub mod transition;

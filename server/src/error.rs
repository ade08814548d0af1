//! Session-level error taxonomy
//!
//! None of these errors terminate the session. The session handler logs each
//! one at the level its kind implies and carries on with the next event.

use shared::{ConnectionId, PlayerId, SceneId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("connection {conn} already has player {player} bound")]
    DuplicateBinding { conn: ConnectionId, player: PlayerId },

    #[error("scene '{0}' is not eligible for a session transition")]
    InvalidSceneId(SceneId),

    #[error("stale signal from player {player}: {reason}")]
    StaleSignal { player: PlayerId, reason: &'static str },

    #[error("level list provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("roster is full ({0} players)")]
    RosterFull(usize),

    #[error("level sequence is empty")]
    EmptySequence,

    #[error("level sequence already finished")]
    SequenceFinished,

    #[error("client protocol version {client} does not match server version {server}")]
    VersionMismatch { client: u32, server: u32 },
}

impl SessionError {
    /// Errors that are expected under normal network latency and only merit a
    /// debug line.
    pub fn is_expected(&self) -> bool {
        matches!(self, SessionError::StaleSignal { .. })
    }
}

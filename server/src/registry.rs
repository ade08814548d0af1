//! Connection registry for the session server
//!
//! This module owns the session roster, including:
//! - Live transport connections and their scene-readiness flags
//! - The player identity bound to each connection once it spawns
//! - Capacity enforcement against the configured player limit
//!
//! Roster membership only changes through `on_connect`, `on_player_spawned`
//! and `on_disconnect`, so `count()` always agrees with the transport's view
//! of who is connected.

use crate::error::SessionError;
use log::{debug, info};
use rand::Rng;
use shared::{ConnectionId, PlayerId, PlayerList};
use std::collections::HashMap;

/// One participant in the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    /// Stable id, unique for the lifetime of the session
    pub id: PlayerId,
    pub name: String,
    /// Mirrors membership in the current level's outcome set
    pub finished: bool,
}

impl PlayerIdentity {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            finished: false,
        }
    }
}

/// A live transport connection
///
/// A connection exists from transport accept until disconnect. It carries
/// no identity until the client's spawn request has been accepted.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ConnectionId,
    /// True while the client has the session's current scene loaded
    pub ready: bool,
    pub identity: Option<PlayerIdentity>,
}

impl ClientConnection {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            ready: true,
            identity: None,
        }
    }
}

/// Tracks every live connection and the player bound to it
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ClientConnection>,
    next_player_id: PlayerId,
    max_players: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry. Player ids start at 1.
    pub fn new(max_players: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_player_id: 1,
            max_players,
        }
    }

    /// Registers a freshly accepted connection without an identity
    ///
    /// Returns false if the id is already registered. Capacity is not
    /// checked here; it only applies once an identity is bound.
    pub fn on_connect(&mut self, conn: ConnectionId) -> bool {
        if self.connections.contains_key(&conn) {
            return false;
        }

        debug!("Connection {} registered", conn);
        self.connections.insert(conn, ClientConnection::new(conn));
        true
    }

    /// Allocates an identity for a new player
    ///
    /// Missing or blank names are replaced with a generated `Player NNNN`.
    pub fn new_identity(&mut self, name: Option<String>) -> PlayerIdentity {
        let id = self.next_player_id;
        self.next_player_id += 1;

        let name = match name.map(|n| n.trim().to_string()) {
            Some(n) if !n.is_empty() => n,
            _ => format!("Player {}", rand::thread_rng().gen_range(1000..=9999)),
        };

        PlayerIdentity::new(id, name)
    }

    /// Binds an identity to a connection
    pub fn on_player_spawned(
        &mut self,
        conn: ConnectionId,
        identity: PlayerIdentity,
    ) -> Result<&PlayerIdentity, SessionError> {
        if let Some(other) = self.connection_of(identity.id) {
            return Err(SessionError::DuplicateBinding {
                conn: other,
                player: identity.id,
            });
        }

        let count = self.count();
        let connection = self
            .connections
            .get_mut(&conn)
            .ok_or(SessionError::UnknownConnection(conn))?;

        if let Some(bound) = &connection.identity {
            return Err(SessionError::DuplicateBinding {
                conn,
                player: bound.id,
            });
        }

        if count >= self.max_players {
            return Err(SessionError::RosterFull(self.max_players));
        }

        info!(
            "Player {} ('{}') spawned on connection {}",
            identity.id, identity.name, conn
        );
        Ok(connection.identity.insert(identity))
    }

    /// Removes a connection and whatever identity was bound to it
    pub fn on_disconnect(&mut self, conn: ConnectionId) -> Option<ClientConnection> {
        let removed = self.connections.remove(&conn)?;
        match &removed.identity {
            Some(identity) => info!(
                "Player {} ('{}') left from connection {}",
                identity.id, identity.name, conn
            ),
            None => debug!("Connection {} closed before spawning", conn),
        }
        Some(removed)
    }

    /// Number of live connections with a bound identity
    pub fn count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| c.identity.is_some())
            .count()
    }

    /// Number of live connections, bound or not
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.connections.contains_key(&conn)
    }

    pub fn identity(&self, conn: ConnectionId) -> Option<&PlayerIdentity> {
        self.connections.get(&conn)?.identity.as_ref()
    }

    pub fn connection_of(&self, player: PlayerId) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|c| c.identity.as_ref().map(|i| i.id) == Some(player))
            .map(|c| c.id)
    }

    pub fn is_ready(&self, conn: ConnectionId) -> bool {
        self.connections.get(&conn).map_or(false, |c| c.ready)
    }

    /// Updates a connection's readiness. Returns false for unknown connections.
    pub fn set_ready(&mut self, conn: ConnectionId, ready: bool) -> bool {
        match self.connections.get_mut(&conn) {
            Some(connection) => {
                connection.ready = ready;
                true
            }
            None => false,
        }
    }

    /// Collects every ready, bound connection and marks each one not ready
    ///
    /// Used when a scene change goes out: the recipients stay not-ready until
    /// they report the new scene as loaded.
    pub fn take_ready_connections(&mut self) -> Vec<ConnectionId> {
        let mut ready: Vec<ConnectionId> = self
            .connections
            .values_mut()
            .filter(|c| c.ready && c.identity.is_some())
            .map(|c| {
                c.ready = false;
                c.id
            })
            .collect();
        ready.sort_unstable();
        ready
    }

    /// Connection ids that have a bound identity, in ascending order
    pub fn bound_connections(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.identity.is_some())
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn set_finished(&mut self, player: PlayerId, finished: bool) {
        if let Some(identity) = self
            .connections
            .values_mut()
            .filter_map(|c| c.identity.as_mut())
            .find(|i| i.id == player)
        {
            identity.finished = finished;
        }
    }

    pub fn clear_finished(&mut self) {
        for identity in self.connections.values_mut().filter_map(|c| c.identity.as_mut()) {
            identity.finished = false;
        }
    }

    /// Display names of the roster ordered by player id
    pub fn player_list(&self) -> PlayerList {
        let mut players: Vec<&PlayerIdentity> = self
            .connections
            .values()
            .filter_map(|c| c.identity.as_ref())
            .collect();
        players.sort_by_key(|p| p.id);

        PlayerList {
            names: players.into_iter().map(|p| p.name.clone()).collect(),
            max_players: self.max_players,
        }
    }
}

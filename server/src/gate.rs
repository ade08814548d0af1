//! Session gate deciding when the level sequence starts

use crate::registry::ConnectionRegistry;
use log::{debug, info};

/// How many players must be present before the session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quorum {
    /// A fixed player count
    Fixed(usize),
    /// Every live connection must have spawned, and at least `minimum` of them
    AllPlayers { minimum: usize },
}

impl Quorum {
    pub fn from_config(required_players: usize, require_all_players: bool) -> Self {
        if require_all_players {
            Quorum::AllPlayers {
                minimum: required_players,
            }
        } else {
            Quorum::Fixed(required_players)
        }
    }

    /// Player count needed right now
    ///
    /// `AllPlayers` counts connections that have not spawned yet, so they hold the start back.
    pub fn threshold(&self, registry: &ConnectionRegistry) -> usize {
        match *self {
            Quorum::Fixed(required) => required.max(1),
            Quorum::AllPlayers { minimum } => minimum.max(registry.connection_count()).max(1),
        }
    }
}

/// One-shot gate for the initial start of the session
///
/// Later levels are driven by level outcomes, never by the gate.
#[derive(Debug)]
pub struct SessionGate {
    quorum: Quorum,
    fired: bool,
}

impl SessionGate {
    pub fn new(quorum: Quorum) -> Self {
        Self {
            quorum,
            fired: false,
        }
    }

    /// Re-evaluates the gate after a roster change
    ///
    /// Returns true exactly once: the first time the roster reaches quorum
    /// while the session is still at its start.
    pub fn evaluate(&mut self, registry: &ConnectionRegistry, at_start: bool) -> bool {
        if self.fired {
            return false;
        }

        let count = registry.count();
        let threshold = self.quorum.threshold(registry);
        debug!("Session gate: {}/{} players", count, threshold);

        if at_start && count >= threshold {
            info!("Quorum reached with {} players, starting session", count);
            self.fired = true;
            return true;
        }

        false
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn quorum(&self) -> Quorum {
        self.quorum
    }
}

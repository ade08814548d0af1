//! Level outcome tracking
//!
//! Collects finish and fail signals for the level the session is on and
//! decides when to advance or reset. One accepted failure resets the level
//! for everyone; advancing needs a finish from every live player.

use crate::coordinator::{Advance, SceneCoordinator, Transition};
use crate::error::SessionError;
use crate::registry::ConnectionRegistry;
use log::{debug, info};
use shared::{ConnectionId, PlayerId};
use std::collections::HashSet;

/// Players that finished the current level
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutcomeSet {
    finished: HashSet<PlayerId>,
}

impl OutcomeSet {
    /// Returns false if the player was already in the set
    pub fn insert(&mut self, player: PlayerId) -> bool {
        self.finished.insert(player)
    }

    pub fn remove(&mut self, player: PlayerId) -> bool {
        self.finished.remove(&player)
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.finished.contains(&player)
    }

    pub fn len(&self) -> usize {
        self.finished.len()
    }

    pub fn is_empty(&self) -> bool {
        self.finished.is_empty()
    }

    pub fn clear(&mut self) {
        self.finished.clear();
    }

    /// Drops every player that is no longer in the roster
    pub fn prune(&mut self, registry: &ConnectionRegistry) {
        self.finished
            .retain(|player| registry.connection_of(*player).is_some());
    }
}

/// What an accepted signal led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelDecision {
    /// Still waiting on other players
    Pending { finished: usize, required: usize },
    /// Everyone finished; the next level is loading
    Advanced(Transition),
    /// Everyone finished the last level
    Completed,
    /// A player failed; the current level is reloading
    Reset(Transition),
}

#[derive(Debug, Default)]
pub struct LevelOutcomeTracker {
    outcomes: OutcomeSet,
}

impl LevelOutcomeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> &OutcomeSet {
        &self.outcomes
    }

    pub fn outcomes_mut(&mut self) -> &mut OutcomeSet {
        &mut self.outcomes
    }

    /// Records that `player` reached the finish of the current level
    ///
    /// Repeated finishes from the same player within one level count once.
    pub fn on_finish_signal(
        &mut self,
        player: PlayerId,
        registry: &mut ConnectionRegistry,
        coordinator: &mut SceneCoordinator,
    ) -> Result<LevelDecision, SessionError> {
        self.validate(player, registry, coordinator)?;

        if self.outcomes.insert(player) {
            registry.set_finished(player, true);
            info!(
                "Player {} finished '{}' ({}/{})",
                player,
                coordinator.current_scene(),
                self.outcomes.len(),
                registry.count()
            );
        } else {
            debug!("Player {} already finished this level", player);
        }

        self.check_quorum(registry, coordinator)
    }

    /// Resets the current level for everyone after a player failed
    pub fn on_fail_signal(
        &mut self,
        player: PlayerId,
        registry: &mut ConnectionRegistry,
        coordinator: &mut SceneCoordinator,
    ) -> Result<LevelDecision, SessionError> {
        self.validate(player, registry, coordinator)?;

        info!(
            "Player {} failed '{}', resetting level",
            player,
            coordinator.current_scene()
        );
        let transition = coordinator.reset_current(registry, &mut self.outcomes)?;
        Ok(LevelDecision::Reset(transition))
    }

    /// Removes a departed player and advances if everyone left has finished
    ///
    /// Must be called after the player's connection was removed from the
    /// registry.
    pub fn on_player_left(
        &mut self,
        player: PlayerId,
        registry: &mut ConnectionRegistry,
        coordinator: &mut SceneCoordinator,
    ) -> Result<LevelDecision, SessionError> {
        if self.outcomes.remove(player) {
            debug!("Pruned player {} from the outcome set", player);
        }

        if self.outcomes.is_empty() || !coordinator.in_tracked_level() {
            return Ok(LevelDecision::Pending {
                finished: self.outcomes.len(),
                required: registry.count(),
            });
        }

        self.check_quorum(registry, coordinator)
    }

    fn check_quorum(
        &mut self,
        registry: &mut ConnectionRegistry,
        coordinator: &mut SceneCoordinator,
    ) -> Result<LevelDecision, SessionError> {
        self.outcomes.prune(registry);
        let live = registry.count();

        if live == 0 || self.outcomes.len() < live {
            return Ok(LevelDecision::Pending {
                finished: self.outcomes.len(),
                required: live,
            });
        }

        info!("All {} players finished '{}'", live, coordinator.current_scene());
        match coordinator.advance_next(registry, &mut self.outcomes)? {
            Advance::Next(transition) => Ok(LevelDecision::Advanced(transition)),
            Advance::Complete => Ok(LevelDecision::Completed),
        }
    }

    fn validate(
        &self,
        player: PlayerId,
        registry: &ConnectionRegistry,
        coordinator: &SceneCoordinator,
    ) -> Result<ConnectionId, SessionError> {
        let conn = registry
            .connection_of(player)
            .ok_or(SessionError::StaleSignal {
                player,
                reason: "player is not in the roster",
            })?;

        if !coordinator.in_tracked_level() {
            return Err(SessionError::StaleSignal {
                player,
                reason: "session is not on a tracked level",
            });
        }

        if !registry.is_ready(conn) {
            return Err(SessionError::StaleSignal {
                player,
                reason: "player has not loaded the current level",
            });
        }

        Ok(conn)
    }
}

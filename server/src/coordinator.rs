//! Scene transition coordinator
//!
//! The coordinator owns the level sequence and the session's transition
//! state, and it is the only place a scene change is issued from. A change
//! runs `Idle -> AwaitingLoad -> Loading -> Idle`:
//!
//! - `AwaitingLoad`: the target has been validated and the outcome set for
//!   the old scene is discarded.
//! - `Loading`: the command has been addressed to every ready connection and
//!   those connections are marked not ready until they report the new scene.
//! - back to `Idle` once the server side of the load is done. Client loads
//!   are not awaited; the transport delivers the command reliably and each
//!   client reports readiness on its own.

use crate::error::SessionError;
use crate::outcome::OutcomeSet;
use crate::registry::ConnectionRegistry;
use log::{debug, error, info};
use shared::{ConnectionId, SceneChangeCommand, SceneId, SceneOperation, TransitionState};
use std::collections::HashSet;

/// Ordered level scenes and the position of the session within them
///
/// `index == len()` means every level has been completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSequence {
    scenes: Vec<SceneId>,
    index: usize,
}

impl LevelSequence {
    pub fn new(scenes: Vec<SceneId>) -> Self {
        Self { scenes, index: 0 }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn scenes(&self) -> &[SceneId] {
        &self.scenes
    }

    /// Scene at the current index, or None once the sequence is complete
    pub fn current(&self) -> Option<&SceneId> {
        self.scenes.get(self.index)
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.scenes.len()
    }

    fn get(&self, index: usize) -> Option<&SceneId> {
        self.scenes.get(index)
    }
}

/// A scene change ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub command: SceneChangeCommand,
    /// Connections that were ready when the change was issued
    pub recipients: Vec<ConnectionId>,
}

/// Result of moving past the current level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Next(Transition),
    Complete,
}

pub struct SceneCoordinator {
    sequence: LevelSequence,
    allowed: HashSet<SceneId>,
    lobby_scene: SceneId,
    current_scene: SceneId,
    state: TransitionState,
    started: bool,
}

impl SceneCoordinator {
    /// Creates a coordinator sitting in the lobby
    ///
    /// An empty allow-list means every scene in the sequence is allowed. The
    /// lobby scene is never a valid mid-session target.
    pub fn new(sequence: LevelSequence, allowed: Vec<SceneId>, lobby_scene: SceneId) -> Self {
        let mut allowed: HashSet<SceneId> = if allowed.is_empty() {
            sequence.scenes().iter().cloned().collect()
        } else {
            allowed.into_iter().collect()
        };
        allowed.remove(&lobby_scene);

        Self {
            sequence,
            allowed,
            current_scene: lobby_scene.clone(),
            lobby_scene,
            state: TransitionState::Idle,
            started: false,
        }
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.sequence.index()
    }

    pub fn sequence(&self) -> &LevelSequence {
        &self.sequence
    }

    /// Scene the session is in, or loading into
    pub fn current_scene(&self) -> &SceneId {
        &self.current_scene
    }

    pub fn lobby_scene(&self) -> &SceneId {
        &self.lobby_scene
    }

    pub fn is_allowed(&self, scene_id: &str) -> bool {
        self.allowed.contains(scene_id)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// True while the session has not left the lobby
    pub fn is_at_start(&self) -> bool {
        !self.started && self.sequence.index() == 0 && self.state == TransitionState::Idle
    }

    pub fn is_complete(&self) -> bool {
        self.started && self.sequence.is_complete()
    }

    /// True when the session is on a level whose outcomes are being tracked
    pub fn in_tracked_level(&self) -> bool {
        self.started && self.sequence.current() == Some(&self.current_scene)
    }

    /// Moves the whole session into the first level
    pub fn begin_sequence(
        &mut self,
        registry: &mut ConnectionRegistry,
        outcomes: &mut OutcomeSet,
    ) -> Result<Transition, SessionError> {
        let first = match self.sequence.get(0) {
            Some(scene) => scene.clone(),
            None => {
                error!("Level sequence is empty; session stays in the lobby");
                return Err(SessionError::EmptySequence);
            }
        };

        self.sequence.index = 0;
        let transition = self.advance_to(first, SceneOperation::Normal, registry, outcomes)?;
        self.started = true;
        Ok(transition)
    }

    /// Issues a scene change to every ready connection
    ///
    /// Fails without touching any state if `scene_id` is not allowed.
    pub fn advance_to(
        &mut self,
        scene_id: SceneId,
        operation: SceneOperation,
        registry: &mut ConnectionRegistry,
        outcomes: &mut OutcomeSet,
    ) -> Result<Transition, SessionError> {
        if !self.allowed.contains(&scene_id) {
            error!("Refusing transition to '{}': not in the allow-list", scene_id);
            return Err(SessionError::InvalidSceneId(scene_id));
        }

        self.enter(TransitionState::AwaitingLoad);
        outcomes.clear();
        registry.clear_finished();

        let recipients = registry.take_ready_connections();
        let command = SceneChangeCommand::new(scene_id.clone(), operation);
        info!(
            "Changing scene to '{}' ({:?}) for {} connection(s)",
            scene_id,
            operation,
            recipients.len()
        );
        self.current_scene = scene_id;
        self.enter(TransitionState::Loading);

        Ok(Transition {
            command,
            recipients,
        })
    }

    /// Marks the server side of the current load as done
    pub fn finish_loading(&mut self) -> bool {
        if self.state != TransitionState::Loading {
            return false;
        }
        self.enter(TransitionState::Idle);
        true
    }

    /// Reloads the current level without moving the index
    pub fn reset_current(
        &mut self,
        registry: &mut ConnectionRegistry,
        outcomes: &mut OutcomeSet,
    ) -> Result<Transition, SessionError> {
        let scene = self
            .sequence
            .current()
            .cloned()
            .ok_or(SessionError::SequenceFinished)?;
        info!("Resetting level {} ('{}')", self.sequence.index(), scene);
        self.advance_to(scene, SceneOperation::Reload, registry, outcomes)
    }

    /// Moves to the next level, or marks the sequence complete after the last
    pub fn advance_next(
        &mut self,
        registry: &mut ConnectionRegistry,
        outcomes: &mut OutcomeSet,
    ) -> Result<Advance, SessionError> {
        if self.sequence.is_complete() {
            return Err(SessionError::SequenceFinished);
        }

        let next = self.sequence.index() + 1;
        match self.sequence.get(next).cloned() {
            Some(scene) => {
                let transition =
                    self.advance_to(scene, SceneOperation::Normal, registry, outcomes)?;
                self.sequence.index = next;
                Ok(Advance::Next(transition))
            }
            None => {
                self.sequence.index = self.sequence.len();
                outcomes.clear();
                registry.clear_finished();
                info!("All {} levels complete", self.sequence.len());
                Ok(Advance::Complete)
            }
        }
    }

    /// Scene a newly spawned player should be sent to, if the session has
    /// already left the lobby
    pub fn late_join_command(&self) -> Option<SceneChangeCommand> {
        if !self.started {
            return None;
        }
        Some(SceneChangeCommand::new(
            self.current_scene.clone(),
            SceneOperation::Normal,
        ))
    }

    fn enter(&mut self, next: TransitionState) {
        debug!("Transition state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

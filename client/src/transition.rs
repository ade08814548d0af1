//! Client transition agent
//!
//! Mirrors the server's scene changes locally with a strictly sequenced
//! choreography: lock input, fade out to opaque, load, fade back in, unlock.
//! The load never starts before the screen is fully covered, and the fade-in
//! never starts before the load is done.
//!
//! A new command arriving mid-transition abandons the current one and
//! restarts the fade-out toward the new target from wherever the fade
//! currently is. Transitions are never queued.

use crate::loader::SceneLoader;
use log::{debug, info};
use shared::{SceneChangeCommand, SceneId, TransitionState};

/// Things the rest of the client has to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionEvent {
    InputLocked,
    LoadStarted(SceneId),
    /// The scene is loaded; the server should be told
    SceneLoaded(SceneId),
    InputUnlocked,
}

pub struct TransitionAgent {
    state: TransitionState,
    target: Option<SceneChangeCommand>,
    current_scene: Option<SceneId>,
    /// 0.0 is fully visible, 1.0 fully covered
    alpha: f32,
    fade_duration: f32,
    input_locked: bool,
}

impl TransitionAgent {
    /// `fade_duration` is the length of each fade in seconds
    pub fn new(fade_duration: f32) -> Self {
        Self {
            state: TransitionState::Idle,
            target: None,
            current_scene: None,
            alpha: 0.0,
            fade_duration: fade_duration.max(0.0),
            input_locked: false,
        }
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn is_input_locked(&self) -> bool {
        self.input_locked
    }

    pub fn is_busy(&self) -> bool {
        self.state != TransitionState::Idle
    }

    /// Last scene that finished loading
    pub fn current_scene(&self) -> Option<&SceneId> {
        self.current_scene.as_ref()
    }

    pub fn target_scene(&self) -> Option<&SceneId> {
        self.target.as_ref().map(|c| &c.scene_id)
    }

    /// Starts a transition, superseding any transition in progress
    pub fn on_scene_change(
        &mut self,
        command: SceneChangeCommand,
        loader: &mut dyn SceneLoader,
    ) -> Vec<TransitionEvent> {
        let mut events = Vec::new();

        if let Some(previous) = self.target_scene() {
            info!(
                "Transition to '{}' superseded by '{}' during {:?}",
                previous, command.scene_id, self.state
            );
        }
        if self.state == TransitionState::Loading {
            loader.cancel();
        }

        if !self.input_locked {
            self.input_locked = true;
            events.push(TransitionEvent::InputLocked);
        }

        if command.custom_handling {
            self.enter(TransitionState::FadingOut);
        } else {
            // Default handling switches scenes without fading.
            loader.begin_load(&command.scene_id);
            events.push(TransitionEvent::LoadStarted(command.scene_id.clone()));
            self.enter(TransitionState::Loading);
        }
        self.target = Some(command);

        events
    }

    /// Advances the transition by `dt` seconds
    pub fn tick(&mut self, dt: f32, loader: &mut dyn SceneLoader) -> Vec<TransitionEvent> {
        let mut events = Vec::new();

        match self.state {
            TransitionState::Idle | TransitionState::AwaitingLoad => {}

            TransitionState::FadingOut => {
                self.alpha = (self.alpha + self.fade_step(dt)).min(1.0);
                if self.alpha >= 1.0 {
                    match self.target_scene().cloned() {
                        Some(scene) => {
                            loader.begin_load(&scene);
                            self.enter(TransitionState::Loading);
                            events.push(TransitionEvent::LoadStarted(scene));
                        }
                        None => self.finish(&mut events),
                    }
                }
            }

            TransitionState::Loading => {
                if loader.poll_loaded(dt) {
                    let fade_in = self.target.as_ref().map_or(true, |c| c.custom_handling);
                    if let Some(scene) = self.target_scene().cloned() {
                        info!("Scene '{}' loaded", scene);
                        self.current_scene = Some(scene.clone());
                        events.push(TransitionEvent::SceneLoaded(scene));
                    }

                    if fade_in {
                        self.enter(TransitionState::FadingIn);
                    } else {
                        self.finish(&mut events);
                    }
                }
            }

            TransitionState::FadingIn => {
                self.alpha = (self.alpha - self.fade_step(dt)).max(0.0);
                if self.alpha <= 0.0 {
                    self.finish(&mut events);
                }
            }
        }

        events
    }

    fn fade_step(&self, dt: f32) -> f32 {
        if self.fade_duration <= 0.0 {
            1.0
        } else {
            dt / self.fade_duration
        }
    }

    fn finish(&mut self, events: &mut Vec<TransitionEvent>) {
        self.alpha = 0.0;
        self.target = None;
        self.enter(TransitionState::Idle);
        if self.input_locked {
            self.input_locked = false;
            events.push(TransitionEvent::InputUnlocked);
        }
    }

    fn enter(&mut self, next: TransitionState) {
        debug!("Client transition {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SimulatedLoader;
    use assert_approx_eq::assert_approx_eq;
    use shared::SceneOperation;

    fn change(scene: &str) -> SceneChangeCommand {
        SceneChangeCommand::new(scene, SceneOperation::Normal)
    }

    #[test]
    fn test_full_transition_sequence() {
        let mut agent = TransitionAgent::new(0.5);
        let mut loader = SimulatedLoader::new(0.2);

        assert_eq!(
            agent.on_scene_change(change("Level1"), &mut loader),
            vec![TransitionEvent::InputLocked]
        );
        assert_eq!(agent.state(), TransitionState::FadingOut);
        assert!(agent.is_input_locked());

        assert!(agent.tick(0.25, &mut loader).is_empty());
        assert_approx_eq!(agent.alpha(), 0.5);

        assert_eq!(
            agent.tick(0.25, &mut loader),
            vec![TransitionEvent::LoadStarted("Level1".into())]
        );
        assert_approx_eq!(agent.alpha(), 1.0);
        assert_eq!(agent.state(), TransitionState::Loading);

        assert!(agent.tick(0.15, &mut loader).is_empty());
        assert_eq!(
            agent.tick(0.15, &mut loader),
            vec![TransitionEvent::SceneLoaded("Level1".into())]
        );
        assert_eq!(agent.state(), TransitionState::FadingIn);
        assert_eq!(agent.current_scene().map(String::as_str), Some("Level1"));
        assert!(agent.is_input_locked());

        assert!(agent.tick(0.25, &mut loader).is_empty());
        assert_approx_eq!(agent.alpha(), 0.5);
        assert_eq!(
            agent.tick(0.25, &mut loader),
            vec![TransitionEvent::InputUnlocked]
        );
        assert_eq!(agent.state(), TransitionState::Idle);
        assert!(!agent.is_input_locked());
        assert_approx_eq!(agent.alpha(), 0.0);
    }

    #[test]
    fn test_load_waits_for_full_fade_out() {
        let mut agent = TransitionAgent::new(1.0);
        let mut loader = SimulatedLoader::new(0.0);
        agent.on_scene_change(change("Level1"), &mut loader);

        for _ in 0..3 {
            agent.tick(0.3, &mut loader);
            assert!(loader.loading().is_none());
            assert_eq!(agent.state(), TransitionState::FadingOut);
        }
        agent.tick(0.3, &mut loader);
        assert_eq!(loader.loading().map(String::as_str), Some("Level1"));
    }

    #[test]
    fn test_supersede_during_loading_cancels_load() {
        let mut agent = TransitionAgent::new(0.0);
        let mut loader = SimulatedLoader::new(1.0);
        agent.on_scene_change(change("Level1"), &mut loader);
        agent.tick(0.016, &mut loader);
        assert_eq!(agent.state(), TransitionState::Loading);

        let events = agent.on_scene_change(change("Level2"), &mut loader);
        assert!(events.is_empty());
        assert!(loader.loading().is_none());
        assert_eq!(agent.state(), TransitionState::FadingOut);
        assert_eq!(agent.target_scene().map(String::as_str), Some("Level2"));

        assert_eq!(
            agent.tick(0.016, &mut loader),
            vec![TransitionEvent::LoadStarted("Level2".into())]
        );
    }

    #[test]
    fn test_supersede_during_fade_in_restarts_from_current_alpha() {
        let mut agent = TransitionAgent::new(1.0);
        let mut loader = SimulatedLoader::new(0.0);
        agent.on_scene_change(change("Level1"), &mut loader);
        agent.tick(1.0, &mut loader);
        agent.tick(0.0, &mut loader);
        assert_eq!(agent.state(), TransitionState::FadingIn);
        agent.tick(0.25, &mut loader);
        assert_approx_eq!(agent.alpha(), 0.75);

        agent.on_scene_change(change("Level2"), &mut loader);
        assert_eq!(agent.state(), TransitionState::FadingOut);
        assert_approx_eq!(agent.alpha(), 0.75);

        assert_eq!(
            agent.tick(0.25, &mut loader),
            vec![TransitionEvent::LoadStarted("Level2".into())]
        );
    }

    #[test]
    fn test_reload_runs_full_sequence_again() {
        let mut agent = TransitionAgent::new(0.0);
        let mut loader = SimulatedLoader::new(0.0);

        let mut all = agent.on_scene_change(change("Level1"), &mut loader);
        for _ in 0..3 {
            all.extend(agent.tick(0.016, &mut loader));
        }
        assert_eq!(all.last(), Some(&TransitionEvent::InputUnlocked));

        let reload = SceneChangeCommand::new("Level1", SceneOperation::Reload);
        let mut all = agent.on_scene_change(reload, &mut loader);
        for _ in 0..3 {
            all.extend(agent.tick(0.016, &mut loader));
        }
        assert_eq!(
            all,
            vec![
                TransitionEvent::InputLocked,
                TransitionEvent::LoadStarted("Level1".into()),
                TransitionEvent::SceneLoaded("Level1".into()),
                TransitionEvent::InputUnlocked,
            ]
        );
    }

    #[test]
    fn test_default_handling_skips_fades() {
        let mut agent = TransitionAgent::new(1.0);
        let mut loader = SimulatedLoader::new(0.0);
        let command = SceneChangeCommand {
            scene_id: "Level1".into(),
            operation: SceneOperation::Normal,
            custom_handling: false,
        };

        assert_eq!(
            agent.on_scene_change(command, &mut loader),
            vec![
                TransitionEvent::InputLocked,
                TransitionEvent::LoadStarted("Level1".into())
            ]
        );
        assert_eq!(
            agent.tick(0.016, &mut loader),
            vec![
                TransitionEvent::SceneLoaded("Level1".into()),
                TransitionEvent::InputUnlocked
            ]
        );
        assert_approx_eq!(agent.alpha(), 0.0);
    }

    #[test]
    fn test_idle_tick_does_nothing() {
        let mut agent = TransitionAgent::new(0.5);
        let mut loader = SimulatedLoader::new(0.0);
        assert!(agent.tick(1.0, &mut loader).is_empty());
        assert!(!agent.is_busy());
        assert!(agent.current_scene().is_none());
    }
}

//! Scene loading abstraction for the transition agent

use log::debug;
use shared::SceneId;

/// Loads scenes on behalf of the transition agent
///
/// Loading is polled once per frame so that a headless client and a real
/// engine can drive it the same way.
pub trait SceneLoader {
    fn begin_load(&mut self, scene: &SceneId);

    /// Advances the load by `dt` seconds and reports whether it is done
    fn poll_loaded(&mut self, dt: f32) -> bool;

    /// Abandons the load in progress, if any
    fn cancel(&mut self);
}

/// Loader that finishes after a fixed amount of time
pub struct SimulatedLoader {
    load_time: f32,
    elapsed: f32,
    loading: Option<SceneId>,
}

impl SimulatedLoader {
    pub fn new(load_time: f32) -> Self {
        Self {
            load_time: load_time.max(0.0),
            elapsed: 0.0,
            loading: None,
        }
    }

    pub fn loading(&self) -> Option<&SceneId> {
        self.loading.as_ref()
    }
}

impl SceneLoader for SimulatedLoader {
    fn begin_load(&mut self, scene: &SceneId) {
        debug!("Loading scene '{}' ({:.2}s)", scene, self.load_time);
        self.loading = Some(scene.clone());
        self.elapsed = 0.0;
    }

    fn poll_loaded(&mut self, dt: f32) -> bool {
        if self.loading.is_none() {
            return false;
        }

        self.elapsed += dt;
        if self.elapsed >= self.load_time {
            self.loading = None;
            return true;
        }
        false
    }

    fn cancel(&mut self) {
        if let Some(scene) = self.loading.take() {
            debug!("Cancelled load of '{}'", scene);
        }
        self.elapsed = 0.0;
    }
}

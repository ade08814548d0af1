//! Server configuration
//!
//! Loaded from an optional TOML file; command-line flags override individual
//! fields afterwards. Every section falls back to its defaults.

use crate::gate::Quorum;
use log::warn;
use serde::Deserialize;
use shared::{SceneId, DEFAULT_LOBBY_SCENE};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Players needed before the first level starts
    pub required_players: usize,
    /// Also wait for every connected client to spawn
    pub require_all_players: bool,
    pub max_players: usize,
    pub lobby_scene: SceneId,
    /// Used when no remote level list is configured or it cannot be fetched
    pub level_sequence: Vec<SceneId>,
    /// Scenes a mid-session transition may target; empty means the level sequence
    pub allowed_scenes: Vec<SceneId>,
    pub level_source: LevelSourceConfig,
    pub status_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7777".to_string(),
            required_players: 2,
            require_all_players: false,
            max_players: 8,
            lobby_scene: DEFAULT_LOBBY_SCENE.to_string(),
            level_sequence: vec![
                "Map1".to_string(),
                "Map2".to_string(),
                "Map3".to_string(),
                "Map4".to_string(),
            ],
            allowed_scenes: Vec::new(),
            level_source: LevelSourceConfig::default(),
            status_interval_secs: 30,
        }
    }
}

/// Remote level list
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LevelSourceConfig {
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for LevelSourceConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 3000,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Checks limits and strips the lobby from the allow-list
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.max_players == 0 {
            return Err(ConfigError::Invalid("max_players must be at least 1".into()));
        }
        if self.required_players == 0 {
            return Err(ConfigError::Invalid(
                "required_players must be at least 1".into(),
            ));
        }
        if self.required_players > self.max_players {
            return Err(ConfigError::Invalid(format!(
                "required_players ({}) exceeds max_players ({})",
                self.required_players, self.max_players
            )));
        }

        let lobby = self.lobby_scene.clone();
        let before = self.allowed_scenes.len();
        self.allowed_scenes.retain(|scene| *scene != lobby);
        if self.allowed_scenes.len() != before {
            warn!(
                "Lobby scene '{}' removed from allowed_scenes; it cannot be a transition target",
                lobby
            );
        }

        Ok(())
    }

    pub fn quorum(&self) -> Quorum {
        Quorum::from_config(self.required_players, self.require_all_players)
    }

    pub fn level_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.level_source.timeout_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }
}

//! Level list sources
//!
//! The level sequence is resolved once at startup. A remote provider is
//! optional; whenever it is missing, slow, failing or empty, the statically
//! configured list is used instead.

use crate::error::SessionError;
use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use shared::SceneId;
use std::collections::BTreeMap;
use std::time::Duration;

#[async_trait]
pub trait LevelListProvider: Send + Sync {
    async fn fetch_levels(&self) -> Result<Vec<SceneId>, SessionError>;

    /// Human-readable source name for logs
    fn describe(&self) -> String;
}

/// Fixed list known at configuration time
pub struct StaticLevelList {
    levels: Vec<SceneId>,
}

impl StaticLevelList {
    pub fn new(levels: Vec<SceneId>) -> Self {
        Self { levels }
    }
}

#[async_trait]
impl LevelListProvider for StaticLevelList {
    async fn fetch_levels(&self) -> Result<Vec<SceneId>, SessionError> {
        Ok(self.levels.clone())
    }

    fn describe(&self) -> String {
        "static configuration".to_string()
    }
}

/// Map list stored in a realtime-database style JSON tree under `/maps`
///
/// Each child of `maps` carries a `scene` field. Children are ordered by key.
pub struct HttpLevelList {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MapEntry {
    scene: String,
}

impl HttpLevelList {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn maps_url(&self) -> String {
        format!("{}/maps.json", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LevelListProvider for HttpLevelList {
    async fn fetch_levels(&self) -> Result<Vec<SceneId>, SessionError> {
        let unavailable = |e: reqwest::Error| SessionError::ProviderUnavailable(e.to_string());

        let body: serde_json::Value = self
            .client
            .get(self.maps_url())
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        parse_map_list(body)
    }

    fn describe(&self) -> String {
        self.maps_url()
    }
}

/// Extracts scene ids from a `/maps` JSON document
///
/// Accepts an object keyed by map id, an array (which may contain nulls for
/// deleted children), or null for "no maps".
pub fn parse_map_list(body: serde_json::Value) -> Result<Vec<SceneId>, SessionError> {
    let invalid = |e: serde_json::Error| SessionError::ProviderUnavailable(e.to_string());

    match body {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Object(_) => {
            let maps: BTreeMap<String, MapEntry> = serde_json::from_value(body).map_err(invalid)?;
            Ok(maps.into_values().map(|m| m.scene).collect())
        }
        serde_json::Value::Array(_) => {
            let maps: Vec<Option<MapEntry>> = serde_json::from_value(body).map_err(invalid)?;
            Ok(maps.into_iter().flatten().map(|m| m.scene).collect())
        }
        other => Err(SessionError::ProviderUnavailable(format!(
            "unexpected map list document: {}",
            other
        ))),
    }
}

/// Resolves the level sequence, falling back to `fallback` on any failure
pub async fn resolve_level_sequence(
    provider: Option<&dyn LevelListProvider>,
    fallback: Vec<SceneId>,
    timeout: Duration,
) -> Vec<SceneId> {
    let Some(provider) = provider else {
        return fallback;
    };

    let source = provider.describe();
    let result = match tokio::time::timeout(timeout, provider.fetch_levels()).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::ProviderUnavailable(format!(
            "no response within {:?}",
            timeout
        ))),
    };

    match result {
        Ok(levels) if !levels.is_empty() => {
            info!("Loaded {} levels from {}", levels.len(), source);
            levels
        }
        Ok(_) => {
            warn!("No maps found at {}, using static level sequence", source);
            fallback
        }
        Err(e) => {
            warn!("{}; using static level sequence", e);
            fallback
        }
    }
}

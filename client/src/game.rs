use crate::flags::{key_flag, FlagStore};
use log::{debug, info};
use shared::{ConnectionId, Packet, PlayerId, PlayerList, SceneId};

/// The client's view of the session it belongs to
///
/// Everything here is mirrored from the server; the only decisions made
/// locally are when to emit this player's finish or fail signal, at most
/// once per loaded scene.
#[derive(Debug)]
pub struct ClientSession {
    pub client_id: Option<ConnectionId>,
    pub player_id: Option<PlayerId>,
    pub player_name: Option<String>,
    pub players: PlayerList,
    /// Scenes loaded so far, in order
    pub history: Vec<SceneId>,
    pub complete: bool,

    scene: Option<SceneId>,
    signal_sent: bool,
    time_in_scene: f32,
    auto_finish_after: Option<f32>,
}

impl ClientSession {
    /// `auto_finish_after` makes the player finish every level on its own
    /// after that many seconds
    pub fn new(auto_finish_after: Option<f32>) -> Self {
        Self {
            client_id: None,
            player_id: None,
            player_name: None,
            players: PlayerList::default(),
            history: Vec::new(),
            complete: false,
            scene: None,
            signal_sent: false,
            time_in_scene: 0.0,
            auto_finish_after,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.player_id.is_some()
    }

    pub fn apply_connected(&mut self, client_id: ConnectionId, player_id: PlayerId, name: String) {
        info!("Connected as '{}' (player {}, connection {})", name, player_id, client_id);
        self.client_id = Some(client_id);
        self.player_id = Some(player_id);
        self.player_name = Some(name);
    }

    pub fn apply_player_list(&mut self, players: PlayerList) {
        info!("{}: {}", players.status_line(), players.names.join(", "));
        self.players = players;
    }

    pub fn disconnected(&mut self) {
        self.client_id = None;
        self.player_id = None;
    }

    pub fn scene(&self) -> Option<&SceneId> {
        self.scene.as_ref()
    }

    /// True while a level is loaded and still playable
    pub fn in_level(&self) -> bool {
        self.scene.is_some() && !self.complete
    }

    pub fn on_scene_loaded(&mut self, scene: SceneId) {
        self.history.push(scene.clone());
        self.scene = Some(scene);
        self.signal_sent = false;
        self.time_in_scene = 0.0;
    }

    pub fn mark_complete(&mut self) {
        info!("All levels complete after {} scene loads", self.history.len());
        self.complete = true;
    }

    /// Records a collected key; returns false outside a level or if already held
    pub fn collect_key(&self, flags: &mut dyn FlagStore, key_id: &str) -> bool {
        if !self.in_level() {
            debug!("Not in a level, key '{}' ignored", key_id);
            return false;
        }

        let flag = key_flag(key_id);
        if flags.has(&flag) {
            return false;
        }
        flags.set(&flag);
        info!("Collected key '{}'", key_id);
        true
    }

    pub fn finish_packet(&mut self) -> Option<Packet> {
        let player_ref = self.signal_target()?;
        info!("Reached the finish of '{}'", self.scene.as_deref().unwrap_or_default());
        Some(Packet::PlayerFinishLevel { player_ref })
    }

    pub fn fail_packet(&mut self) -> Option<Packet> {
        self.signal_target()?;
        info!("Failed '{}'", self.scene.as_deref().unwrap_or_default());
        Some(Packet::PlayerFail)
    }

    /// Advances local level time; returns the automatic finish when it is due
    pub fn update(&mut self, dt: f32) -> Option<Packet> {
        if !self.in_level() {
            return None;
        }

        self.time_in_scene += dt;
        match self.auto_finish_after {
            Some(after) if self.time_in_scene >= after && !self.signal_sent => self.finish_packet(),
            _ => None,
        }
    }

    pub fn status_line(&self) -> String {
        format!(
            "{} | scene {} | {}",
            self.players.status_line(),
            self.scene.as_deref().unwrap_or("lobby"),
            if self.complete { "complete" } else { "playing" }
        )
    }

    /// Claims this scene's one signal, if a signal may be sent
    fn signal_target(&mut self) -> Option<PlayerId> {
        let player = self.player_id?;
        if !self.in_level() {
            debug!("Not in a level, signal ignored");
            return None;
        }
        if self.signal_sent {
            debug!("Signal already sent for this scene");
            return None;
        }

        self.signal_sent = true;
        Some(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::MemoryFlagStore;

    fn connected(auto_finish: Option<f32>) -> ClientSession {
        let mut session = ClientSession::new(auto_finish);
        session.apply_connected(3, 7, "Alice".to_string());
        session
    }

    #[test]
    fn test_no_signal_in_lobby() {
        let mut session = connected(None);
        assert!(session.finish_packet().is_none());
        assert!(session.fail_packet().is_none());
    }

    #[test]
    fn test_one_signal_per_scene() {
        let mut session = connected(None);
        session.on_scene_loaded("Level1".to_string());

        assert_eq!(
            session.finish_packet(),
            Some(Packet::PlayerFinishLevel { player_ref: 7 })
        );
        assert!(session.finish_packet().is_none());
        assert!(session.fail_packet().is_none());

        // A reload of the same level allows a new signal.
        session.on_scene_loaded("Level1".to_string());
        assert_eq!(session.fail_packet(), Some(Packet::PlayerFail));
        assert_eq!(session.history, vec!["Level1", "Level1"]);
    }

    #[test]
    fn test_auto_finish_fires_once_after_delay() {
        let mut session = connected(Some(0.5));
        session.on_scene_loaded("Level1".to_string());

        assert!(session.update(0.3).is_none());
        assert_eq!(
            session.update(0.3),
            Some(Packet::PlayerFinishLevel { player_ref: 7 })
        );
        assert!(session.update(1.0).is_none());
    }

    #[test]
    fn test_complete_session_stops_signals() {
        let mut session = connected(Some(0.0));
        session.on_scene_loaded("Level1".to_string());
        session.mark_complete();

        assert!(!session.in_level());
        assert!(session.update(1.0).is_none());
        assert!(session.status_line().ends_with("complete"));
    }

    #[test]
    fn test_keys_collected_once_and_kept_across_scenes() {
        let mut flags = MemoryFlagStore::new();
        let mut session = connected(None);
        assert!(!session.collect_key(&mut flags, "red"));

        session.on_scene_loaded("Level1".to_string());
        assert!(session.collect_key(&mut flags, "red"));
        assert!(!session.collect_key(&mut flags, "red"));

        session.on_scene_loaded("Level2".to_string());
        assert!(flags.has(&key_flag("red")));
        assert!(session.collect_key(&mut flags, "blue"));
        assert_eq!(flags.len(), 2);
    }

    #[test]
    fn test_unconnected_client_sends_nothing() {
        let mut session = ClientSession::new(Some(0.0));
        session.on_scene_loaded("Level1".to_string());
        assert!(session.update(1.0).is_none());
    }
}

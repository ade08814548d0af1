//! Session event handling
//!
//! `Session` is the single owner of the roster, the start gate, the scene
//! coordinator and the outcome tracker. The network layer feeds it transport
//! events one at a time and routes whatever it returns; nothing in here does
//! any I/O.

use crate::config::ServerConfig;
use crate::coordinator::{LevelSequence, SceneCoordinator, Transition};
use crate::error::SessionError;
use crate::gate::SessionGate;
use crate::outcome::{LevelDecision, LevelOutcomeTracker};
use crate::registry::ConnectionRegistry;
use log::{debug, error, info, warn};
use shared::{ConnectionId, Packet, SceneId, PROTOCOL_VERSION};

/// A packet the network layer has to deliver
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Send { conn: ConnectionId, packet: Packet },
    /// Every connection with a spawned player
    Broadcast(Packet),
    /// Flush pending packets, then close the connection
    Close { conn: ConnectionId },
}

pub struct Session {
    registry: ConnectionRegistry,
    gate: SessionGate,
    coordinator: SceneCoordinator,
    tracker: LevelOutcomeTracker,
}

impl Session {
    pub fn new(config: &ServerConfig, levels: Vec<SceneId>) -> Self {
        info!(
            "Session created: {} level(s), quorum {:?}, max {} players",
            levels.len(),
            config.quorum(),
            config.max_players
        );

        Self {
            registry: ConnectionRegistry::new(config.max_players),
            gate: SessionGate::new(config.quorum()),
            coordinator: SceneCoordinator::new(
                LevelSequence::new(levels),
                config.allowed_scenes.clone(),
                config.lobby_scene.clone(),
            ),
            tracker: LevelOutcomeTracker::new(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &SceneCoordinator {
        &self.coordinator
    }

    pub fn tracker(&self) -> &LevelOutcomeTracker {
        &self.tracker
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// One-line summary for periodic status logging
    pub fn status_line(&self) -> String {
        let sequence = self.coordinator.sequence();
        let level = if self.coordinator.is_complete() {
            "complete".to_string()
        } else if self.coordinator.is_started() {
            format!("level {}/{}", sequence.index() + 1, sequence.len())
        } else {
            "lobby".to_string()
        };

        format!(
            "{} | {} '{}' | {:?} | finished {}",
            self.registry.player_list().status_line(),
            level,
            self.coordinator.current_scene(),
            self.coordinator.state(),
            self.tracker.outcomes().len()
        )
    }

    /// A transport connection was accepted
    pub fn on_connect(&mut self, conn: ConnectionId) -> Vec<Outbound> {
        if !self.registry.on_connect(conn) {
            warn!("Connection {} registered twice", conn);
        }
        Vec::new()
    }

    /// A transport connection went away, cleanly or not
    pub fn on_disconnect(&mut self, conn: ConnectionId) -> Vec<Outbound> {
        let mut out = Vec::new();
        let Some(removed) = self.registry.on_disconnect(conn) else {
            return out;
        };

        if let Some(identity) = removed.identity {
            let decision =
                self.tracker
                    .on_player_left(identity.id, &mut self.registry, &mut self.coordinator);
            self.apply_decision(decision, &mut out);
            out.push(Outbound::Broadcast(Packet::PlayerList(
                self.registry.player_list(),
            )));
        }

        // An unspawned connection leaving can lower an all-players threshold.
        self.try_start(&mut out);
        out
    }

    pub fn handle_packet(&mut self, conn: ConnectionId, packet: Packet) -> Vec<Outbound> {
        let mut out = Vec::new();

        match packet {
            Packet::Connect {
                client_version,
                player_name,
            } => self.handle_spawn(conn, client_version, player_name, &mut out),

            Packet::PlayerFinishLevel { player_ref } => {
                let Some(player) = self.registry.identity(conn).map(|i| i.id) else {
                    debug!("Finish from unspawned connection {}", conn);
                    return out;
                };
                if player_ref != player {
                    warn!(
                        "Connection {} reported a finish for player {}, but is bound to player {}",
                        conn, player_ref, player
                    );
                    return out;
                }

                let decision =
                    self.tracker
                        .on_finish_signal(player, &mut self.registry, &mut self.coordinator);
                self.apply_decision(decision, &mut out);
            }

            Packet::PlayerFail => {
                let Some(player) = self.registry.identity(conn).map(|i| i.id) else {
                    debug!("Fail from unspawned connection {}", conn);
                    return out;
                };

                let decision =
                    self.tracker
                        .on_fail_signal(player, &mut self.registry, &mut self.coordinator);
                self.apply_decision(decision, &mut out);
            }

            Packet::SceneReady { scene_id } => self.handle_scene_ready(conn, scene_id, &mut out),

            Packet::Disconnect => {
                info!("Connection {} requested disconnect", conn);
                out.extend(self.on_disconnect(conn));
                out.push(Outbound::Close { conn });
            }

            _ => {
                warn!("Unexpected packet type from connection {}", conn);
            }
        }

        out
    }

    fn handle_spawn(
        &mut self,
        conn: ConnectionId,
        client_version: u32,
        player_name: Option<String>,
        out: &mut Vec<Outbound>,
    ) {
        if client_version != PROTOCOL_VERSION {
            Self::report(&SessionError::VersionMismatch {
                client: client_version,
                server: PROTOCOL_VERSION,
            });
            Self::reject(conn, "Protocol version mismatch", out);
            return;
        }

        let was_started = self.coordinator.is_started();
        let identity = self.registry.new_identity(player_name);

        let (player_id, player_name) = match self.registry.on_player_spawned(conn, identity) {
            Ok(identity) => (identity.id, identity.name.clone()),
            Err(e @ SessionError::RosterFull(_)) => {
                Self::report(&e);
                Self::reject(conn, "Server full", out);
                return;
            }
            Err(e) => {
                Self::report(&e);
                return;
            }
        };

        out.push(Outbound::Send {
            conn,
            packet: Packet::Connected {
                client_id: conn,
                player_id,
                player_name,
            },
        });
        out.push(Outbound::Broadcast(Packet::PlayerList(
            self.registry.player_list(),
        )));

        if !was_started {
            self.try_start(out);
            return;
        }

        if self.coordinator.is_complete() {
            out.push(Outbound::Send {
                conn,
                packet: Packet::SequenceComplete,
            });
        } else if let Some(command) = self.coordinator.late_join_command() {
            info!(
                "Player {} joined mid-session, sending to '{}'",
                player_id, command.scene_id
            );
            self.registry.set_ready(conn, false);
            out.push(Outbound::Send {
                conn,
                packet: Packet::SceneChange(command),
            });
        }
    }

    fn handle_scene_ready(&mut self, conn: ConnectionId, scene_id: SceneId, out: &mut Vec<Outbound>) {
        if self.registry.identity(conn).is_none() {
            debug!("Scene report from unspawned connection {}", conn);
            return;
        }

        if scene_id == *self.coordinator.current_scene() {
            debug!("Connection {} loaded '{}'", conn, scene_id);
            self.registry.set_ready(conn, true);
            return;
        }

        // Loaded a scene the session has already moved past.
        match self.coordinator.late_join_command() {
            Some(command) => {
                debug!(
                    "Connection {} loaded stale scene '{}', redirecting to '{}'",
                    conn, scene_id, command.scene_id
                );
                self.registry.set_ready(conn, false);
                out.push(Outbound::Send {
                    conn,
                    packet: Packet::SceneChange(command),
                });
            }
            None => debug!(
                "Connection {} reported '{}' while the session is in the lobby",
                conn, scene_id
            ),
        }
    }

    fn try_start(&mut self, out: &mut Vec<Outbound>) {
        if !self
            .gate
            .evaluate(&self.registry, self.coordinator.is_at_start())
        {
            return;
        }

        match self
            .coordinator
            .begin_sequence(&mut self.registry, self.tracker.outcomes_mut())
        {
            Ok(transition) => self.dispatch(transition, out),
            Err(e) => Self::report(&e),
        }
    }

    fn apply_decision(
        &mut self,
        decision: Result<LevelDecision, SessionError>,
        out: &mut Vec<Outbound>,
    ) {
        match decision {
            Ok(LevelDecision::Pending { finished, required }) => {
                debug!("Level progress: {}/{}", finished, required);
            }
            Ok(LevelDecision::Advanced(transition)) | Ok(LevelDecision::Reset(transition)) => {
                self.dispatch(transition, out);
            }
            Ok(LevelDecision::Completed) => {
                info!("Session complete");
                out.push(Outbound::Broadcast(Packet::SequenceComplete));
            }
            Err(e) => Self::report(&e),
        }
    }

    /// Queues a scene change for its recipients and completes the server-side load
    fn dispatch(&mut self, transition: Transition, out: &mut Vec<Outbound>) {
        let Transition {
            command,
            recipients,
        } = transition;

        for conn in recipients {
            out.push(Outbound::Send {
                conn,
                packet: Packet::SceneChange(command.clone()),
            });
        }
        self.coordinator.finish_loading();
    }

    fn report(e: &SessionError) {
        match e {
            e if e.is_expected() => debug!("{}", e),
            SessionError::InvalidSceneId(_) | SessionError::EmptySequence => error!("{}", e),
            e => warn!("{}", e),
        }
    }

    fn reject(conn: ConnectionId, reason: &str, out: &mut Vec<Outbound>) {
        out.push(Outbound::Send {
            conn,
            packet: Packet::Disconnected {
                reason: reason.to_string(),
            },
        });
        out.push(Outbound::Close { conn });
    }
}

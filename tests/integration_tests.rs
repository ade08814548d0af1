//! Integration tests for the session server and client
//!
//! These tests run the real server on an ephemeral TCP port and drive it with
//! framed raw clients or with the headless client library.

use client::network::{Client, ClientOptions};
use server::config::ServerConfig;
use server::network::{Server, ServerMessage};
use shared::{
    read_packet, write_packet, Packet, PlayerId, SceneChangeCommand, SceneOperation,
    PROTOCOL_VERSION,
};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);
const QUIET_PERIOD: Duration = Duration::from_millis(150);

fn config(required_players: usize, max_players: usize) -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        required_players,
        max_players,
        ..ServerConfig::default()
    }
}

async fn start_server(
    config: ServerConfig,
    levels: &[&str],
) -> (String, mpsc::UnboundedSender<ServerMessage>) {
    let levels = levels.iter().map(|s| s.to_string()).collect();
    let mut server = Server::new(&config, levels).await.unwrap();
    let addr = server.local_addr().to_string();
    let control = server.message_sender();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    (addr, control)
}

/// Raw framed connection standing in for a game client
struct TestClient {
    stream: TcpStream,
    player_id: PlayerId,
}

impl TestClient {
    async fn join(addr: &str, name: &str) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_packet(
            &mut stream,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION,
                player_name: Some(name.to_string()),
            },
        )
        .await
        .unwrap();

        let mut client = TestClient {
            stream,
            player_id: 0,
        };
        match client.next().await {
            Packet::Connected {
                player_id,
                player_name,
                ..
            } => {
                assert_eq!(player_name, name);
                client.player_id = player_id;
            }
            other => panic!("expected Connected, got {:?}", other),
        }
        client
    }

    async fn send(&mut self, packet: Packet) {
        write_packet(&mut self.stream, &packet).await.unwrap();
    }

    async fn recv(&mut self) -> Packet {
        timeout(RECV_TIMEOUT, read_packet(&mut self.stream))
            .await
            .expect("timed out waiting for a packet")
            .unwrap()
    }

    /// Next packet that is not a player list update
    async fn next(&mut self) -> Packet {
        loop {
            match self.recv().await {
                Packet::PlayerList(_) => continue,
                packet => return packet,
            }
        }
    }

    /// Asserts that nothing but player list updates arrive for a short while
    async fn expect_quiet(&mut self) {
        let quiet = timeout(QUIET_PERIOD, async {
            loop {
                match read_packet(&mut self.stream).await {
                    Ok(Packet::PlayerList(_)) => continue,
                    other => return other,
                }
            }
        })
        .await;
        if let Ok(packet) = quiet {
            panic!("expected no packet, got {:?}", packet);
        }
    }

    async fn expect_scene(&mut self) -> SceneChangeCommand {
        match self.next().await {
            Packet::SceneChange(command) => command,
            other => panic!("expected SceneChange, got {:?}", other),
        }
    }

    /// Receives a scene change and reports it loaded
    async fn follow_scene(&mut self) -> SceneChangeCommand {
        let command = self.expect_scene().await;
        self.send(Packet::SceneReady {
            scene_id: command.scene_id.clone(),
        })
        .await;
        command
    }

    async fn finish(&mut self) {
        let player_ref = self.player_id;
        self.send(Packet::PlayerFinishLevel { player_ref }).await;
    }
}

/// Two players past the quorum, both with the first level loaded
async fn started_pair(addr: &str) -> (TestClient, TestClient) {
    let mut a = TestClient::join(addr, "Alice").await;
    let mut b = TestClient::join(addr, "Bob").await;
    a.follow_scene().await;
    b.follow_scene().await;
    (a, b)
}

/// SESSION START TESTS
mod session_start_tests {
    use super::*;

    /// The first level starts exactly when the second player spawns
    #[tokio::test]
    async fn quorum_starts_first_level() {
        let (addr, _control) = start_server(config(2, 8), &["Level1", "Level2"]).await;

        let mut a = TestClient::join(&addr, "Alice").await;
        a.expect_quiet().await;

        let mut b = TestClient::join(&addr, "Bob").await;
        for client in [&mut a, &mut b] {
            let command = client.expect_scene().await;
            assert_eq!(command.scene_id, "Level1");
            assert_eq!(command.operation, SceneOperation::Normal);
            assert!(command.custom_handling);
        }
    }

    /// Every roster change reaches every player as a player list
    #[tokio::test]
    async fn player_list_follows_roster() {
        let (addr, _control) = start_server(config(3, 8), &["Level1"]).await;

        let mut a = TestClient::join(&addr, "Alice").await;
        let _b = TestClient::join(&addr, "Bob").await;

        let mut latest = None;
        while let Ok(Ok(packet)) = timeout(QUIET_PERIOD, read_packet(&mut a.stream)).await {
            if let Packet::PlayerList(list) = packet {
                latest = Some(list);
            }
        }
        let list = latest.expect("no player list received");
        assert_eq!(list.names, vec!["Alice", "Bob"]);
        assert_eq!(list.status_line(), "Players: 2/8");
    }

    /// A player joining after the start is sent to the current level
    #[tokio::test]
    async fn late_joiner_goes_to_current_level() {
        let (addr, _control) = start_server(config(2, 8), &["Level1", "Level2"]).await;
        let (mut a, mut b) = started_pair(&addr).await;
        a.finish().await;
        b.finish().await;
        a.follow_scene().await;
        b.follow_scene().await;

        let mut c = TestClient::join(&addr, "Carol").await;
        let command = c.expect_scene().await;
        assert_eq!(command.scene_id, "Level2");
    }

    /// Players beyond the limit are turned away
    #[tokio::test]
    async fn full_server_rejects_spawn() {
        let (addr, _control) = start_server(config(1, 1), &["Level1"]).await;
        let _a = TestClient::join(&addr, "Alice").await;

        let mut stream = TcpStream::connect(&addr).await.unwrap();
        write_packet(
            &mut stream,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION,
                player_name: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(
            timeout(RECV_TIMEOUT, read_packet(&mut stream))
                .await
                .unwrap()
                .unwrap(),
            Packet::Disconnected {
                reason: "Server full".to_string()
            }
        );
    }

    /// A socket that never sends Connect hears nothing about the roster
    #[tokio::test]
    async fn unspawned_connection_gets_no_broadcasts() {
        let (addr, _control) = start_server(config(2, 4), &["Level1"]).await;

        let mut silent = TcpStream::connect(&addr).await.unwrap();
        tokio::time::sleep(QUIET_PERIOD).await;

        let mut a = TestClient::join(&addr, "Alice").await;
        a.expect_quiet().await;

        let got = timeout(QUIET_PERIOD, read_packet(&mut silent)).await;
        assert!(got.is_err(), "unspawned connection received {:?}", got);
    }
}

/// LEVEL OUTCOME TESTS
mod level_outcome_tests {
    use super::*;

    /// One finish waits, the second advances both players
    #[tokio::test]
    async fn all_finishes_advance_level() {
        let (addr, _control) = start_server(config(2, 8), &["Level1", "Level2"]).await;
        let (mut a, mut b) = started_pair(&addr).await;

        a.finish().await;
        a.expect_quiet().await;

        b.finish().await;
        for client in [&mut a, &mut b] {
            let command = client.expect_scene().await;
            assert_eq!(command.scene_id, "Level2");
            assert_eq!(command.operation, SceneOperation::Normal);
        }
    }

    /// Finishing twice does not count as two players
    #[tokio::test]
    async fn duplicate_finish_counts_once() {
        let (addr, _control) = start_server(config(2, 8), &["Level1", "Level2"]).await;
        let (mut a, mut b) = started_pair(&addr).await;

        a.finish().await;
        a.finish().await;
        a.expect_quiet().await;
        b.expect_quiet().await;
    }

    /// A single failure reloads the level for everyone
    #[tokio::test]
    async fn fail_resets_level() {
        let (addr, _control) = start_server(config(2, 8), &["Level1", "Level2"]).await;
        let (mut a, mut b) = started_pair(&addr).await;
        a.finish().await;
        b.finish().await;
        a.follow_scene().await;
        b.follow_scene().await;

        b.finish().await;
        a.send(Packet::PlayerFail).await;
        for client in [&mut a, &mut b] {
            let command = client.follow_scene().await;
            assert_eq!(command.scene_id, "Level2");
            assert_eq!(command.operation, SceneOperation::Reload);
        }

        // B's earlier finish was wiped by the reload.
        a.finish().await;
        a.expect_quiet().await;
    }

    /// Signals sent before the reload arrives are discarded
    #[tokio::test]
    async fn stale_signal_after_reset_is_ignored() {
        let (addr, _control) = start_server(config(2, 8), &["Level1", "Level2"]).await;
        let (mut a, mut b) = started_pair(&addr).await;

        a.send(Packet::PlayerFail).await;
        // B has not seen the reload yet.
        b.send(Packet::PlayerFail).await;

        assert_eq!(a.expect_scene().await.operation, SceneOperation::Reload);
        assert_eq!(b.expect_scene().await.operation, SceneOperation::Reload);
        a.expect_quiet().await;
        b.expect_quiet().await;
    }

    /// A departed player no longer counts toward the finish quorum
    #[tokio::test]
    async fn disconnect_prunes_outcome_set() {
        let (addr, _control) = start_server(config(2, 8), &["Level1", "Level2"]).await;
        let (mut a, mut b) = started_pair(&addr).await;

        a.finish().await;
        a.send(Packet::Disconnect).await;
        drop(a);
        b.expect_quiet().await;

        b.finish().await;
        assert_eq!(b.expect_scene().await.scene_id, "Level2");
    }

    /// The holdout leaving lets the players who finished move on
    #[tokio::test]
    async fn holdout_leaving_advances_level() {
        let (addr, _control) = start_server(config(2, 8), &["Level1", "Level2"]).await;
        let (mut a, b) = started_pair(&addr).await;

        a.finish().await;
        a.expect_quiet().await;
        drop(b);

        assert_eq!(a.expect_scene().await.scene_id, "Level2");
    }

    /// Finishing the last level ends the sequence for everyone
    #[tokio::test]
    async fn last_level_completes_sequence() {
        let (addr, _control) = start_server(config(2, 8), &["Level1"]).await;
        let (mut a, mut b) = started_pair(&addr).await;

        a.finish().await;
        b.finish().await;
        assert_eq!(a.next().await, Packet::SequenceComplete);
        assert_eq!(b.next().await, Packet::SequenceComplete);
    }
}

/// TRANSPORT TESTS
mod transport_tests {
    use super::*;

    /// A frame that fails to decode is skipped without dropping the connection
    #[tokio::test]
    async fn corrupt_frame_is_skipped() {
        let (addr, _control) = start_server(config(2, 8), &["Level1"]).await;
        let mut stream = TcpStream::connect(&addr).await.unwrap();

        stream.write_u32(4).await.unwrap();
        stream.write_all(&[0xFF, 0xFF, 0xFF, 0xFF]).await.unwrap();

        let body = bincode::serialize(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
            player_name: Some("Alice".to_string()),
        })
        .unwrap();
        stream.write_u32(body.len() as u32).await.unwrap();
        stream.write_all(&body).await.unwrap();

        match timeout(RECV_TIMEOUT, read_packet(&mut stream))
            .await
            .unwrap()
            .unwrap()
        {
            Packet::Connected { player_name, .. } => assert_eq!(player_name, "Alice"),
            other => panic!("expected Connected, got {:?}", other),
        }
    }

    /// An oversized frame closes the connection
    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let (addr, _control) = start_server(config(2, 8), &["Level1"]).await;
        let mut stream = TcpStream::connect(&addr).await.unwrap();

        stream
            .write_u32(shared::MAX_FRAME_SIZE as u32 + 1)
            .await
            .unwrap();

        let result = timeout(RECV_TIMEOUT, read_packet(&mut stream))
            .await
            .unwrap();
        assert!(result.is_err());
    }

    /// Shutdown tells every client before closing
    #[tokio::test]
    async fn shutdown_notifies_clients() {
        let (addr, control) = start_server(config(2, 8), &["Level1"]).await;
        let mut a = TestClient::join(&addr, "Alice").await;

        control.send(ServerMessage::Shutdown).unwrap();
        assert_eq!(
            a.next().await,
            Packet::Disconnected {
                reason: "Server shutting down".to_string()
            }
        );
    }
}

/// HEADLESS CLIENT TESTS
mod client_server_tests {
    use super::*;

    fn auto_options(name: &str) -> ClientOptions {
        ClientOptions {
            name: Some(name.to_string()),
            fade: Duration::from_millis(20),
            load: Duration::from_millis(10),
            auto_finish: Some(Duration::from_millis(30)),
            read_stdin: false,
        }
    }

    /// Two auto-finishing clients play through the whole sequence
    #[tokio::test]
    async fn clients_play_through_sequence() {
        let (addr, _control) = start_server(config(2, 8), &["Level1", "Level2", "Level3"]).await;

        let mut alice = Client::new(&addr, auto_options("Alice")).await.unwrap();
        let mut bob = Client::new(&addr, auto_options("Bob")).await.unwrap();

        let (a, b) = timeout(Duration::from_secs(10), async {
            tokio::join!(alice.run(), bob.run())
        })
        .await
        .expect("session did not complete");
        assert!(a.is_ok());
        assert!(b.is_ok());

        for client in [&alice, &bob] {
            assert!(client.session().complete);
            assert_eq!(
                client.session().history,
                vec!["Level1", "Level2", "Level3"]
            );
        }
        assert_eq!(alice.session().players.max_players, 8);
    }
}

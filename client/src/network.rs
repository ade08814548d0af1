use crate::flags::MemoryFlagStore;
use crate::game::ClientSession;
use crate::input::{Command, InputManager};
use crate::loader::SimulatedLoader;
use crate::transition::{TransitionAgent, TransitionEvent};
use log::{debug, error, info, warn};
use shared::{read_packet, write_packet, FrameError, Packet, PROTOCOL_VERSION};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub name: Option<String>,
    /// Length of each fade
    pub fade: Duration,
    /// Time the simulated loader takes per scene
    pub load: Duration,
    /// Finish every level automatically after this long
    pub auto_finish: Option<Duration>,
    /// Read player commands from stdin
    pub read_stdin: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            name: None,
            fade: Duration::from_millis(500),
            load: Duration::from_millis(300),
            auto_finish: None,
            read_stdin: false,
        }
    }
}

pub struct Client {
    writer: OwnedWriteHalf,
    packet_rx: mpsc::UnboundedReceiver<Packet>,
    name: Option<String>,
    running: bool,

    session: ClientSession,
    agent: TransitionAgent,
    loader: SimulatedLoader,
    input: InputManager,
    flags: MemoryFlagStore,
    read_stdin: bool,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        options: ClientOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        Self::spawn_reader(reader, packet_tx);

        Ok(Client {
            writer,
            packet_rx,
            name: options.name,
            running: true,
            session: ClientSession::new(options.auto_finish.map(|d| d.as_secs_f32())),
            agent: TransitionAgent::new(options.fade.as_secs_f32()),
            loader: SimulatedLoader::new(options.load.as_secs_f32()),
            input: InputManager::new(),
            flags: MemoryFlagStore::new(),
            read_stdin: options.read_stdin,
        })
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Spawns task that forwards frames from the server until the stream ends
    fn spawn_reader(mut reader: OwnedReadHalf, packet_tx: mpsc::UnboundedSender<Packet>) {
        tokio::spawn(async move {
            loop {
                match read_packet(&mut reader).await {
                    Ok(packet) => {
                        if packet_tx.send(packet).is_err() {
                            break;
                        }
                    }
                    Err(FrameError::Codec(e)) => {
                        warn!("Failed to deserialize packet from server: {}", e);
                    }
                    Err(e) if e.is_disconnect() => {
                        debug!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet(&mut self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        write_packet(&mut self.writer, packet).await?;
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<(), Box<dyn std::error::Error>> {
        match packet {
            Packet::Connected {
                client_id,
                player_id,
                player_name,
            } => {
                self.session
                    .apply_connected(client_id, player_id, player_name);
            }

            Packet::SceneChange(command) => {
                info!(
                    "Scene change to '{}' ({:?})",
                    command.scene_id, command.operation
                );
                let events = self.agent.on_scene_change(command, &mut self.loader);
                self.handle_events(events).await?;
            }

            Packet::PlayerList(players) => self.session.apply_player_list(players),

            Packet::SequenceComplete => {
                self.session.mark_complete();
                self.running = false;
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.session.disconnected();
                self.running = false;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }

        Ok(())
    }

    async fn handle_events(
        &mut self,
        events: Vec<TransitionEvent>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for event in events {
            match event {
                TransitionEvent::InputLocked => self.input.lock(),
                TransitionEvent::LoadStarted(scene) => debug!("Loading '{}'", scene),
                TransitionEvent::SceneLoaded(scene) => {
                    self.session.on_scene_loaded(scene.clone());
                    self.send_packet(&Packet::SceneReady { scene_id: scene }).await?;
                }
                TransitionEvent::InputUnlocked => self.input.unlock(),
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), Box<dyn std::error::Error>> {
        let packet = match self.input.filter(command) {
            Some(Command::Finish) => self.session.finish_packet(),
            Some(Command::Fail) => self.session.fail_packet(),
            Some(Command::Collect(key_id)) => {
                self.session.collect_key(&mut self.flags, &key_id);
                None
            }
            Some(Command::Status) => {
                info!("{} | {} keys", self.session.status_line(), self.flags.len());
                None
            }
            Some(Command::Quit) => {
                self.running = false;
                None
            }
            None => None,
        };

        if let Some(packet) = packet {
            self.send_packet(&packet).await?;
        }
        Ok(())
    }

    /// Runs until the sequence completes, the server drops us, or the player quits
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");
        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            player_name: self.name.clone(),
        };
        self.send_packet(&connect).await?;

        let mut frame_interval = interval(FRAME_INTERVAL);
        let mut last_frame = Instant::now();

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = self.read_stdin;
        if stdin_open {
            info!("Commands: f = finish, x = fail, k <id> = collect key, s = status, q = quit");
        }

        while self.running {
            tokio::select! {
                packet = self.packet_rx.recv() => {
                    match packet {
                        Some(packet) => self.handle_packet(packet).await?,
                        None => {
                            warn!("Connection to server lost");
                            self.session.disconnected();
                            break;
                        }
                    }
                },

                _ = frame_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_frame).as_secs_f32();
                    last_frame = now;

                    let events = self.agent.tick(dt, &mut self.loader);
                    self.handle_events(events).await?;

                    if !self.input.is_locked() {
                        if let Some(packet) = self.session.update(dt) {
                            self.send_packet(&packet).await?;
                        }
                    }
                },

                line = stdin.next_line(), if stdin_open => {
                    match line {
                        Ok(Some(line)) => match Command::parse(&line) {
                            Some(command) => self.handle_command(command).await?,
                            None => warn!("Unknown command '{}'", line.trim()),
                        },
                        Ok(None) | Err(_) => stdin_open = false,
                    }
                },
            }
        }

        if self.session.is_connected() {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}

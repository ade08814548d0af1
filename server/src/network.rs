//! Server network layer handling TCP connections and session event dispatch

use crate::config::ServerConfig;
use crate::session::{Outbound, Session};
use log::{debug, error, info, warn};
use shared::{read_packet, write_packet, ConnectionId, FrameError, Packet, SceneId};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    ConnectionOpened {
        conn: ConnectionId,
        addr: SocketAddr,
        writer: mpsc::UnboundedSender<WriterMessage>,
    },
    PacketReceived {
        conn: ConnectionId,
        packet: Packet,
    },
    ConnectionClosed {
        conn: ConnectionId,
    },
    Shutdown,
}

/// Messages sent from the main loop to a connection's writer task
#[derive(Debug)]
pub enum WriterMessage {
    Send(Packet),
    /// Write out everything queued so far, then close the stream
    Close,
}

/// Main server coordinating connections and the session
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    session: Session,
    status_interval: Duration,
    writers: HashMap<ConnectionId, mpsc::UnboundedSender<WriterMessage>>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        config: &ServerConfig,
        levels: Vec<SceneId>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            session: Session::new(config, levels),
            status_interval: config.status_interval(),
            writers: HashMap::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sender for injecting events, e.g. `ServerMessage::Shutdown`
    pub fn message_sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Spawns task that accepts connections and assigns connection ids
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut next_conn: ConnectionId = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let conn = next_conn;
                        next_conn += 1;

                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        let (reader, writer) = stream.into_split();
                        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

                        if let Err(e) = server_tx.send(ServerMessage::ConnectionOpened {
                            conn,
                            addr,
                            writer: writer_tx,
                        }) {
                            error!("Failed to send connection to main loop: {}", e);
                            break;
                        }

                        Self::spawn_reader(conn, reader, server_tx.clone());
                        Self::spawn_writer(conn, writer, writer_rx);
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that reads frames from one connection until it closes
    fn spawn_reader(
        conn: ConnectionId,
        mut reader: OwnedReadHalf,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        tokio::spawn(async move {
            loop {
                match read_packet(&mut reader).await {
                    Ok(packet) => {
                        if server_tx
                            .send(ServerMessage::PacketReceived { conn, packet })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(FrameError::Codec(e)) => {
                        warn!("Failed to deserialize packet from connection {}: {}", conn, e);
                    }
                    Err(e) if e.is_disconnect() => {
                        debug!("Connection {} closed by peer", conn);
                        break;
                    }
                    Err(e) => {
                        warn!("Dropping connection {}: {}", conn, e);
                        break;
                    }
                }
            }

            let _ = server_tx.send(ServerMessage::ConnectionClosed { conn });
        });
    }

    /// Spawns task that drains one connection's outgoing queue
    fn spawn_writer(
        conn: ConnectionId,
        mut writer: OwnedWriteHalf,
        mut writer_rx: mpsc::UnboundedReceiver<WriterMessage>,
    ) {
        tokio::spawn(async move {
            while let Some(message) = writer_rx.recv().await {
                match message {
                    WriterMessage::Send(packet) => {
                        if let Err(e) = write_packet(&mut writer, &packet).await {
                            error!("Failed to send packet to connection {}: {}", conn, e);
                            break;
                        }
                    }
                    WriterMessage::Close => break,
                }
            }

            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown of connection {} failed: {}", conn, e);
            }
        });
    }

    fn send_to(&self, conn: ConnectionId, packet: Packet) {
        match self.writers.get(&conn) {
            Some(writer) => {
                if writer.send(WriterMessage::Send(packet)).is_err() {
                    debug!("Writer for connection {} already gone", conn);
                }
            }
            None => debug!("Dropping packet for closed connection {}", conn),
        }
    }

    /// Delivers session output, including the follow-up events caused by closes
    fn route(&mut self, outbound: Vec<Outbound>) {
        let mut queue: VecDeque<Outbound> = outbound.into();

        while let Some(item) = queue.pop_front() {
            match item {
                Outbound::Send { conn, packet } => self.send_to(conn, packet),
                Outbound::Broadcast(packet) => {
                    for conn in self.session.registry().bound_connections() {
                        self.send_to(conn, packet.clone());
                    }
                }
                Outbound::Close { conn } => {
                    if let Some(writer) = self.writers.remove(&conn) {
                        let _ = writer.send(WriterMessage::Close);
                    }
                    queue.extend(self.session.on_disconnect(conn));
                }
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::ConnectionOpened { conn, addr, writer } => {
                info!("Connection {} opened from {}", conn, addr);
                self.writers.insert(conn, writer);
                let out = self.session.on_connect(conn);
                self.route(out);
            }
            ServerMessage::PacketReceived { conn, packet } => {
                // Reads can still arrive after the server closed the connection.
                if !self.writers.contains_key(&conn) {
                    debug!("Ignoring packet from closed connection {}", conn);
                    return true;
                }
                let out = self.session.handle_packet(conn, packet);
                self.route(out);
            }
            ServerMessage::ConnectionClosed { conn } => {
                if self.writers.remove(&conn).is_some() {
                    info!("Connection {} closed", conn);
                }
                let out = self.session.on_disconnect(conn);
                self.route(out);
            }
            ServerMessage::Shutdown => {
                info!("Server shutting down");
                let out: Vec<Outbound> = self
                    .writers
                    .keys()
                    .flat_map(|&conn| {
                        [
                            Outbound::Send {
                                conn,
                                packet: Packet::Disconnected {
                                    reason: "Server shutting down".to_string(),
                                },
                            },
                            Outbound::Close { conn },
                        ]
                    })
                    .collect();
                self.route(out);
                return false;
            }
        }
        true
    }

    /// Main server loop dispatching network events to the session
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();

        let mut status_interval =
            interval_at(Instant::now() + self.status_interval, self.status_interval);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => {
                            if !self.handle_message(message) {
                                break;
                            }
                        }
                        None => break,
                    }
                },

                _ = status_interval.tick() => {
                    info!("{}", self.session.status_line());
                },
            }
        }

        Ok(())
    }
}

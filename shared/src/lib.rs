use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
pub const DEFAULT_LOBBY_SCENE: &str = "Lobby";

pub type ConnectionId = u32;
pub type PlayerId = u32;
pub type SceneId = String;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
        player_name: Option<String>,
    },
    PlayerFinishLevel {
        player_ref: PlayerId,
    },
    PlayerFail,
    SceneReady {
        scene_id: SceneId,
    },
    Disconnect,

    Connected {
        client_id: ConnectionId,
        player_id: PlayerId,
        player_name: String,
    },
    SceneChange(SceneChangeCommand),
    PlayerList(PlayerList),
    SequenceComplete,
    Disconnected {
        reason: String,
    },
}

/// How the client should treat the scene named in a [`SceneChangeCommand`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SceneOperation {
    /// Load a different scene.
    Normal,
    /// Load the scene the client is already in again from scratch.
    Reload,
}

/// Server-issued instruction to move a client into `scene_id`.
///
/// `custom_handling` tells the client stack to skip the transport's default
/// scene switch and let the transition agent drive fade, load and unlock.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SceneChangeCommand {
    pub scene_id: SceneId,
    pub operation: SceneOperation,
    pub custom_handling: bool,
}

impl SceneChangeCommand {
    pub fn new(scene_id: impl Into<SceneId>, operation: SceneOperation) -> Self {
        Self {
            scene_id: scene_id.into(),
            operation,
            custom_handling: true,
        }
    }
}

/// Display names of everyone in the roster, ordered by player id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct PlayerList {
    pub names: Vec<String>,
    pub max_players: usize,
}

impl PlayerList {
    pub fn status_line(&self) -> String {
        format!("Players: {}/{}", self.names.len(), self.max_players)
    }
}

/// Scene transition phase. Authoritative on the server, mirrored by each client.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionState {
    #[default]
    Idle,
    AwaitingLoad,
    FadingOut,
    Loading,
    FadingIn,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    TooLarge(usize),
}

impl FrameError {
    /// True when the peer closed the stream cleanly between frames.
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Writes one length-prefixed packet (u32 big-endian length, then bincode body).
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let data = bincode::serialize(packet)?;
    if data.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(data.len()));
    }

    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed packet written by [`write_packet`].
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(len));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;
    Ok(bincode::deserialize(&buffer)?)
}

//! Wire protocol between clients and the session authority.
//!
//! Every message is one serde enum value, externally tagged with a
//! snake_case event name, so the JSON form reads like an event plus payload:
//!
//! ```text
//! C→S  {"join":  {"token":"a1b2"}}
//! C→S  {"move":  {"token":"a1b2","player":1,"col":3}}
//! C→S  {"chat":  {"token":"a1b2","name":"ann","message":"gl"}}
//! C→S  {"reset": {"token":"a1b2"}}
//! S→C  {"state_change": {"board":[[0,1,..],..],"player":2,"winner":null}}
//! S→C  {"chat":  {"name":"ann","message":"gl"}}
//! ```
//!
//! Text frames carry JSON; binary frames carry the same values encoded with
//! bincode (standard config). Either side may use either framing.
//!
//! The protocol is state replacement: `state_change` always carries the
//! whole board, the player to move and the winner.

use connect4_core::{PlayerId, Snapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;

/// Largest data frame either side will decode.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Framing of a WebSocket data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Text frame, JSON.
    #[default]
    Json,
    /// Binary frame, bincode.
    Binary,
}

/// One line of a session's chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub name: String,
    pub message: String,
}

impl ChatMessage {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Payload size counted against the chat limit.
    pub fn byte_len(&self) -> usize {
        self.name.len() + self.message.len()
    }
}

/// Client → server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach to a session, creating it if needed.
    Join { token: String },
    /// Drop a stone into zero-based column `col`.
    Move {
        token: String,
        player: PlayerId,
        col: usize,
    },
    Chat {
        token: String,
        name: String,
        message: String,
    },
    Reset { token: String },
    /// Start a session under a freshly generated token and join it.
    Create {},
    Ping,
}

/// Server → client messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    /// Seat assignment, sent first after a join. `None` means spectator.
    Welcome {
        token: String,
        player: Option<PlayerId>,
    },
    /// Full session state; replaces the client's state wholesale.
    StateChange(Snapshot),
    Chat(ChatMessage),
    /// A request from this connection was refused. Never broadcast.
    Rejected { reason: String },
    Pong,
}

impl ClientMessage {
    pub fn join(token: impl Into<String>) -> Self {
        Self::Join { token: token.into() }
    }

    pub fn make_move(token: impl Into<String>, player: PlayerId, col: usize) -> Self {
        Self::Move {
            token: token.into(),
            player,
            col,
        }
    }

    pub fn chat(
        token: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Chat {
            token: token.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn reset(token: impl Into<String>) -> Self {
        Self::Reset { token: token.into() }
    }

    /// Session token the message is addressed to, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Join { token }
            | Self::Move { token, .. }
            | Self::Chat { token, .. }
            | Self::Reset { token } => Some(token),
            Self::Create {} | Self::Ping => None,
        }
    }

    /// Event name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Move { .. } => "move",
            Self::Chat { .. } => "chat",
            Self::Reset { .. } => "reset",
            Self::Create {} => "create",
            Self::Ping => "ping",
        }
    }

    pub fn encode(&self, format: WireFormat) -> Result<Message, ProtocolError> {
        encode_frame(self, format)
    }

    /// Decode a data frame. Control frames yield `Ok(None)`.
    pub fn decode(frame: &Message) -> Result<Option<(Self, WireFormat)>, ProtocolError> {
        decode_frame(frame)
    }
}

impl ServerMessage {
    pub fn rejected(reason: impl ToString) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
        }
    }

    pub fn encode(&self, format: WireFormat) -> Result<Message, ProtocolError> {
        encode_frame(self, format)
    }

    /// Decode a data frame. Control frames yield `Ok(None)`.
    pub fn decode(frame: &Message) -> Result<Option<(Self, WireFormat)>, ProtocolError> {
        decode_frame(frame)
    }
}

fn encode_frame<T: Serialize>(value: &T, format: WireFormat) -> Result<Message, ProtocolError> {
    match format {
        WireFormat::Json => serde_json::to_string(value)
            .map(|text| Message::Text(text.into()))
            .map_err(|e| ProtocolError::Serialization(e.to_string())),
        WireFormat::Binary => bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map(|bytes| Message::Binary(bytes.into()))
            .map_err(|e| ProtocolError::Serialization(e.to_string())),
    }
}

fn decode_frame<T: DeserializeOwned>(
    frame: &Message,
) -> Result<Option<(T, WireFormat)>, ProtocolError> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::Deserialization(format!(
            "frame of {} bytes exceeds {MAX_FRAME_BYTES}",
            frame.len()
        )));
    }
    match frame {
        Message::Text(text) => serde_json::from_str(text.as_str())
            .map(|value| Some((value, WireFormat::Json)))
            .map_err(|e| ProtocolError::Deserialization(e.to_string())),
        Message::Binary(bytes) => {
            // The limit bounds every length prefix before anything is allocated.
            let config = bincode::config::standard().with_limit::<MAX_FRAME_BYTES>();
            let (value, _) = bincode::serde::decode_from_slice(bytes, config)
                .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
            Ok(Some((value, WireFormat::Binary)))
        }
        _ => Ok(None),
    }
}

/// Protocol and transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("connection closed")]
    ConnectionClosed,

    /// The client has not been given a seat it could move for.
    #[error("no player seat assigned")]
    NotSeated,
}

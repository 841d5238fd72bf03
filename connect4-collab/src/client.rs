//! WebSocket game client.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - Seat tracking from the server's `welcome`
//! - A local copy of the latest snapshot and the chat log, replaced or
//!   appended as server messages arrive
//! - An event stream for the application
//!
//! The local view is always current. Events are best effort: when the
//! application does not drain them, new ones are dropped instead of
//! stalling the connection.

use std::sync::Arc;

use connect4_core::{PlayerId, Snapshot};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ChatMessage, ClientMessage, ProtocolError, ServerMessage, WireFormat};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the game client.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Connection established and join sent
    Connected,
    /// Seat assigned; `None` means spectator
    Welcome {
        token: String,
        player: Option<PlayerId>,
    },
    /// The session state was replaced
    StateChanged(Snapshot),
    /// A chat line arrived (history replay included)
    Chat(ChatMessage),
    /// The server refused one of our requests
    Rejected(String),
    Pong,
    /// Connection lost
    Disconnected,
}

/// State shared between the client handle and its reader task.
#[derive(Default)]
struct LocalView {
    token: Option<String>,
    seat: Option<PlayerId>,
    snapshot: Option<Snapshot>,
    chat: Vec<ChatMessage>,
}

impl LocalView {
    fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::Welcome { token, player } => {
                self.token = Some(token.clone());
                self.seat = *player;
                // A new welcome starts a fresh replay.
                self.chat.clear();
            }
            ServerMessage::StateChange(snapshot) => self.snapshot = Some(snapshot.clone()),
            ServerMessage::Chat(line) => self.chat.push(line.clone()),
            ServerMessage::Rejected { .. } | ServerMessage::Pong => {}
        }
    }
}

impl From<ServerMessage> for GameEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Welcome { token, player } => GameEvent::Welcome { token, player },
            ServerMessage::StateChange(snapshot) => GameEvent::StateChanged(snapshot),
            ServerMessage::Chat(line) => GameEvent::Chat(line),
            ServerMessage::Rejected { reason } => GameEvent::Rejected(reason),
            ServerMessage::Pong => GameEvent::Pong,
        }
    }
}

/// Queue an event for the application without ever waiting on it.
fn emit(event_tx: &mpsc::Sender<GameEvent>, event: GameEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) = event_tx.try_send(event) {
        log::trace!("Event queue full, dropped {event:?}");
    }
}

/// The game client.
///
/// Connects to `{server_url}/{token}`, joins the session and keeps a local
/// view of it up to date.
pub struct GameClient {
    server_url: String,
    token: String,
    format: WireFormat,

    state: Arc<RwLock<ConnectionState>>,
    view: Arc<RwLock<LocalView>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Message>>,

    event_rx: Option<mpsc::Receiver<GameEvent>>,
    event_tx: mpsc::Sender<GameEvent>,
}

impl GameClient {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            token: token.into(),
            format: WireFormat::Json,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            view: Arc::new(RwLock::new(LocalView::default())),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Use `format` for every frame this client sends.
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<GameEvent>> {
        self.event_rx.take()
    }

    /// Connect and join the session.
    ///
    /// Spawns background tasks for reading and writing WebSocket messages.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let url = format!("{}/{}", self.server_url, self.token);
        let (ws_stream, _) = match tokio_tungstenite::connect_async(&url).await {
            Ok(connected) => connected,
            Err(e) => {
                log::warn!("Connecting to {url} failed: {e}");
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel, close the socket when
        // the channel is dropped.
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if ws_writer.send(frame).await.is_err() {
                    return;
                }
            }
            let _ = ws_writer.close().await;
        });
        self.outgoing_tx = Some(out_tx);

        self.send(ClientMessage::join(self.token.clone())).await?;

        *self.state.write().await = ConnectionState::Connected;
        emit(&self.event_tx, GameEvent::Connected);

        // Reader task: update the local view first, then notify.
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let view = self.view.clone();
        tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                let frame = match frame {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(frame) => frame,
                };
                match ServerMessage::decode(&frame) {
                    Ok(Some((msg, _))) => {
                        view.write().await.apply(&msg);
                        emit(&event_tx, msg.into());
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("Undecodable server message: {e}"),
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            emit(&event_tx, GameEvent::Disconnected);
        });

        Ok(())
    }

    /// Close the connection. The server keeps the session for a rejoin.
    pub fn disconnect(&mut self) {
        self.outgoing_tx = None;
    }

    /// Send any client message.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), ProtocolError> {
        let frame = msg.encode(self.format)?;
        match &self.outgoing_tx {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Drop a stone for our seat into `col`.
    pub async fn send_move(&self, col: usize) -> Result<(), ProtocolError> {
        let player = self.seat().await.ok_or(ProtocolError::NotSeated)?;
        self.send(ClientMessage::make_move(self.token.clone(), player, col))
            .await
    }

    pub async fn send_chat(
        &self,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        self.send(ClientMessage::chat(self.token.clone(), name, message))
            .await
    }

    pub async fn send_reset(&self) -> Result<(), ProtocolError> {
        self.send(ClientMessage::reset(self.token.clone())).await
    }

    pub async fn send_ping(&self) -> Result<(), ProtocolError> {
        self.send(ClientMessage::Ping).await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Our seat, once the server has welcomed us.
    pub async fn seat(&self) -> Option<PlayerId> {
        self.view.read().await.seat
    }

    /// Latest snapshot received.
    pub async fn snapshot(&self) -> Option<Snapshot> {
        self.view.read().await.snapshot.clone()
    }

    /// Chat log as replayed and received since the last welcome.
    pub async fn chat_log(&self) -> Vec<ChatMessage> {
        self.view.read().await.chat.clone()
    }

    /// Whether our seat is the one to move.
    pub async fn is_my_turn(&self) -> bool {
        let view = self.view.read().await;
        match (&view.snapshot, view.seat) {
            (Some(snapshot), Some(seat)) => {
                !snapshot.is_finished() && snapshot.current_player == seat
            }
            _ => false,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }
}

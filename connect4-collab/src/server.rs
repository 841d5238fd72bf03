//! WebSocket authority server with token-routed game sessions.
//!
//! Architecture:
//! ```text
//! Player 1 ──┐
//!             ├── Session (token) ── GameSession ── BroadcastGroup
//! Player 2 ──┤                          │
//! Spectator ─┘                          │
//!                          ┌────────────┼────────────┐
//!                          ▼            ▼            ▼
//!                      Player 1     Player 2     Spectator
//! ```
//!
//! Every connection runs one task that selects over its socket and its
//! session's broadcast receiver. Requests are validated by the registry;
//! refusals go back to the requesting connection only, accepted changes
//! reach every participant through the broadcast group.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

use crate::broadcast::Outbound;
use crate::protocol::{ClientMessage, ServerMessage, WireFormat};
use crate::registry::{ParticipantId, RegistryConfig, RegistryError, Role, SessionRegistry};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Session registry settings
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            registry: RegistryConfig::default(),
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub rejected_requests: u64,
    pub active_sessions: usize,
}

/// The connection's current session membership.
struct Attachment {
    token: String,
    participant: ParticipantId,
    role: Role,
    receiver: broadcast::Receiver<Outbound>,
    /// Chat lines delivered to this connection, history replay included
    chat_sent: usize,
}

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    stats: Arc<RwLock<ServerStats>>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.registry.clone()));
        Self {
            config,
            registry,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Start listening for WebSocket connections.
    ///
    /// Runs the accept loop and the idle-session sweeper until the task is
    /// dropped or binding fails.
    pub async fn run(&self) -> Result<(), BoxError> {
        self.config.registry.validate()?;

        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Game server listening on {}", self.config.bind_addr);

        let sweeper = self.registry.spawn_sweeper();
        let result = self.accept_loop(listener).await;
        sweeper.abort();
        result
    }

    async fn accept_loop(&self, listener: TcpListener) -> Result<(), BoxError> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let registry = self.registry.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, registry, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<SessionRegistry>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), BoxError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let mut attachment: Option<Attachment> = None;
        let mut format = WireFormat::default();

        let result = async {
            loop {
                tokio::select! {
                    frame = ws_receiver.next() => {
                        match frame {
                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection closed from {addr}");
                                break;
                            }
                            Some(Ok(Message::Ping(data))) => {
                                ws_sender.send(Message::Pong(data)).await?;
                            }
                            Some(Ok(frame)) => {
                                let replies = match ClientMessage::decode(&frame) {
                                    Ok(Some((msg, used))) => {
                                        format = used;
                                        {
                                            let mut s = stats.write().await;
                                            s.total_messages += 1;
                                            s.total_bytes += frame.len() as u64;
                                        }
                                        Self::dispatch(&registry, &mut attachment, msg).await
                                    }
                                    Ok(None) => Vec::new(),
                                    Err(e) => {
                                        log::warn!("Failed to decode message from {addr}: {e}");
                                        vec![ServerMessage::rejected(e)]
                                    }
                                };

                                for reply in replies {
                                    if matches!(reply, ServerMessage::Rejected { .. }) {
                                        stats.write().await.rejected_requests += 1;
                                    }
                                    ws_sender.send(reply.encode(format)?).await?;
                                }
                            }
                            Some(Err(e)) => {
                                log::error!("WebSocket error from {addr}: {e}");
                                break;
                            }
                        }
                    }

                    outbound = Self::next_broadcast(&mut attachment) => {
                        match outbound {
                            Ok(msg) => {
                                if let (ServerMessage::Chat(_), Some(current)) =
                                    (&*msg, attachment.as_mut())
                                {
                                    current.chat_sent += 1;
                                }
                                ws_sender.send(msg.encode(format)?).await?;
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                let replies =
                                    Self::resync(&registry, &mut attachment, skipped).await;
                                for reply in replies {
                                    ws_sender.send(reply.encode(format)?).await?;
                                }
                            }
                            Err(RecvError::Closed) => {
                                attachment = None;
                            }
                        }
                    }
                }
            }
            Ok::<(), BoxError>(())
        }
        .await;

        if let Some(current) = attachment.take() {
            log::debug!("{addr} leaving session {} as {:?}", current.token, current.role);
            Self::detach(&registry, current).await;
        }
        stats.write().await.active_connections -= 1;

        result
    }

    /// Wait for the next broadcast of the attached session, or forever.
    async fn next_broadcast(attachment: &mut Option<Attachment>) -> Result<Outbound, RecvError> {
        match attachment {
            Some(current) => current.receiver.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Replace whatever a lagging receiver skipped: the current state plus
    /// every chat line this connection has not been sent yet.
    async fn resync(
        registry: &SessionRegistry,
        attachment: &mut Option<Attachment>,
        skipped: u64,
    ) -> Vec<ServerMessage> {
        let Some(current) = attachment.as_mut() else {
            return Vec::new();
        };
        let session = match registry.session(&current.token).await {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Cannot resync participant {}: {e}", current.participant);
                return Vec::new();
            }
        };
        session.record_lag(skipped);

        let resync = session.resync(current.chat_sent).await;
        log::warn!(
            "{} lagged by {skipped} in session {}; resending state and {} chat line(s)",
            current.participant,
            current.token,
            resync.chat.len()
        );

        current.receiver = resync.receiver;
        current.chat_sent += resync.chat.len();

        let mut replies = Vec::with_capacity(resync.chat.len() + 1);
        replies.push(ServerMessage::StateChange(resync.snapshot));
        replies.extend(resync.chat.into_iter().map(ServerMessage::Chat));
        replies
    }

    /// Release the connection's seat, keeping the session for a rejoin.
    async fn detach(registry: &SessionRegistry, current: Attachment) {
        if let Err(e) = registry.leave(&current.token, current.participant).await {
            log::warn!(
                "Participant {} could not leave session {}: {e}",
                current.participant,
                current.token
            );
        }
    }

    /// Apply one client request. Returns the replies for this connection only.
    async fn dispatch(
        registry: &SessionRegistry,
        attachment: &mut Option<Attachment>,
        msg: ClientMessage,
    ) -> Vec<ServerMessage> {
        let result = match msg {
            ClientMessage::Join { token } => Self::attach(registry, attachment, &token).await,
            ClientMessage::Create {} => match registry.create_session().await {
                Ok(token) => Self::attach(registry, attachment, &token).await,
                Err(e) => Err(e),
            },
            ClientMessage::Move { token, player, col } => {
                match Self::attached(attachment, &token) {
                    Ok(participant) => registry
                        .apply_move(&token, participant, player, col)
                        .await
                        .map(|_| Vec::new()),
                    Err(e) => Err(e),
                }
            }
            ClientMessage::Chat {
                token,
                name,
                message,
            } => match Self::attached(attachment, &token) {
                Ok(_) => registry
                    .chat(&token, name, message)
                    .await
                    .map(|_| Vec::new()),
                Err(e) => Err(e),
            },
            ClientMessage::Reset { token } => match Self::attached(attachment, &token) {
                Ok(_) => registry.reset(&token).await.map(|_| Vec::new()),
                Err(e) => Err(e),
            },
            ClientMessage::Ping => Ok(vec![ServerMessage::Pong]),
        };

        result.unwrap_or_else(|e| {
            match &e {
                RegistryError::SessionsExhausted(_) | RegistryError::Board(_) => {
                    log::error!("Request refused: {e}");
                }
                _ => log::warn!("Request refused: {e}"),
            }
            vec![ServerMessage::rejected(e.public_reason())]
        })
    }

    /// Join `token`, leaving any session this connection was in before.
    async fn attach(
        registry: &SessionRegistry,
        attachment: &mut Option<Attachment>,
        token: &str,
    ) -> Result<Vec<ServerMessage>, RegistryError> {
        if let Some(previous) = attachment.take() {
            Self::detach(registry, previous).await;
        }

        let outcome = registry.join(token).await?;

        let chat_sent = outcome.chat.len();
        let mut replies = Vec::with_capacity(chat_sent + 2);
        replies.push(ServerMessage::Welcome {
            token: outcome.token.clone(),
            player: outcome.role.player(),
        });
        replies.push(ServerMessage::StateChange(outcome.snapshot));
        replies.extend(outcome.chat.into_iter().map(ServerMessage::Chat));

        *attachment = Some(Attachment {
            token: outcome.token,
            participant: outcome.participant,
            role: outcome.role,
            receiver: outcome.receiver,
            chat_sent,
        });
        Ok(replies)
    }

    /// The participant id if this connection is attached to `token`.
    fn attached(
        attachment: &Option<Attachment>,
        token: &str,
    ) -> Result<ParticipantId, RegistryError> {
        match attachment {
            Some(current) if current.token == token => Ok(current.participant),
            _ => Err(RegistryError::UnknownToken(token.to_string())),
        }
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        let mut stats = self.stats.read().await.clone();
        stats.active_sessions = self.registry.session_count().await;
        stats
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

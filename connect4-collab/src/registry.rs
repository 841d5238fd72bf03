//! Session registry: token → game session, chat log and participants.
//!
//! ```text
//!  SessionRegistry
//!   └─ RwLock<HashMap<token, Arc<Session>>>      create / evict / lookup
//!        └─ Session
//!             ├─ Mutex<SessionState>             one writer at a time
//!             │    ├─ GameSession                board, turn, winner
//!             │    ├─ chat log                   append-only
//!             │    └─ participants → Role        seats + spectators
//!             └─ BroadcastGroup                  fan-out to participants
//! ```
//!
//! Lock order is always registry map, then session state. Every accepted
//! mutation is broadcast while the session lock is still held, so all
//! participants observe state changes in the order they were applied. A
//! joiner subscribes under the same lock it reads the snapshot with, so it
//! neither misses nor double-receives a `state_change`.
//!
//! Sessions outlive disconnects so players can come back; an idle sweep
//! drops sessions that have had no participants for `idle_timeout`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use connect4_core::{
    BoardError, GameSession, MoveError, PlayerId, ResetError, Snapshot, DEFAULT_COLS,
    DEFAULT_ROWS,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broadcast::{BroadcastGroup, BroadcastStats, Outbound};
use crate::protocol::{ChatMessage, ServerMessage};

/// Identity of one attached connection.
pub type ParticipantId = Uuid;

/// What a participant may do in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Player(PlayerId),
    /// Watches and chats; cannot move.
    Spectator,
}

impl Role {
    pub fn player(self) -> Option<PlayerId> {
        match self {
            Role::Player(player) => Some(player),
            Role::Spectator => None,
        }
    }
}

/// Registry settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Board rows for new sessions
    pub rows: usize,
    /// Board columns for new sessions
    pub cols: usize,
    /// Broadcast buffer per participant
    pub broadcast_capacity: usize,
    /// How long a session with no participants survives
    pub idle_timeout: Duration,
    /// Period of the idle sweep
    pub sweep_interval: Duration,
    /// Hard cap on live sessions
    pub max_sessions: usize,
    /// Cap on `name + message` bytes per chat line
    pub max_chat_bytes: usize,
    /// Create unknown tokens on join (otherwise `UnknownToken`)
    pub create_on_join: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            broadcast_capacity: 64,
            idle_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
            max_sessions: 10_000,
            max_chat_bytes: 2048,
            create_on_join: true,
        }
    }
}

impl RegistryConfig {
    /// Check the board dimensions new sessions will use.
    pub fn validate(&self) -> Result<(), BoardError> {
        GameSession::new(self.rows, self.cols).map(|_| ())
    }
}

/// Request-level registry failures. None of them change session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown session token: {0}")]
    UnknownToken(String),

    #[error("chat message exceeds {limit} bytes")]
    InvalidChat { limit: usize },

    #[error("spectators cannot move")]
    SpectatorMove,

    #[error("participant {0} is not attached to this session")]
    ParticipantNotFound(ParticipantId),

    /// Operator-facing: the deployment is out of session slots.
    #[error("session limit of {0} reached")]
    SessionsExhausted(usize),

    #[error("invalid board configuration: {0}")]
    Board(#[from] BoardError),

    #[error(transparent)]
    Move(#[from] MoveError),

    #[error(transparent)]
    Reset(#[from] ResetError),
}

impl RegistryError {
    /// Text safe to show the requesting player.
    pub fn public_reason(&self) -> String {
        match self {
            RegistryError::SessionsExhausted(_) | RegistryError::Board(_) => {
                "server cannot open a new game right now".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result of a join: everything a client needs to be synchronized.
#[derive(Debug)]
pub struct JoinOutcome {
    pub token: String,
    pub participant: ParticipantId,
    pub role: Role,
    pub snapshot: Snapshot,
    /// Full chat log in append order
    pub chat: Vec<ChatMessage>,
    /// Broadcasts from the moment of joining on
    pub receiver: broadcast::Receiver<Outbound>,
}

/// Fresh state for a participant whose receiver fell behind.
#[derive(Debug)]
pub struct Resync {
    pub snapshot: Snapshot,
    /// Chat lines from the requested offset on
    pub chat: Vec<ChatMessage>,
    /// Replaces the lagging receiver
    pub receiver: broadcast::Receiver<Outbound>,
}

struct SessionState {
    game: GameSession,
    chat: Vec<ChatMessage>,
    participants: HashMap<ParticipantId, Role>,
    last_activity: Instant,
}

impl SessionState {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Lowest seat nobody attached holds, else spectator.
    fn free_seat(&self) -> Role {
        [PlayerId::Player1, PlayerId::Player2]
            .into_iter()
            .map(Role::Player)
            .find(|seat| !self.participants.values().any(|role| role == seat))
            .unwrap_or(Role::Spectator)
    }

    fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        self.participants.is_empty()
            && now.saturating_duration_since(self.last_activity) >= idle_timeout
    }
}

/// One game session with its participants and broadcast group.
pub struct Session {
    token: String,
    state: Mutex<SessionState>,
    broadcast: BroadcastGroup,
}

impl Session {
    fn new(token: String, game: GameSession, broadcast_capacity: usize) -> Self {
        Self {
            token,
            state: Mutex::new(SessionState {
                game,
                chat: Vec::new(),
                participants: HashMap::new(),
                last_activity: Instant::now(),
            }),
            broadcast: BroadcastGroup::new(broadcast_capacity),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.game.snapshot()
    }

    pub async fn participant_count(&self) -> usize {
        self.state.lock().await.participants.len()
    }

    pub fn broadcast_stats(&self) -> BroadcastStats {
        self.broadcast.stats()
    }

    /// Count messages a lagging receiver of this session skipped.
    pub fn record_lag(&self, skipped: u64) {
        self.broadcast.record_lag(skipped);
    }

    /// Resubscribe and read the state plus chat from `chat_from` under one
    /// lock, so nothing after the read is missed or repeated.
    pub async fn resync(&self, chat_from: usize) -> Resync {
        let state = self.state.lock().await;
        let start = chat_from.min(state.chat.len());
        Resync {
            snapshot: state.game.snapshot(),
            chat: state.chat[start..].to_vec(),
            receiver: self.broadcast.subscribe(),
        }
    }

    async fn attach(&self) -> JoinOutcome {
        let mut state = self.state.lock().await;
        let role = state.free_seat();
        let participant = Uuid::new_v4();
        state.participants.insert(participant, role);
        state.touch();

        log::info!(
            "Participant {participant} joined session {} as {role:?} ({} attached)",
            self.token,
            state.participants.len()
        );

        JoinOutcome {
            token: self.token.clone(),
            participant,
            role,
            snapshot: state.game.snapshot(),
            chat: state.chat.clone(),
            receiver: self.broadcast.subscribe(),
        }
    }
}

/// Owner of every live session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RegistryConfig::default())
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Attach a new participant to `token`, creating the session if allowed.
    ///
    /// Seats go to the lowest free player slot; everyone else spectates.
    pub async fn join(&self, token: &str) -> Result<JoinOutcome, RegistryError> {
        // Fast path: read lock. Held while attaching so a concurrent sweep
        // cannot evict the session in between.
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(token) {
                return Ok(session.attach().await);
            }
        }

        if !self.config.create_on_join {
            log::warn!("Join for unknown session {token} refused");
            return Err(RegistryError::UnknownToken(token.to_string()));
        }

        // Slow path: write lock, double-check, create.
        let mut sessions = self.sessions.write().await;
        let session = match sessions.get(token) {
            Some(session) => session.clone(),
            None => self.insert_session(&mut sessions, token.to_string())?,
        };
        Ok(session.attach().await)
    }

    /// Open an empty session under a fresh random token.
    pub async fn create_session(&self) -> Result<String, RegistryError> {
        let mut sessions = self.sessions.write().await;
        let mut token = generate_token();
        while sessions.contains_key(&token) {
            token = generate_token();
        }
        self.insert_session(&mut sessions, token.clone())?;
        Ok(token)
    }

    fn insert_session(
        &self,
        sessions: &mut HashMap<String, Arc<Session>>,
        token: String,
    ) -> Result<Arc<Session>, RegistryError> {
        if sessions.len() >= self.config.max_sessions {
            log::error!(
                "Session limit reached ({} live); refusing to create {token}",
                sessions.len()
            );
            return Err(RegistryError::SessionsExhausted(self.config.max_sessions));
        }

        let game = GameSession::new(self.config.rows, self.config.cols)?;
        let session = Arc::new(Session::new(
            token.clone(),
            game,
            self.config.broadcast_capacity,
        ));
        sessions.insert(token.clone(), session.clone());
        log::info!("Session {token} created ({} live)", sessions.len());
        Ok(session)
    }

    /// Detach a participant. The session and its chat stay for reconnection.
    pub async fn leave(
        &self,
        token: &str,
        participant: ParticipantId,
    ) -> Result<Role, RegistryError> {
        let session = self.session(token).await?;
        let mut state = session.state.lock().await;
        let role = state
            .participants
            .remove(&participant)
            .ok_or(RegistryError::ParticipantNotFound(participant))?;
        state.touch();
        log::info!(
            "Participant {participant} ({role:?}) left session {token} ({} attached)",
            state.participants.len()
        );
        Ok(role)
    }

    /// Validate and apply a move from `participant` claiming seat `player`.
    ///
    /// On success the new snapshot has already been broadcast to the
    /// session. On failure nothing changes and nothing is broadcast.
    pub async fn apply_move(
        &self,
        token: &str,
        participant: ParticipantId,
        player: PlayerId,
        col: usize,
    ) -> Result<Snapshot, RegistryError> {
        let session = self.session(token).await?;
        let mut state = session.state.lock().await;

        match state.participants.get(&participant) {
            None => return Err(RegistryError::ParticipantNotFound(participant)),
            Some(Role::Spectator) => return Err(RegistryError::SpectatorMove),
            Some(Role::Player(seat)) if *seat != player => {
                return Err(MoveError::NotYourTurn.into());
            }
            Some(Role::Player(_)) => {}
        }

        state.touch();
        let snapshot = state.game.apply_move(player, col)?;
        session
            .broadcast
            .broadcast(ServerMessage::StateChange(snapshot.clone()));

        log::debug!("Session {token}: {player} played column {col}");
        if let Some(win) = &snapshot.winner {
            log::info!(
                "Session {token} finished: {} won {}",
                win.player,
                win.direction.name()
            );
        }
        Ok(snapshot)
    }

    /// Append a chat line and broadcast it.
    pub async fn chat(
        &self,
        token: &str,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<ChatMessage, RegistryError> {
        let line = ChatMessage::new(name, message);
        if line.byte_len() > self.config.max_chat_bytes {
            return Err(RegistryError::InvalidChat {
                limit: self.config.max_chat_bytes,
            });
        }

        let session = self.session(token).await?;
        let mut state = session.state.lock().await;
        state.touch();
        state.chat.push(line.clone());
        session.broadcast.broadcast(ServerMessage::Chat(line.clone()));
        log::debug!("Session {token}: chat from {}", line.name);
        Ok(line)
    }

    /// Reset a finished (or drawn) game and broadcast the empty board.
    pub async fn reset(&self, token: &str) -> Result<Snapshot, RegistryError> {
        let session = self.session(token).await?;
        let mut state = session.state.lock().await;
        let snapshot = state.game.reset()?;
        state.touch();
        session
            .broadcast
            .broadcast(ServerMessage::StateChange(snapshot.clone()));
        log::info!("Session {token} reset");
        Ok(snapshot)
    }

    pub async fn snapshot(&self, token: &str) -> Result<Snapshot, RegistryError> {
        Ok(self.session(token).await?.snapshot().await)
    }

    pub async fn chat_history(&self, token: &str) -> Result<Vec<ChatMessage>, RegistryError> {
        let session = self.session(token).await?;
        let state = session.state.lock().await;
        Ok(state.chat.clone())
    }

    /// Look up a live session.
    pub async fn session(&self, token: &str) -> Result<Arc<Session>, RegistryError> {
        self.sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownToken(token.to_string()))
    }

    /// Drop sessions that have had no participants for `idle_timeout`.
    ///
    /// Sessions busy with a request are left for the next sweep. Returns
    /// the evicted tokens.
    pub async fn evict_idle(&self) -> Vec<String> {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;
        let mut sessions = self.sessions.write().await;
        let mut evicted = Vec::new();

        sessions.retain(|token, session| {
            let idle = session
                .state
                .try_lock()
                .map(|state| state.is_idle(now, idle_timeout))
                .unwrap_or(false);
            if idle {
                evicted.push(token.clone());
            }
            !idle
        });

        if !evicted.is_empty() {
            log::info!(
                "Evicted {} idle session(s), {} live",
                evicted.len(),
                sessions.len()
            );
        }
        evicted
    }

    /// Run [`evict_idle`](Self::evict_idle) every `sweep_interval` until the
    /// registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.evict_idle().await;
            }
        })
    }

    /// Tokens of sessions nobody has won yet, sorted.
    pub async fn unfinished_tokens(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut tokens = Vec::new();
        for (token, session) in sessions.iter() {
            if !session.state.lock().await.game.is_finished() {
                tokens.push(token.clone());
            }
        }
        tokens.sort();
        tokens
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn contains(&self, token: &str) -> bool {
        self.sessions.read().await.contains_key(token)
    }
}

/// 16 random bytes as 32 lowercase hex characters.
fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

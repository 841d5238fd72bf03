//! # connect4-collab: Real-time multiplayer layer
//!
//! Hosts connect-four sessions behind a WebSocket server and keeps every
//! participant of a session on the same state.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket       ┌─────────────┐
//! │ GameClient  │ ◄─────────────────► │ GameServer  │
//! │ (per user)  │   JSON / bincode    │ (authority) │
//! └──────┬──────┘                     └──────┬──────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌─────────────┐                     ┌─────────────────┐
//! │ Snapshot    │                     │ SessionRegistry │
//! │ (replaced)  │                     │ token → Session │
//! └─────────────┘                     └──────┬──────────┘
//!                                            │
//!                                    ┌───────┴───────┐
//!                                    │ BroadcastGroup│
//!                                    │ (fan-out)     │
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Wire messages (serde enums, JSON or bincode frames)
//! - [`broadcast`]: Per-session fan-out with bounded buffering
//! - [`registry`]: Sessions, seats, chat logs, idle eviction
//! - [`server`]: WebSocket authority server
//! - [`client`]: WebSocket client with a local view of the session

pub mod broadcast;
pub mod client;
pub mod protocol;
pub mod registry;
pub mod server;

pub use broadcast::{BroadcastGroup, BroadcastStats, Outbound};
pub use client::{ConnectionState, GameClient, GameEvent};
pub use protocol::{ChatMessage, ClientMessage, ProtocolError, ServerMessage, WireFormat};
pub use registry::{
    JoinOutcome, ParticipantId, RegistryConfig, RegistryError, Resync, Role, Session,
    SessionRegistry,
};
pub use server::{GameServer, ServerConfig, ServerStats};

//! # connect4-core: Authoritative game engine
//!
//! Pure, synchronous game logic shared by the server and every client.
//! No I/O and no async; the collaboration layer owns sessions and calls in.
//!
//! ```text
//!  apply_move(player, col)
//!        │
//!        ▼
//!  ┌─────────────┐  drop   ┌─────────┐  detect  ┌──────────────┐
//!  │ GameSession │ ──────► │  Board  │ ───────► │ Win Detector │
//!  └──────┬──────┘         └─────────┘          └──────┬───────┘
//!         │                                            │
//!         ◄─────────────── Option<WinResult> ──────────┘
//!         │
//!         ▼
//!     Snapshot  (board + player to move + winner)
//! ```
//!
//! ## Modules
//!
//! - [`board`]: Gravity grid, drop and query
//! - [`player`]: Player seats
//! - [`win`]: Four-in-a-row scan with a fixed scan order
//! - [`session`]: Turn state machine and snapshots

pub mod board;
pub mod player;
pub mod session;
pub mod win;

pub use board::{Board, BoardError, Cell, DEFAULT_COLS, DEFAULT_ROWS, MIN_DIMENSION};
pub use player::{InvalidPlayer, PlayerId};
pub use session::{GameSession, GameStatus, MoveError, ResetError, Snapshot};
pub use win::{detect, Direction, WinResult, WIN_LENGTH};

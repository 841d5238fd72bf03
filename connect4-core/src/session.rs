//! Turn state machine for one game.
//!
//! ```text
//!            apply_move (no win)
//!              ┌────────┐
//!              ▼        │
//!  ──► InProgress ──────┘
//!          │   ▲
//!  win     │   │ reset
//!          ▼   │
//!      Finished(winner)
//! ```
//!
//! A session only mutates through [`GameSession::apply_move`] and
//! [`GameSession::reset`]; a rejected call never changes state. Each accepted
//! transition returns an immutable [`Snapshot`] for broadcast.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{Board, BoardError, Cell};
use crate::player::PlayerId;
use crate::win::{self, WinResult};

/// Macro state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    InProgress,
    Finished(WinResult),
}

/// Rejected move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    /// The requester is not the player to move, or the game is over.
    #[error("it is not this player's turn")]
    NotYourTurn,

    /// The drop itself failed (full or nonexistent column).
    #[error("illegal move: {0}")]
    IllegalMove(#[source] BoardError),
}

/// Rejected reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResetError {
    #[error("game is still in progress")]
    InProgress,
}

/// Complete, immutable copy of a session's public state.
///
/// This is the `state_change` payload: clients replace their local state
/// with it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// `board[row][col]`, row 0 is the bottom.
    pub board: Vec<Vec<Cell>>,
    /// Player to move next. Unchanged once the game is finished.
    #[serde(rename = "player")]
    pub current_player: PlayerId,
    pub winner: Option<WinResult>,
}

impl Snapshot {
    pub fn is_finished(&self) -> bool {
        self.winner.is_some()
    }

    pub fn rows(&self) -> usize {
        self.board.len()
    }

    pub fn cols(&self) -> usize {
        self.board.first().map_or(0, Vec::len)
    }

    /// Every non-empty cell as `(row, col, owner)`.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, usize, PlayerId)> + '_ {
        self.board.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .filter_map(move |(col, cell)| cell.owner().map(|owner| (row, col, owner)))
        })
    }
}

/// One game: board, turn and winner.
#[derive(Debug, Clone)]
pub struct GameSession {
    board: Board,
    current_player: PlayerId,
    winner: Option<WinResult>,
}

impl GameSession {
    /// Create an empty session with a `rows × cols` board.
    pub fn new(rows: usize, cols: usize) -> Result<Self, BoardError> {
        Ok(Self::with_board(Board::create(rows, cols)?))
    }

    /// Empty session on the classic 6 × 7 board.
    pub fn standard() -> Self {
        Self::with_board(Board::standard())
    }

    fn with_board(board: Board) -> Self {
        Self {
            board,
            current_player: PlayerId::Player1,
            winner: None,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn current_player(&self) -> PlayerId {
        self.current_player
    }

    pub fn winner(&self) -> Option<&WinResult> {
        self.winner.as_ref()
    }

    pub fn status(&self) -> GameStatus {
        match self.winner {
            Some(win) => GameStatus::Finished(win),
            None => GameStatus::InProgress,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.winner.is_some()
    }

    /// A full board with no winner. Play cannot continue; only a reset helps.
    pub fn is_drawn(&self) -> bool {
        self.winner.is_none() && self.board.is_full()
    }

    /// Drop a stone for `player` into `col`.
    pub fn apply_move(&mut self, player: PlayerId, col: usize) -> Result<Snapshot, MoveError> {
        if self.is_finished() || player != self.current_player {
            return Err(MoveError::NotYourTurn);
        }

        let row = self
            .board
            .drop(col, player)
            .map_err(MoveError::IllegalMove)?;
        log::trace!("{player} dropped into column {col}, landed on row {row}");

        match win::detect(&self.board) {
            Some(win) => {
                log::debug!(
                    "{} wins ({}) ending at ({}, {})",
                    win.player,
                    win.direction.name(),
                    win.origin_row,
                    win.origin_col
                );
                self.winner = Some(win);
            }
            None => self.current_player = player.other(),
        }

        Ok(self.snapshot())
    }

    /// Start over with an empty board and Player1 to move.
    ///
    /// Accepted once the game is finished or the board is full; otherwise
    /// rejected with no state change.
    pub fn reset(&mut self) -> Result<Snapshot, ResetError> {
        if !self.is_finished() && !self.board.is_full() {
            return Err(ResetError::InProgress);
        }
        let (rows, cols) = (self.board.rows(), self.board.cols());
        self.board = Board::create(rows, cols).unwrap_or_default();
        self.current_player = PlayerId::Player1;
        self.winner = None;
        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            board: self.board.to_rows(),
            current_player: self.current_player,
            winner: self.winner,
        }
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::standard()
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::Cell;

/// One of the two seats in a game.
///
/// Encodes on the wire as the number `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlayerId {
    Player1,
    Player2,
}

/// A player number outside `{1, 2}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("player must be 1 or 2, got {0}")]
pub struct InvalidPlayer(pub u8);

impl PlayerId {
    /// The opponent of this player.
    pub fn other(self) -> PlayerId {
        match self {
            PlayerId::Player1 => PlayerId::Player2,
            PlayerId::Player2 => PlayerId::Player1,
        }
    }

    /// Wire number (1 or 2).
    pub fn number(self) -> u8 {
        match self {
            PlayerId::Player1 => 1,
            PlayerId::Player2 => 2,
        }
    }

    /// The cell value a stone of this player occupies.
    pub fn to_cell(self) -> Cell {
        match self {
            PlayerId::Player1 => Cell::Player1,
            PlayerId::Player2 => Cell::Player2,
        }
    }
}

impl From<PlayerId> for u8 {
    fn from(player: PlayerId) -> u8 {
        player.number()
    }
}

impl TryFrom<u8> for PlayerId {
    type Error = InvalidPlayer;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PlayerId::Player1),
            2 => Ok(PlayerId::Player2),
            other => Err(InvalidPlayer(other)),
        }
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "player {}", self.number())
    }
}

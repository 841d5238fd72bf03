//! Gravity grid of cell ownership.
//!
//! Row 0 is the bottom of the board. Stones stack upward from row 0, so a
//! cell can only be occupied when every cell beneath it in the same column
//! is occupied too.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::player::PlayerId;

pub const DEFAULT_ROWS: usize = 6;
pub const DEFAULT_COLS: usize = 7;

/// Smallest board edge on which four in a row is possible.
pub const MIN_DIMENSION: usize = 4;

/// Ownership of a single hole. Encodes on the wire as `0`, `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Cell {
    #[default]
    Empty,
    Player1,
    Player2,
}

impl Cell {
    /// The player owning this cell, if any.
    pub fn owner(self) -> Option<PlayerId> {
        match self {
            Cell::Empty => None,
            Cell::Player1 => Some(PlayerId::Player1),
            Cell::Player2 => Some(PlayerId::Player2),
        }
    }

    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> u8 {
        match cell {
            Cell::Empty => 0,
            Cell::Player1 => 1,
            Cell::Player2 => 2,
        }
    }
}

impl TryFrom<u8> for Cell {
    type Error = BoardError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Cell::Empty),
            1 => Ok(Cell::Player1),
            2 => Ok(Cell::Player2),
            other => Err(BoardError::InvalidCell(other)),
        }
    }
}

/// Board construction, query and drop failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("board must be at least {MIN_DIMENSION}x{MIN_DIMENSION}, got {rows}x{cols}")]
    InvalidDimensions { rows: usize, cols: usize },

    #[error("cell ({row}, {col}) is outside the board")]
    OutOfRange { row: usize, col: usize },

    /// A drop addressed a column that does not exist.
    #[error("column {0} is outside the board")]
    ColumnOutOfRange(usize),

    #[error("column {0} is full")]
    ColumnFull(usize),

    #[error("cell value must be 0, 1 or 2, got {0}")]
    InvalidCell(u8),
}

/// Fixed-size grid, stored row-major with row 0 at the bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
    /// Stones per column; also the row index the next drop lands on.
    heights: Vec<usize>,
}

impl Board {
    /// Create an empty board.
    pub fn create(rows: usize, cols: usize) -> Result<Self, BoardError> {
        if rows < MIN_DIMENSION || cols < MIN_DIMENSION {
            return Err(BoardError::InvalidDimensions { rows, cols });
        }
        Ok(Self {
            rows,
            cols,
            cells: vec![Cell::Empty; rows * cols],
            heights: vec![0; cols],
        })
    }

    /// The classic 6 × 7 board.
    pub fn standard() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            cells: vec![Cell::Empty; DEFAULT_ROWS * DEFAULT_COLS],
            heights: vec![0; DEFAULT_COLS],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Cell at `(row, col)`.
    pub fn cell_at(&self, row: usize, col: usize) -> Result<Cell, BoardError> {
        if row >= self.rows || col >= self.cols {
            return Err(BoardError::OutOfRange { row, col });
        }
        Ok(self.cells[row * self.cols + col])
    }

    /// Cell lookup for callers that already bounds-checked.
    pub(crate) fn get(&self, row: usize, col: usize) -> Cell {
        self.cells[row * self.cols + col]
    }

    /// Drop a stone into `col`. Returns the row it landed on.
    ///
    /// A failed drop leaves the board untouched.
    pub fn drop(&mut self, col: usize, player: PlayerId) -> Result<usize, BoardError> {
        if col >= self.cols {
            return Err(BoardError::ColumnOutOfRange(col));
        }
        let row = self.heights[col];
        if row >= self.rows {
            return Err(BoardError::ColumnFull(col));
        }
        self.cells[row * self.cols + col] = player.to_cell();
        self.heights[col] = row + 1;
        Ok(row)
    }

    /// Number of stones in `col` (0 for unknown columns).
    pub fn column_height(&self, col: usize) -> usize {
        self.heights.get(col).copied().unwrap_or(0)
    }

    pub fn is_column_full(&self, col: usize) -> bool {
        col >= self.cols || self.heights[col] >= self.rows
    }

    /// Columns that still accept a stone, in ascending order.
    pub fn legal_columns(&self) -> Vec<usize> {
        (0..self.cols).filter(|&col| !self.is_column_full(col)).collect()
    }

    pub fn is_full(&self) -> bool {
        self.heights.iter().all(|&h| h >= self.rows)
    }

    pub fn stone_count(&self) -> usize {
        self.heights.iter().sum()
    }

    /// Every occupied cell as `(row, col, owner)`, bottom row first.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, usize, PlayerId)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(idx, cell)| {
            cell.owner().map(|owner| (idx / self.cols, idx % self.cols, owner))
        })
    }

    /// Copy of the grid as `rows[row][col]`, row 0 first.
    pub fn to_rows(&self) -> Vec<Vec<Cell>> {
        self.cells.chunks(self.cols).map(|row| row.to_vec()).collect()
    }

    /// Place a stone anywhere, ignoring gravity. Lets win-detection tests
    /// build floating patterns.
    #[cfg(test)]
    pub(crate) fn place(&mut self, row: usize, col: usize, player: PlayerId) {
        self.cells[row * self.cols + col] = player.to_cell();
        self.heights[col] = self.heights[col].max(row + 1);
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::standard()
    }
}

//! Four-in-a-row detection.
//!
//! Each of the four directions is scanned as a set of lines, every line of
//! the grid covered once per direction, keeping a run-length counter. The
//! first run reaching [`WIN_LENGTH`] is reported with the cell that completed
//! it as origin, so the origin is the far end of the line in scan direction.
//!
//! Scan order is fixed and decides which line is reported when a board holds
//! more than one:
//!
//! ```text
//! 1. horizontal   from (row, 0)          for every row, bottom up
//! 2. vertical     from (0, col)          for every column, left to right
//! 3. ascending    from (0, col)          for every column
//!                 then (row, 0)          for rows 1..rows
//! 4. descending   from (rows - 1, col)   for every column
//!                 then (row, 0)          for every row
//! ```
//!
//! Every cell is visited a bounded number of times per direction, so a full
//! scan is O(rows × cols).

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::player::PlayerId;

/// Stones needed in a line to win.
pub const WIN_LENGTH: usize = 4;

/// Axis a winning line runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "horizontal")]
    Horizontal,
    #[serde(rename = "vertical")]
    Vertical,
    #[serde(rename = "ascending")]
    AscendingDiagonal,
    #[serde(rename = "descending")]
    DescendingDiagonal,
}

impl Direction {
    /// All directions in scan order.
    pub const ALL: [Direction; 4] = [
        Direction::Horizontal,
        Direction::Vertical,
        Direction::AscendingDiagonal,
        Direction::DescendingDiagonal,
    ];

    /// Unit step as `(d_row, d_col)`.
    pub fn step(self) -> (isize, isize) {
        match self {
            Direction::Horizontal => (0, 1),
            Direction::Vertical => (1, 0),
            Direction::AscendingDiagonal => (1, 1),
            Direction::DescendingDiagonal => (-1, 1),
        }
    }

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Direction::Horizontal => "horizontal",
            Direction::Vertical => "vertical",
            Direction::AscendingDiagonal => "ascending",
            Direction::DescendingDiagonal => "descending",
        }
    }

    /// Starting cells of every scanned line for a `rows × cols` board.
    fn line_starts(self, rows: usize, cols: usize) -> Vec<(usize, usize)> {
        match self {
            Direction::Horizontal => (0..rows).map(|row| (row, 0)).collect(),
            Direction::Vertical => (0..cols).map(|col| (0, col)).collect(),
            Direction::AscendingDiagonal => (0..cols)
                .map(|col| (0, col))
                .chain((1..rows).map(|row| (row, 0)))
                .collect(),
            Direction::DescendingDiagonal => (0..cols)
                .map(|col| (rows - 1, col))
                .chain((0..rows).map(|row| (row, 0)))
                .collect(),
        }
    }
}

/// A confirmed four-in-a-row.
///
/// `(origin_row, origin_col)` is the last cell of the line in scan
/// direction; the other three sit at `origin - k * step` for k = 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WinResult {
    pub player: PlayerId,
    #[serde(rename = "row")]
    pub origin_row: usize,
    #[serde(rename = "col")]
    pub origin_col: usize,
    pub direction: Direction,
}

impl WinResult {
    /// The four winning cells, origin first.
    pub fn cells(&self) -> [(usize, usize); WIN_LENGTH] {
        let (d_row, d_col) = self.direction.step();
        let mut cells = [(self.origin_row, self.origin_col); WIN_LENGTH];
        for (k, cell) in cells.iter_mut().enumerate() {
            let k = k as isize;
            *cell = (
                (self.origin_row as isize - k * d_row) as usize,
                (self.origin_col as isize - k * d_col) as usize,
            );
        }
        cells
    }
}

/// Scan `board` for four in a row. Returns the first match in scan order.
pub fn detect(board: &Board) -> Option<WinResult> {
    let (rows, cols) = (board.rows(), board.cols());
    Direction::ALL.into_iter().find_map(|direction| {
        direction
            .line_starts(rows, cols)
            .into_iter()
            .find_map(|(row, col)| scan_line(board, row, col, direction))
    })
}

/// Walk one line from `(row, col)` until it leaves the board.
fn scan_line(board: &Board, row: usize, col: usize, direction: Direction) -> Option<WinResult> {
    let (d_row, d_col) = direction.step();
    let (rows, cols) = (board.rows() as isize, board.cols() as isize);
    let (mut r, mut c) = (row as isize, col as isize);

    let mut run = 0usize;
    let mut current: Option<PlayerId> = None;

    while (0..rows).contains(&r) && (0..cols).contains(&c) {
        match board.get(r as usize, c as usize).owner() {
            None => {
                run = 0;
                current = None;
            }
            Some(owner) if current == Some(owner) => run += 1,
            Some(owner) => {
                run = 1;
                current = Some(owner);
            }
        }

        if run == WIN_LENGTH {
            return current.map(|player| WinResult {
                player,
                origin_row: r as usize,
                origin_col: c as usize,
                direction,
            });
        }

        r += d_row;
        c += d_col;
    }

    None
}

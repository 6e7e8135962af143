//! The 3×3 board and win/tie detection.
//!
//! Cells are addressed by index `0..9`; index `i` sits at row `i / 3`,
//! column `i % 3`.

use std::fmt;

use crate::protocol::{Mark, CELL_COUNT};

/// Every row, column and diagonal that wins when filled with one mark.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Classification of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    InProgress,
    /// Three identical marks in a line.
    Win(Mark),
    /// Every cell is filled and nobody won.
    Tie,
    /// The opponent left for good. Never produced by [`Board::outcome`].
    Abandoned,
}

impl Outcome {
    /// Returns `true` for everything but `InProgress`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

/// Result of writing a mark into a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The cell was empty and now holds the mark.
    Placed,
    /// The cell already held the same mark.
    Unchanged,
    /// The cell holds the other mark; nothing was written.
    Conflict(Mark),
    /// The index is outside `0..9`.
    OutOfRange,
}

/// Nine cells, each empty or holding a [`Mark`].
///
/// A filled cell is only cleared by [`Board::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Board {
    cells: [Option<Mark>; CELL_COUNT],
}

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// The mark at `index`, or `None` when the cell is empty or out of range.
    pub fn get(&self, index: usize) -> Option<Mark> {
        self.cells.get(index).copied().flatten()
    }

    /// Returns `true` if `index` is on the board and holds no mark.
    pub fn is_empty_at(&self, index: usize) -> bool {
        matches!(self.cells.get(index), Some(None))
    }

    /// Returns `true` if no cell holds a mark.
    pub fn is_clear(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// Returns `true` if every cell holds a mark.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Writes `mark` into an empty cell. Writing the same mark twice is a no-op.
    pub fn place(&mut self, index: usize, mark: Mark) -> Placement {
        match self.cells.get_mut(index) {
            None => Placement::OutOfRange,
            Some(cell @ None) => {
                *cell = Some(mark);
                Placement::Placed
            }
            Some(Some(existing)) if *existing == mark => Placement::Unchanged,
            Some(Some(existing)) => Placement::Conflict(*existing),
        }
    }

    /// Copies the value of one cell from `other`, replacing whatever is here.
    ///
    /// Used to bring a display board in line with the authoritative one.
    pub(crate) fn sync_cell(&mut self, index: usize, other: &Board) {
        if let (Some(cell), Some(source)) = (self.cells.get_mut(index), other.cells.get(index)) {
            *cell = *source;
        }
    }

    /// Empties every cell.
    pub fn clear(&mut self) {
        self.cells = [None; CELL_COUNT];
    }

    /// Iterates over the cells in index order.
    pub fn cells(&self) -> impl Iterator<Item = Option<Mark>> + '_ {
        self.cells.iter().copied()
    }

    /// Classifies the board as won, tied or still in progress.
    pub fn outcome(&self) -> Outcome {
        for [a, b, c] in WINNING_LINES {
            if let Some(mark) = self.get(a) {
                if self.get(b) == Some(mark) && self.get(c) == Some(mark) {
                    return Outcome::Win(mark);
                }
            }
        }
        if self.is_full() {
            Outcome::Tie
        } else {
            Outcome::InProgress
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            if row > 0 {
                writeln!(f, "---+---+---")?;
            }
            for col in 0..3 {
                let index = row * 3 + col;
                let symbol = match self.get(index) {
                    Some(mark) => mark.to_string(),
                    None => index.to_string(),
                };
                if col > 0 {
                    f.write_str("|")?;
                }
                write!(f, " {symbol} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

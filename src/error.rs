// src/error.rs
use thiserror::Error;

/// Conditions reported by the board. None of them are fatal to a session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("point ({x:.1}, {y:.1}) is outside the calibrated grid")]
    Unmapped { x: f64, y: f64 },

    #[error("cannot remove from empty cell ({row}, {col})")]
    RemoveFromEmptyCell { row: usize, col: usize },

    #[error("cell ({row}, {col}) has height {height} but {journal_len} journal entries")]
    JournalMismatch {
        row: usize,
        col: usize,
        height: u32,
        journal_len: usize,
    },
}

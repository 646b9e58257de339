// src/board.rs - Quantized build surface: drop points, height map and placement journal
use crate::config::BoardConfig;
use crate::error::GridError;
use crate::geometry::Point;
use crate::hand::TransitionKind;
use crate::session::GridEvent;
use serde::Serialize;
use std::collections::BTreeMap;

/// Index of one drop point: `row` runs along the image y axis, `col` along x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Rectangle,
    Square,
    Other,
}

/// A detected outline in the calibration image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contour {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub shape: Shape,
}

/// Pixel offsets of the grid lines for overlay drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridLines {
    pub vertical: Vec<u32>,
    pub horizontal: Vec<u32>,
}

/// Row -> layer -> column -> tag.
pub type LayeredJournal = BTreeMap<usize, BTreeMap<usize, BTreeMap<usize, String>>>;

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub row: usize,
    pub col: usize,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardSnapshot {
    pub side_length: u32,
    pub rows: usize,
    pub cols: usize,
    pub heights: Vec<Vec<u32>>,
    pub centers: Vec<Vec<[f64; 2]>>,
    pub journal: Vec<JournalEntry>,
    pub layers: LayeredJournal,
}

pub struct Board {
    side_length: u32,
    width: u32,
    height: u32,
    centers: Vec<Vec<Point>>,
    heights: Vec<Vec<u32>>,
    // Tags per occupied cell, bottom of the stack first. A cell with no
    // items has no entry at all.
    journal: BTreeMap<Cell, Vec<String>>,
    // Cells seen holding an item during the current presence pass
    presence: Vec<Vec<bool>>,
    config: BoardConfig,
}

impl Board {
    /// Lay out drop points every `side_length` pixels over a `width` x
    /// `height` image.
    pub fn new(width: u32, height: u32, side_length: u32, config: BoardConfig) -> Self {
        let side_length = side_length.max(1);
        let rows = (height / side_length + 1) as usize;
        let cols = (width / side_length + 1) as usize;
        let half = (side_length / 2) as f64;
        let side = side_length as f64;

        let centers = (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| Point::new(half + c as f64 * side, half + r as f64 * side))
                    .collect()
            })
            .collect();

        Self {
            side_length,
            width,
            height,
            centers,
            heights: vec![vec![0; cols]; rows],
            journal: BTreeMap::new(),
            presence: vec![vec![false; cols]; rows],
            config,
        }
    }

    /// Build a board whose cell size is the width of the widest rectangle or
    /// square found in the calibration image.
    pub fn calibrate(width: u32, height: u32, contours: &[Contour], config: BoardConfig) -> Self {
        let side_length = match Self::side_length_from_contours(contours) {
            Some(side) => {
                tracing::info!(side_length = side, "calibrated cell size from reference shape");
                side
            }
            None => {
                tracing::info!(
                    side_length = config.default_side_length,
                    "no reference shape found, using default cell size"
                );
                config.default_side_length
            }
        };
        Self::new(width, height, side_length, config)
    }

    pub fn side_length_from_contours(contours: &[Contour]) -> Option<u32> {
        contours
            .iter()
            .filter(|c| matches!(c.shape, Shape::Rectangle | Shape::Square))
            .map(|c| c.width)
            .filter(|&w| w > 0)
            .max()
    }

    pub fn side_length(&self) -> u32 {
        self.side_length
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn rows(&self) -> usize {
        self.centers.len()
    }

    pub fn cols(&self) -> usize {
        self.centers.first().map_or(0, Vec::len)
    }

    pub fn centers(&self) -> &[Vec<Point>] {
        &self.centers
    }

    pub fn heights(&self) -> &[Vec<u32>] {
        &self.heights
    }

    /// Items stacked at `cell`, or `None` if the cell is not on this board.
    pub fn height_at(&self, cell: Cell) -> Option<u32> {
        self.heights.get(cell.row)?.get(cell.col).copied()
    }

    // Only for cells produced by this board's own lookup
    fn height(&self, cell: Cell) -> u32 {
        self.heights[cell.row][cell.col]
    }

    pub fn tags_at(&self, cell: Cell) -> &[String] {
        self.journal.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn journal(&self) -> &BTreeMap<Cell, Vec<String>> {
        &self.journal
    }

    pub fn is_present(&self, cell: Cell) -> Option<bool> {
        self.presence.get(cell.row)?.get(cell.col).copied()
    }

    /// The cell whose drop point is within half a side length of `point` on
    /// both axes.
    ///
    /// Cells are scanned row-major and the first hit wins, so a point exactly
    /// between two drop points maps to the earlier one.
    pub fn center_of(&self, point: &Point) -> Option<Cell> {
        let half = (self.side_length / 2) as f64;
        for (row, line) in self.centers.iter().enumerate() {
            for (col, center) in line.iter().enumerate() {
                let x_diff = (center.x - point.x).abs();
                let y_diff = (center.y - point.y).abs();
                if x_diff <= half && y_diff <= half {
                    return Some(Cell { row, col });
                }
            }
        }
        None
    }

    fn cell_for(&self, point: &Point) -> Result<Cell, GridError> {
        self.center_of(point).ok_or(GridError::Unmapped {
            x: point.x,
            y: point.y,
        })
    }

    /// Check that the height map and the journal agree about `cell`.
    pub fn verify_cell(&self, cell: Cell) -> Result<(), GridError> {
        let height = self.height_at(cell).unwrap_or(0);
        let journal_len = self.journal.get(&cell).map_or(0, Vec::len);
        let consistent = match self.journal.get(&cell) {
            None => height == 0,
            Some(tags) => height > 0 && tags.len() == height as usize,
        };
        if consistent {
            Ok(())
        } else {
            Err(GridError::JournalMismatch {
                row: cell.row,
                col: cell.col,
                height,
                journal_len,
            })
        }
    }

    fn cell_is_empty(&self, cell: Cell) -> bool {
        if let Err(e) = self.verify_cell(cell) {
            tracing::error!(row = cell.row, col = cell.col, "journal out of sync: {e}");
        }
        self.height(cell) == 0
    }

    /// Whether nothing is stacked at the cell under `point`.
    pub fn is_empty(&self, point: &Point) -> Result<bool, GridError> {
        let cell = self.cell_for(point)?;
        Ok(self.cell_is_empty(cell))
    }

    /// Stack one item tagged with the configured default tag.
    pub fn place(&mut self, point: &Point) -> Result<Cell, GridError> {
        let tag = self.config.default_tag.clone();
        self.place_tagged(point, tag)
    }

    pub fn place_tagged(&mut self, point: &Point, tag: impl Into<String>) -> Result<Cell, GridError> {
        let cell = self.cell_for(point)?;
        self.push(cell, tag.into());
        Ok(cell)
    }

    fn push(&mut self, cell: Cell, tag: String) {
        self.heights[cell.row][cell.col] += 1;
        self.journal.entry(cell).or_default().push(tag);
    }

    /// Take the most recently placed item off the cell under `point`.
    pub fn remove(&mut self, point: &Point) -> Result<Cell, GridError> {
        let cell = self.cell_for(point)?;
        self.pop(cell)?;
        Ok(cell)
    }

    fn pop(&mut self, cell: Cell) -> Result<String, GridError> {
        if self.cell_is_empty(cell) {
            return Err(GridError::RemoveFromEmptyCell {
                row: cell.row,
                col: cell.col,
            });
        }
        self.heights[cell.row][cell.col] -= 1;

        let tags = self.journal.get_mut(&cell);
        let tag = tags.and_then(|tags| tags.pop()).unwrap_or_default();
        if self.journal.get(&cell).is_some_and(Vec::is_empty) {
            self.journal.remove(&cell);
        }
        Ok(tag)
    }

    /// Record that an item was seen resting at `point` without a gesture.
    ///
    /// Only an empty cell gains an item; any cell is marked present for the
    /// current presence pass.
    pub fn apply_low_layer_heuristic(&mut self, point: &Point) -> Result<Cell, GridError> {
        let cell = self.cell_for(point)?;
        if self.height(cell) == 0 {
            let tag = self.config.default_tag.clone();
            self.push(cell, tag);
        }
        self.presence[cell.row][cell.col] = true;
        Ok(cell)
    }

    pub fn begin_presence_pass(&mut self) {
        for row in &mut self.presence {
            row.fill(false);
        }
    }

    /// Clear every occupied cell that was not seen during the current
    /// presence pass. Without a bottom item nothing can rest on top, so the
    /// whole stack goes.
    pub fn prune_unconfirmed(&mut self) -> Vec<Cell> {
        let stale: Vec<Cell> = self
            .journal
            .keys()
            .copied()
            .filter(|cell| !self.presence[cell.row][cell.col])
            .collect();

        for &cell in &stale {
            while self.height(cell) > 0 {
                if let Err(e) = self.pop(cell) {
                    tracing::error!("failed to clear cell: {e}");
                    break;
                }
            }
            tracing::debug!(row = cell.row, col = cell.col, "cleared unconfirmed stack");
        }
        stale
    }

    /// Grabbing picks an item up, releasing drops one.
    pub fn apply(&mut self, kind: TransitionKind, point: &Point) -> Result<Cell, GridError> {
        match kind {
            TransitionKind::Grab => self.remove(point),
            TransitionKind::Release => self.place(point),
        }
    }

    /// Re-apply a recorded event stream. Returns the events that failed.
    pub fn replay(&mut self, events: &[GridEvent]) -> Vec<GridError> {
        events
            .iter()
            .filter_map(|event| self.apply(event.kind, &event.location()).err())
            .collect()
    }

    /// The journal re-keyed as row -> layer -> column.
    pub fn layers(&self) -> LayeredJournal {
        let mut layers = LayeredJournal::new();
        for (cell, tags) in &self.journal {
            for (layer, tag) in tags.iter().enumerate() {
                layers
                    .entry(cell.row)
                    .or_default()
                    .entry(layer)
                    .or_default()
                    .insert(cell.col, tag.clone());
            }
        }
        layers
    }

    pub fn grid_lines(&self, width: u32, height: u32) -> GridLines {
        let step = self.side_length as usize;
        GridLines {
            vertical: (0..=width).step_by(step).collect(),
            horizontal: (0..=height).step_by(step).collect(),
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            side_length: self.side_length,
            rows: self.rows(),
            cols: self.cols(),
            heights: self.heights.clone(),
            centers: self
                .centers
                .iter()
                .map(|line| line.iter().map(|p| [p.x, p.y]).collect())
                .collect(),
            journal: self
                .journal
                .iter()
                .map(|(cell, tags)| JournalEntry {
                    row: cell.row,
                    col: cell.col,
                    tags: tags.clone(),
                })
                .collect(),
            layers: self.layers(),
        }
    }
}

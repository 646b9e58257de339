// src/export.rs
use crate::board::Board;
use crate::hand::TransitionKind;
use crate::session::GridEvent;
use anyhow::Result;
use chrono::Local;
use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct EventRecord {
    frame: u64,
    kind: TransitionKind,
    x: f64,
    y: f64,
    // Empty when the point fell outside every cell
    row: Option<usize>,
    col: Option<usize>,
}

pub struct SessionExporter {
    output_dir: PathBuf,
    session_name: String,
}

impl SessionExporter {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Self {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });

        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_name,
        }
    }

    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(&self.session_name)
    }

    /// Write the event log as CSV, one row per grab or release.
    pub fn export_events(&self, events: &[GridEvent], board: &Board) -> Result<PathBuf> {
        let csv_path = self.session_dir().join("events.csv");
        if let Some(parent) = csv_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(&csv_path)?;
        let mut writer = Writer::from_writer(file);

        for event in events {
            let cell = board.center_of(&event.location());
            writer.serialize(EventRecord {
                frame: event.frame,
                kind: event.kind,
                x: event.x,
                y: event.y,
                row: cell.map(|c| c.row),
                col: cell.map(|c| c.col),
            })?;
        }

        writer.flush()?;
        tracing::info!(events = events.len(), "exported event log to {}", csv_path.display());
        Ok(csv_path)
    }

    /// Write the final board state as pretty-printed JSON.
    pub fn export_board(&self, board: &Board) -> Result<PathBuf> {
        let json_path = self.session_dir().join("board.json");
        if let Some(parent) = json_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(&json_path)?;
        serde_json::to_writer_pretty(file, &board.snapshot())?;

        tracing::info!("exported board snapshot to {}", json_path.display());
        Ok(json_path)
    }
}

// src/main.rs
use anyhow::{Context, Result};
use grab_tracker::capture::{BlankClock, FrameSource, ImageSequence};
use grab_tracker::export::SessionExporter;
use grab_tracker::perception::RecordedPerception;
use grab_tracker::{SessionConfig, SessionContext};
use std::path::PathBuf;

const USAGE: &str = "usage: grab_tracker <landmarks.jsonl> [frames_dir|-] [output_dir]";

fn default_output_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(|p| p.join("GrabTracker")))
        .unwrap_or_else(|| PathBuf::from("./output"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let landmarks = args.next().map(PathBuf::from).context(USAGE)?;
    let frames_dir = args.next().filter(|a| a != "-").map(PathBuf::from);
    let output_dir = args.next().map(PathBuf::from).unwrap_or_else(default_output_dir);

    let config = SessionConfig::default();
    let perception = RecordedPerception::open(&landmarks)?;

    let source: Box<dyn FrameSource> = match frames_dir {
        Some(dir) => Box::new(ImageSequence::new(dir, None)?),
        None => {
            let (width, height) = config.frame_size;
            Box::new(BlankClock::new(width, height, Some(perception.frame_span()), None))
        }
    };

    let context = SessionContext::open(source, Box::new(perception), config);
    let outcome = context
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("cannot listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    let exporter = SessionExporter::new(&output_dir, None);
    let events_path = exporter.export_events(outcome.session.log(), outcome.session.board())?;
    let board_path = exporter.export_board(outcome.session.board())?;

    println!(
        "Processed {} of {} frames, {} events",
        outcome.frames_processed,
        outcome.frames_captured,
        outcome.session.log().len()
    );
    println!("Events: {}", events_path.display());
    println!("Board:  {}", board_path.display());

    Ok(())
}

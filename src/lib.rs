// src/lib.rs
pub mod board;
pub mod capture;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod hand;
pub mod landmarks;
pub mod matching;
pub mod perception;
pub mod pipeline;
pub mod session;

pub use board::{Board, Cell};
pub use config::{BoardConfig, EmissionPolicy, HandConfig, SessionConfig};
pub use error::GridError;
pub use hand::{HandState, TransitionKind};
pub use landmarks::{Handedness, Observation};
pub use pipeline::{FrameHandoff, SessionContext, SessionOutcome};
pub use session::{FrameReport, GridEvent, TrackingSession};

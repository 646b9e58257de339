// src/perception.rs - Landmark detection seam and recorded-landmark replay
use crate::board::{Contour, Shape};
use crate::capture::Frame;
use crate::geometry::{self, Point};
use crate::landmarks::{Handedness, Observation, LANDMARK_COUNT};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Turns frames into hand observations in pixel coordinates.
///
/// The two calibration hooks default to "nothing found", which leaves the
/// board at its default cell size and skips surface reconciliation.
pub trait Perception: Send {
    fn observe(&mut self, frame: &Frame) -> Result<Vec<Observation>>;

    /// Outlines found in a calibration frame, in pixels.
    fn calibration_contours(&mut self, _frame: &Frame) -> Result<Vec<Contour>> {
        Ok(Vec::new())
    }

    /// Points where blocks are currently seen on the surface, in pixels.
    fn surface_blocks(&mut self, _frame: &Frame) -> Result<Vec<Point>> {
        Ok(Vec::new())
    }
}

#[derive(Deserialize, Debug)]
struct HandJson {
    handedness: Handedness,
    score: f64,
    /// Normalized `[x, y]` pairs, 21 per hand.
    landmarks: Vec<[f64; 2]>,
}

#[derive(Deserialize, Debug)]
struct ContourJson {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    #[serde(default)]
    shape: String,
}

impl From<ContourJson> for Contour {
    fn from(c: ContourJson) -> Self {
        let shape = match c.shape.to_ascii_lowercase().as_str() {
            "rectangle" => Shape::Rectangle,
            "square" => Shape::Square,
            _ => Shape::Other,
        };
        Contour {
            x: c.x,
            y: c.y,
            width: c.width,
            height: c.height,
            shape,
        }
    }
}

#[derive(Deserialize, Debug)]
struct FrameRecord {
    frame: u64,
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    contours: Vec<ContourJson>,
    /// Normalized block positions seen on the surface.
    #[serde(default)]
    blocks: Vec<[f64; 2]>,
}

struct RecordedFrame {
    hands: Vec<HandJson>,
    contours: Vec<Contour>,
    blocks: Vec<[f64; 2]>,
}

/// Replays detector output recorded as JSON lines, one object per frame:
///
/// ```text
/// {"frame":0,"hands":[{"handedness":"Left","score":0.93,"landmarks":[[0.41,0.62], ...]}]}
/// ```
///
/// Frames with no record yield no hands.
pub struct RecordedPerception {
    frames: HashMap<u64, RecordedFrame>,
}

impl RecordedPerception {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open landmark recording {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Bad landmark recording {}", path.display()))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut frames = HashMap::new();
        for (line_no, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FrameRecord = serde_json::from_str(&line)
                .with_context(|| format!("line {}", line_no + 1))?;
            frames.insert(
                record.frame,
                RecordedFrame {
                    hands: record.hands,
                    contours: record.contours.into_iter().map(Contour::from).collect(),
                    blocks: record.blocks,
                },
            );
        }
        tracing::info!(frames = frames.len(), "loaded landmark recording");
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Highest recorded frame index plus one.
    pub fn frame_span(&self) -> u64 {
        self.frames.keys().max().map_or(0, |last| last + 1)
    }
}

impl Perception for RecordedPerception {
    fn observe(&mut self, frame: &Frame) -> Result<Vec<Observation>> {
        let Some(recorded) = self.frames.get(&frame.index) else {
            return Ok(Vec::new());
        };

        let normalized: Vec<Vec<[f64; 2]>> = recorded.hands.iter().map(|h| h.landmarks.clone()).collect();
        let pixels = geometry::to_pixels(&normalized, frame.width, frame.height);

        let observations = recorded
            .hands
            .iter()
            .zip(&pixels)
            .filter_map(|(hand, points)| {
                let observation = Observation::from_points(points, hand.handedness, hand.score);
                if observation.is_none() {
                    tracing::warn!(
                        frame = frame.index,
                        landmarks = points.len(),
                        expected = LANDMARK_COUNT,
                        "skipping hand with wrong landmark count"
                    );
                }
                observation
            })
            .collect();
        Ok(observations)
    }

    fn calibration_contours(&mut self, frame: &Frame) -> Result<Vec<Contour>> {
        Ok(self
            .frames
            .get(&frame.index)
            .map(|r| r.contours.clone())
            .unwrap_or_default())
    }

    fn surface_blocks(&mut self, frame: &Frame) -> Result<Vec<Point>> {
        let Some(recorded) = self.frames.get(&frame.index) else {
            return Ok(Vec::new());
        };
        let blocks = geometry::to_pixels(&[recorded.blocks.clone()], frame.width, frame.height);
        Ok(blocks.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64) -> Frame {
        Frame {
            index,
            width: 640,
            height: 480,
            image: None,
        }
    }

    fn hand_json(handedness: &str, count: usize) -> String {
        let points: Vec<String> = (0..count).map(|i| format!("[0.5,{}]", 0.01 * i as f64)).collect();
        format!(
            r#"{{"handedness":"{}","score":0.9,"landmarks":[{}]}}"#,
            handedness,
            points.join(",")
        )
    }

    #[test]
    fn replays_hands_in_pixels() {
        let recording = format!(
            "{{\"frame\":3,\"hands\":[{}]}}\n\n",
            hand_json("Left", LANDMARK_COUNT)
        );
        let mut perception = RecordedPerception::from_reader(recording.as_bytes()).unwrap();
        assert_eq!(perception.len(), 1);
        assert_eq!(perception.frame_span(), 4);

        let observations = perception.observe(&frame(3)).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].handedness, Handedness::Left);
        assert_eq!(observations[0].wrist(), Point::new(320.0, 0.0));
        assert!((observations[0].landmarks[10].y - 48.0).abs() < 1e-9);

        assert!(perception.observe(&frame(0)).unwrap().is_empty());
    }

    #[test]
    fn short_hands_are_skipped() {
        let recording = format!(
            "{{\"frame\":0,\"hands\":[{},{}]}}",
            hand_json("right", 5),
            hand_json("right", LANDMARK_COUNT)
        );
        let mut perception = RecordedPerception::from_reader(recording.as_bytes()).unwrap();
        let observations = perception.observe(&frame(0)).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].handedness, Handedness::Right);
    }

    #[test]
    fn contours_and_blocks_come_from_the_record() {
        let recording = r#"{"frame":0,"contours":[{"x":10,"y":10,"width":40,"height":40,"shape":"Square"}],"blocks":[[0.5,0.5]]}"#;
        let mut perception = RecordedPerception::from_reader(recording.as_bytes()).unwrap();

        let contours = perception.calibration_contours(&frame(0)).unwrap();
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].shape, Shape::Square);
        assert_eq!(contours[0].width, 40);

        assert_eq!(perception.surface_blocks(&frame(0)).unwrap(), vec![Point::new(320.0, 240.0)]);
        assert!(perception.surface_blocks(&frame(1)).unwrap().is_empty());
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(RecordedPerception::from_reader("{\"frame\":".as_bytes()).is_err());
    }
}

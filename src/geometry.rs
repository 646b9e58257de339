// src/geometry.rs - Planar helpers shared by the board and the hand tracker
use nalgebra::Point2;

/// A position in image pixel coordinates.
pub type Point = Point2<f64>;

/// Euclidean distance between two points.
pub fn distance(a: &Point, b: &Point) -> f64 {
    nalgebra::distance(a, b)
}

/// Point halfway between `a` and `b`.
pub fn midpoint(a: &Point, b: &Point) -> Point {
    nalgebra::center(a, b)
}

/// Convert normalized detector output (0..1 on both axes) to pixel positions
/// for an image of `width` x `height`.
pub fn to_pixels(hands: &[Vec<[f64; 2]>], width: u32, height: u32) -> Vec<Vec<Point>> {
    hands
        .iter()
        .map(|hand| {
            hand.iter()
                .map(|lm| Point::new(lm[0] * width as f64, lm[1] * height as f64))
                .collect()
        })
        .collect()
}

/// Landmark index of a fingertip. Fingers are numbered from 1 (thumb) to
/// 5 (pinky); 0 maps to the wrist.
pub fn fingertip_index(finger: usize) -> usize {
    finger * 4
}

/// Distance between the tips of two fingers of the same hand.
pub fn finger_to_finger_distance(landmarks: &[Point], first: usize, second: usize) -> f64 {
    distance(
        &landmarks[fingertip_index(first)],
        &landmarks[fingertip_index(second)],
    )
}

/// True when the fingertip distance lies strictly between `low` and `high`.
pub fn is_finger_near_finger(
    landmarks: &[Point],
    first: usize,
    second: usize,
    low: f64,
    high: f64,
) -> bool {
    let d = finger_to_finger_distance(landmarks, first, second);
    low < d && d < high
}

pub fn is_thumb_near_finger(landmarks: &[Point], finger: usize, low: f64, high: f64) -> bool {
    is_finger_near_finger(landmarks, 1, finger, low, high)
}

/// Center of an axis-aligned bounding box given by its top corner.
pub fn top_corner_to_center(x: i64, y: i64, width: i64, height: i64) -> (i64, i64) {
    (x + width / 2, y + height / 2)
}

/// Half of each image dimension, truncated.
pub fn half_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width * 50 / 100, height * 50 / 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_and_midpoint() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((distance(&a, &b) - 5.0).abs() < 1e-12);
        assert_eq!(midpoint(&a, &b), Point::new(1.5, 2.0));
    }

    #[test]
    fn normalized_landmarks_scale_to_frame() {
        let hands = vec![vec![[0.5, 0.25], [1.0, 1.0]]];
        let pixels = to_pixels(&hands, 640, 480);
        assert_eq!(pixels[0][0], Point::new(320.0, 120.0));
        assert_eq!(pixels[0][1], Point::new(640.0, 480.0));
    }

    #[test]
    fn fingertip_numbering() {
        let mut landmarks = vec![Point::origin(); 21];
        landmarks[4] = Point::new(10.0, 0.0);
        landmarks[8] = Point::new(10.0, 20.0);
        assert_eq!(finger_to_finger_distance(&landmarks, 1, 2), 20.0);
        assert!(is_thumb_near_finger(&landmarks, 2, 0.0, 21.0));
        // Bounds are exclusive on both ends
        assert!(!is_thumb_near_finger(&landmarks, 2, 0.0, 20.0));
        assert!(!is_thumb_near_finger(&landmarks, 2, 20.0, 40.0));
    }

    #[test]
    fn box_center_uses_integer_halves() {
        assert_eq!(top_corner_to_center(10, 20, 5, 7), (12, 23));
        assert_eq!(half_dimensions(641, 480), (320, 240));
    }
}

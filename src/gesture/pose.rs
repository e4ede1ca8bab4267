use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which hand the detector believes it saw
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// One detected hand
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hand {
    pub handedness: Handedness,
    /// Thumb, index, middle, ring, pinky
    pub fingers: [bool; 5],
    /// Landmark points in pixel coordinates
    #[serde(default)]
    pub landmarks: Vec<(i32, i32)>,
}

impl Hand {
    /// Number of raised fingers
    pub fn finger_count(&self) -> usize {
        self.fingers.iter().filter(|up| **up).count()
    }

    /// Floor-mean of all landmark points, `None` without landmarks
    pub fn centroid(&self) -> Option<(i32, i32)> {
        if self.landmarks.is_empty() {
            return None;
        }
        let n = self.landmarks.len() as i64;
        let (sum_x, sum_y) = self
            .landmarks
            .iter()
            .fold((0i64, 0i64), |(sx, sy), (x, y)| (sx + *x as i64, sy + *y as i64));

        Some((sum_x.div_euclid(n) as i32, sum_y.div_euclid(n) as i32))
    }
}

/// Detector output for one frame
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    pub frame_width: u32,
    pub hands: Vec<Hand>,
}

#[derive(Debug, Error)]
pub enum PoseError {
    #[error("Pose source exhausted")]
    Exhausted,

    #[error("Invalid pose replay: {0}")]
    InvalidReplay(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Collaborator that samples hand poses, one call per tick
pub trait PoseSource: Send {
    fn sample(&mut self) -> Result<Sample, PoseError>;
}

/// Source that never detects a hand
#[derive(Debug, Clone, Copy)]
pub struct IdleSource {
    pub frame_width: u32,
}

impl PoseSource for IdleSource {
    fn sample(&mut self) -> Result<Sample, PoseError> {
        Ok(Sample {
            frame_width: self.frame_width,
            hands: Vec::new(),
        })
    }
}

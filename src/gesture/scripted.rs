//! Replay of recorded hand poses
//!
//! Stands in for the camera + landmark detector. A replay file is TOML:
//!
//! ```toml
//! frame_width = 640
//! looped = false
//!
//! [[frames]]
//! repeat = 30
//! hands = [{ handedness = "Right", fingers = [false, true, true, true, true], landmarks = [[320, 240]] }]
//!
//! [[frames]]
//! repeat = 15
//! hands = []
//! ```

use super::pose::{Hand, PoseError, PoseSource, Sample};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayFrame {
    /// Number of consecutive ticks this frame is reported
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default)]
    pub hands: Vec<Hand>,
}

fn default_repeat() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Replay {
    pub frame_width: u32,
    #[serde(default)]
    pub looped: bool,
    #[serde(default)]
    pub frames: Vec<ReplayFrame>,
}

/// [`PoseSource`] that walks through a [`Replay`]
#[derive(Clone, Debug)]
pub struct ScriptedPoseSource {
    replay: Replay,
    frame: usize,
    emitted: u32,
}

impl ScriptedPoseSource {
    pub fn new(replay: Replay) -> Self {
        info!(
            "Scripted pose source with {} frame(s), looped: {}",
            replay.frames.len(),
            replay.looped
        );
        Self {
            replay,
            frame: 0,
            emitted: 0,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PoseError> {
        let replay: Replay =
            toml::from_str(content).map_err(|e| PoseError::InvalidReplay(e.to_string()))?;
        if replay.frame_width == 0 {
            return Err(PoseError::InvalidReplay(
                "frame_width must be positive".to_string(),
            ));
        }
        Ok(Self::new(replay))
    }

    pub async fn load(path: &Path) -> Result<Self, PoseError> {
        debug!("Loading pose replay from {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&content)
    }
}

impl PoseSource for ScriptedPoseSource {
    fn sample(&mut self) -> Result<Sample, PoseError> {
        loop {
            if self.frame >= self.replay.frames.len() {
                if self.replay.looped && self.replay.frames.iter().any(|f| f.repeat > 0) {
                    debug!("Replay finished, starting over");
                    self.frame = 0;
                    self.emitted = 0;
                } else {
                    return Err(PoseError::Exhausted);
                }
            }

            let current = &self.replay.frames[self.frame];
            if self.emitted < current.repeat {
                self.emitted += 1;
                return Ok(Sample {
                    frame_width: self.replay.frame_width,
                    hands: current.hands.clone(),
                });
            }

            self.frame += 1;
            self.emitted = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::pose::Handedness;

    const REPLAY: &str = r#"
frame_width = 640

[[frames]]
repeat = 2
hands = [{ handedness = "Right", fingers = [false, true, true, false, false], landmarks = [[100, 200], [120, 220]] }]

[[frames]]
hands = []
"#;

    #[test]
    fn replays_frames_with_repeat_counts() {
        let mut source = ScriptedPoseSource::from_toml_str(REPLAY).unwrap();

        let first = source.sample().unwrap();
        assert_eq!(first.frame_width, 640);
        assert_eq!(first.hands.len(), 1);
        assert_eq!(first.hands[0].handedness, Handedness::Right);
        assert_eq!(first.hands[0].centroid(), Some((110, 210)));

        assert_eq!(source.sample().unwrap().hands.len(), 1);
        assert!(source.sample().unwrap().hands.is_empty());
        assert!(matches!(source.sample(), Err(PoseError::Exhausted)));
    }

    #[test]
    fn looped_replay_starts_over() {
        let content = format!("looped = true\n{}", REPLAY);
        let mut source = ScriptedPoseSource::from_toml_str(&content).unwrap();

        for _ in 0..3 {
            source.sample().unwrap();
        }
        assert_eq!(source.sample().unwrap().hands.len(), 1);
    }

    #[test]
    fn looped_replay_without_frames_is_exhausted() {
        let mut source =
            ScriptedPoseSource::from_toml_str("frame_width = 640\nlooped = true\n").unwrap();
        assert!(matches!(source.sample(), Err(PoseError::Exhausted)));
    }

    #[test]
    fn rejects_invalid_replay() {
        assert!(matches!(
            ScriptedPoseSource::from_toml_str("frame_width = 0"),
            Err(PoseError::InvalidReplay(_))
        ));
        assert!(matches!(
            ScriptedPoseSource::from_toml_str("frames = 3"),
            Err(PoseError::InvalidReplay(_))
        ));
    }
}

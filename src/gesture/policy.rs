//! Fixed-threshold gesture policy
//!
//! Turns one frame of detected hands into the desired-key set and pulse triggers for
//! the reconciler. Only a single right hand is evaluated; any other combination
//! (no hand, two right hands, left hand only) yields an empty tick, which releases
//! everything that was held.

use super::pose::{Hand, Handedness, Sample};
use crate::actuation::{Key, KeySet};
use crate::config::EngineConfig;

pub const KEY_FORWARD: &str = "w";
pub const KEY_BACKWARD: &str = "s";
pub const KEY_LEFT: &str = "a";
pub const KEY_RIGHT: &str = "d";
pub const KEY_JUMP: &str = "space";

/// Index and middle finger up, everything else down
pub const JUMP_PATTERN: [bool; 5] = [false, true, true, false, false];

const FORWARD_FINGERS: usize = 4;
const BACKWARD_MAX_FINGERS: usize = 1;

/// Decoded gesture flags, mainly for logging
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GestureState {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

/// Policy output for one tick
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickInput {
    pub desired: KeySet,
    pub pulses: Vec<Key>,
    pub state: GestureState,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GesturePolicy {
    /// Fraction of frame width below which the centroid means "left"
    pub left_zone: f64,
    /// Fraction of frame width above which the centroid means "right"
    pub right_zone: f64,
}

impl Default for GesturePolicy {
    fn default() -> Self {
        Self {
            left_zone: 0.35,
            right_zone: 0.65,
        }
    }
}

impl From<&EngineConfig> for GesturePolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            left_zone: config.left_zone,
            right_zone: config.right_zone,
        }
    }
}

impl GesturePolicy {
    pub fn evaluate(&self, sample: &Sample) -> TickInput {
        let mut right_hands = sample
            .hands
            .iter()
            .filter(|hand| hand.handedness == Handedness::Right);

        match (right_hands.next(), right_hands.next()) {
            (Some(hand), None) => self.evaluate_hand(hand, sample.frame_width),
            _ => TickInput::default(),
        }
    }

    fn evaluate_hand(&self, hand: &Hand, frame_width: u32) -> TickInput {
        let mut input = TickInput::default();
        let fingers = hand.finger_count();

        if fingers == FORWARD_FINGERS {
            input.desired.insert(Key::from(KEY_FORWARD));
            input.state.forward = true;
        } else if fingers <= BACKWARD_MAX_FINGERS {
            input.desired.insert(Key::from(KEY_BACKWARD));
            input.state.backward = true;
        }

        if let Some((cx, _)) = hand.centroid() {
            let width = f64::from(frame_width);
            let cx = f64::from(cx);
            if cx < width * self.left_zone {
                input.desired.insert(Key::from(KEY_LEFT));
                input.state.left = true;
            } else if cx > width * self.right_zone {
                input.desired.insert(Key::from(KEY_RIGHT));
                input.state.right = true;
            }
        }

        if hand.fingers == JUMP_PATTERN {
            input.pulses.push(Key::from(KEY_JUMP));
            input.state.jump = true;
        }

        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTH: u32 = 1000;

    fn right(fingers: [bool; 5], cx: i32) -> Hand {
        Hand {
            handedness: Handedness::Right,
            fingers,
            landmarks: vec![(cx, 100), (cx, 300)],
        }
    }

    fn sample(hands: Vec<Hand>) -> Sample {
        Sample {
            frame_width: WIDTH,
            hands,
        }
    }

    fn keys(names: &[&str]) -> KeySet {
        names.iter().map(|k| Key::from(*k)).collect()
    }

    #[test]
    fn four_fingers_centered_is_forward() {
        let input = GesturePolicy::default().evaluate(&sample(vec![right(
            [false, true, true, true, true],
            500,
        )]));

        assert_eq!(input.desired, keys(&[KEY_FORWARD]));
        assert!(input.pulses.is_empty());
        assert!(input.state.forward);
    }

    #[test]
    fn fist_on_the_left_is_backward_left() {
        let input = GesturePolicy::default().evaluate(&sample(vec![right([false; 5], 100)]));

        assert_eq!(input.desired, keys(&[KEY_BACKWARD, KEY_LEFT]));
    }

    #[test]
    fn zone_boundaries_are_exclusive() {
        let policy = GesturePolicy::default();
        let three = [true, true, true, false, false];

        assert!(policy
            .evaluate(&sample(vec![right(three, 350)]))
            .desired
            .is_empty());
        assert!(policy
            .evaluate(&sample(vec![right(three, 650)]))
            .desired
            .is_empty());
        assert_eq!(
            policy.evaluate(&sample(vec![right(three, 651)])).desired,
            keys(&[KEY_RIGHT])
        );
    }

    #[test]
    fn peace_sign_triggers_jump() {
        let input = GesturePolicy::default().evaluate(&sample(vec![right(JUMP_PATTERN, 500)]));

        assert_eq!(input.pulses, vec![Key::from(KEY_JUMP)]);
        assert!(input.desired.is_empty());
        assert!(input.state.jump);
    }

    #[test]
    fn thumb_and_two_fingers_is_not_jump() {
        let input = GesturePolicy::default()
            .evaluate(&sample(vec![right([true, true, true, false, false], 500)]));
        assert!(input.pulses.is_empty());
    }

    #[test]
    fn no_hand_yields_empty_tick() {
        assert_eq!(
            GesturePolicy::default().evaluate(&sample(vec![])),
            TickInput::default()
        );
    }

    #[test]
    fn left_hand_and_multiple_right_hands_are_ignored() {
        let policy = GesturePolicy::default();
        let mut left = right([false; 5], 100);
        left.handedness = Handedness::Left;

        assert!(policy.evaluate(&sample(vec![left.clone()])).desired.is_empty());
        assert!(policy
            .evaluate(&sample(vec![right([false; 5], 100), right([false; 5], 900)]))
            .desired
            .is_empty());
        assert_eq!(
            policy
                .evaluate(&sample(vec![left, right([false; 5], 900)]))
                .desired,
            keys(&[KEY_BACKWARD, KEY_RIGHT])
        );
    }
}

//! Posture classification from the four pressure channels.
//!
//! The cushion reports pressure under the left-front, right-front,
//! left-back and right-back quadrants. Posture is inferred from how the total
//! load is shared between the left/right and front/back halves.

use crate::protocol::types::SensorReading;
use serde::{Deserialize, Serialize};

/// Total pressure at or below this is treated as an empty seat.
pub const MIN_SIT_PRESSURE: u32 = 50;

/// One side carrying more than this share means a crossed leg.
pub const CROSS_LEG_RATIO: f64 = 0.75;

/// One side carrying more than this share means leaning.
pub const LEAN_RATIO: f64 = 0.65;

/// The front half carrying more than this share means leaning forward.
pub const FORWARD_RATIO: f64 = 0.70;

/// Confidence reported for `Normal`, where no single signal dominates.
const NORMAL_CONFIDENCE: f64 = 0.8;

/// Classified body position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureLabel {
    Unseated,
    Normal,
    LeanLeft,
    LeanRight,
    CrossLegLeft,
    CrossLegRight,
    LeanForward,
}

/// How a posture should be presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureSeverity {
    None,
    Good,
    Warn,
    Bad,
}

impl PostureLabel {
    /// Every label a seated user can be in.
    pub const SEATED: [PostureLabel; 6] = [
        PostureLabel::Normal,
        PostureLabel::LeanLeft,
        PostureLabel::LeanRight,
        PostureLabel::CrossLegLeft,
        PostureLabel::CrossLegRight,
        PostureLabel::LeanForward,
    ];

    pub fn is_seated(self) -> bool {
        self != PostureLabel::Unseated
    }

    /// Seated but not sitting properly.
    pub fn is_bad(self) -> bool {
        !matches!(self, PostureLabel::Unseated | PostureLabel::Normal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PostureLabel::Unseated => "unseated",
            PostureLabel::Normal => "normal",
            PostureLabel::LeanLeft => "lean_left",
            PostureLabel::LeanRight => "lean_right",
            PostureLabel::CrossLegLeft => "cross_leg_left",
            PostureLabel::CrossLegRight => "cross_leg_right",
            PostureLabel::LeanForward => "lean_forward",
        }
    }

    pub fn severity(self) -> PostureSeverity {
        match self {
            PostureLabel::Unseated => PostureSeverity::None,
            PostureLabel::Normal => PostureSeverity::Good,
            PostureLabel::LeanLeft | PostureLabel::LeanRight => PostureSeverity::Warn,
            PostureLabel::CrossLegLeft
            | PostureLabel::CrossLegRight
            | PostureLabel::LeanForward => PostureSeverity::Bad,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PostureLabel::Unseated => "Nobody is sitting on the cushion",
            PostureLabel::Normal => "Posture is good, keep it up",
            PostureLabel::LeanLeft => "Weight is shifted to the left side",
            PostureLabel::LeanRight => "Weight is shifted to the right side",
            PostureLabel::CrossLegLeft => "Left leg crossed; prolonged crossing strains the spine",
            PostureLabel::CrossLegRight => {
                "Right leg crossed; prolonged crossing strains the spine"
            }
            PostureLabel::LeanForward => "Leaning too far forward; straighten your back",
        }
    }
}

impl std::fmt::Display for PostureLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostureClassification {
    pub label: PostureLabel,
    pub left_ratio: f64,
    pub right_ratio: f64,
    pub front_ratio: f64,
    pub back_ratio: f64,
    pub total_pressure: u32,
    /// Confidence in the label (0-1)
    pub confidence: f64,
}

impl PostureClassification {
    fn unseated(total_pressure: u32) -> Self {
        Self {
            label: PostureLabel::Unseated,
            left_ratio: 0.0,
            right_ratio: 0.0,
            front_ratio: 0.0,
            back_ratio: 0.0,
            total_pressure,
            confidence: 1.0,
        }
    }
}

/// Classify a reading.
///
/// Rules are checked in a fixed order and the first match wins: crossed legs
/// before forward lean before sideways lean, so the more specific pattern is
/// never masked by a milder one.
pub fn classify(reading: &SensorReading) -> PostureClassification {
    let total = reading.total_pressure();
    if total <= MIN_SIT_PRESSURE {
        return PostureClassification::unseated(total);
    }

    let lf = reading.pressure_left_front as f64;
    let rf = reading.pressure_right_front as f64;
    let lb = reading.pressure_left_back as f64;
    let rb = reading.pressure_right_back as f64;
    let sum = total as f64;

    let left_ratio = (lf + lb) / sum;
    let right_ratio = (rf + rb) / sum;
    let front_ratio = (lf + rf) / sum;
    let back_ratio = (lb + rb) / sum;

    let (label, confidence) = if left_ratio > CROSS_LEG_RATIO {
        (PostureLabel::CrossLegLeft, scaled(left_ratio, CROSS_LEG_RATIO))
    } else if right_ratio > CROSS_LEG_RATIO {
        (PostureLabel::CrossLegRight, scaled(right_ratio, CROSS_LEG_RATIO))
    } else if front_ratio > FORWARD_RATIO {
        (PostureLabel::LeanForward, scaled(front_ratio, FORWARD_RATIO))
    } else if left_ratio > LEAN_RATIO {
        (PostureLabel::LeanLeft, scaled(left_ratio, LEAN_RATIO))
    } else if right_ratio > LEAN_RATIO {
        (PostureLabel::LeanRight, scaled(right_ratio, LEAN_RATIO))
    } else {
        (PostureLabel::Normal, NORMAL_CONFIDENCE)
    };

    PostureClassification {
        label,
        left_ratio,
        right_ratio,
        front_ratio,
        back_ratio,
        total_pressure: total,
        confidence,
    }
}

fn scaled(ratio: f64, threshold: f64) -> f64 {
    (ratio / threshold).min(1.0)
}

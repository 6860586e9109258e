//! Shared data types for aura-motor
//!
//! Difficulty levels and the documents produced by scoring.

use serde::{Deserialize, Serialize};

/// Ordinal difficulty level predicted for a session.
///
/// The numeric class index is the classifier's output space; higher index
/// means more difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorLevel {
    Typical,
    Mild,
    Moderate,
    High,
}

impl MotorLevel {
    /// All levels in class-index order
    pub const ALL: [MotorLevel; 4] = [
        MotorLevel::Typical,
        MotorLevel::Mild,
        MotorLevel::Moderate,
        MotorLevel::High,
    ];

    pub fn from_class(class: usize) -> Option<Self> {
        Self::ALL.get(class).copied()
    }

    pub fn class(self) -> usize {
        self as usize
    }

    /// Short name used in scoring output
    pub fn as_str(self) -> &'static str {
        match self {
            MotorLevel::Typical => "typical",
            MotorLevel::Mild => "mild",
            MotorLevel::Moderate => "moderate",
            MotorLevel::High => "high",
        }
    }

    /// Human-readable name used in the training report
    pub fn description(self) -> &'static str {
        match self {
            MotorLevel::Typical => "Typical interaction performance",
            MotorLevel::Mild => "Mild difficulty",
            MotorLevel::Moderate => "Moderate difficulty",
            MotorLevel::High => "High difficulty",
        }
    }
}

/// Fixed notes attached to every scoring result
pub const SCORING_NOTES: [&str; 2] = [
    "Not a medical diagnosis.",
    "Represents functional interaction performance in this specific task.",
];

/// Motor profile of one scored session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorProfile {
    pub level: MotorLevel,
    /// Probability of the predicted level (0-1, 4 decimals)
    pub confidence: f64,
    /// Aligned latent score (4 decimals)
    pub latent_score: f64,
}

/// Scoring output document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringOutput {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "participantId")]
    pub participant_id: String,
    pub motor_profile: MotorProfile,
    pub notes: Vec<String>,
}

/// Round to 4 decimal places
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_class_mapping() {
        for (i, level) in MotorLevel::ALL.iter().enumerate() {
            assert_eq!(level.class(), i);
            assert_eq!(MotorLevel::from_class(i), Some(*level));
        }
        assert_eq!(MotorLevel::from_class(4), None);
    }

    #[test]
    fn test_level_serializes_snake_case() {
        let json = serde_json::to_string(&MotorLevel::Moderate).unwrap();
        assert_eq!(json, "\"moderate\"");
    }

    #[test]
    fn test_output_keys() {
        let output = ScoringOutput {
            session_id: "S_00001".to_string(),
            participant_id: "P_001".to_string(),
            motor_profile: MotorProfile {
                level: MotorLevel::Mild,
                confidence: 0.8123,
                latent_score: -0.5,
            },
            notes: SCORING_NOTES.iter().map(|s| s.to_string()).collect(),
        };
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["sessionId"], "S_00001");
        assert_eq!(value["participantId"], "P_001");
        assert_eq!(value["motor_profile"]["level"], "mild");
        assert_eq!(value["notes"][0], "Not a medical diagnosis.");
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(-1.00004), -1.0);
    }
}

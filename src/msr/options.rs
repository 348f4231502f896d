//! Immutable configuration for one conversion run

use serde::{Deserialize, Serialize};

/// What to do when a staff receives more regular voices than allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceOverflowPolicy {
    /// Refuse the voice with `TooManyRegularVoices`
    Fail,
    /// Register the voice anyway and record a warning
    Continue,
}

/// Options consumed by the MSR builder
///
/// Passed by value to [`ScoreBuilder::new`](crate::msr::ScoreBuilder::new)
/// and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsrOptions {
    /// Drop a clef equal to the one in force instead of re-stating it
    pub ignore_redundant_clefs: bool,
    pub ignore_redundant_keys: bool,
    pub ignore_redundant_times: bool,

    /// Regular voices allowed per staff
    pub max_regular_voices: usize,
    pub voice_overflow: VoiceOverflowPolicy,

    /// Collapse multiple-rest runs into a single entity
    pub compress_rest_measures: bool,
    /// Display hint used when the source does not say how to print a run
    pub rest_measures_slashes: bool,
}

impl Default for MsrOptions {
    fn default() -> Self {
        Self {
            ignore_redundant_clefs: true,
            ignore_redundant_keys: true,
            ignore_redundant_times: true,
            max_regular_voices: 4,
            voice_overflow: VoiceOverflowPolicy::Fail,
            compress_rest_measures: true,
            rest_measures_slashes: false,
        }
    }
}

impl MsrOptions {
    /// Parse options from JSON, missing fields taking their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = MsrOptions::default();
        assert_eq!(options.max_regular_voices, 4);
        assert_eq!(options.voice_overflow, VoiceOverflowPolicy::Fail);
        assert!(options.ignore_redundant_clefs);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options =
            MsrOptions::from_json(r#"{"max_regular_voices": 2, "voice_overflow": "continue"}"#)
                .unwrap();
        assert_eq!(options.max_regular_voices, 2);
        assert_eq!(options.voice_overflow, VoiceOverflowPolicy::Continue);
        assert!(options.ignore_redundant_keys);
        assert!(options.compress_rest_measures);
    }
}

//! Public API types of the LilyPond generator

use crate::converters::musicxml::musicxml_to_msr::TranslatorSettings;
use crate::msr::Diagnostic;
use serde::{Deserialize, Serialize};

/// Result of a MusicXML to LilyPond conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    /// Generated LilyPond source code
    pub lilypond_source: String,

    /// Everything the translation recorded, in input order
    pub diagnostics: Vec<Diagnostic>,
}

/// Options of the LilyPond output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LilyPondSettings {
    /// Target LilyPond version (e.g., "2.24.0")
    pub target_lilypond_version: String,

    /// Note name language
    pub language: PitchLanguage,

    /// Print runs of empty measures as one multi-measure rest
    pub compress_rest_measures: bool,

    /// Add a `\midi` block to the score
    pub midi: bool,
}

impl Default for LilyPondSettings {
    fn default() -> Self {
        Self {
            target_lilypond_version: "2.24.0".to_string(),
            language: PitchLanguage::Nederlands,
            compress_rest_measures: true,
            midi: false,
        }
    }
}

/// Settings of the whole MusicXML to LilyPond pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    pub translator: TranslatorSettings,
    pub lilypond: LilyPondSettings,
}

impl ConversionSettings {
    /// Parse settings from JSON, missing fields taking their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Note naming language for LilyPond output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchLanguage {
    /// Dutch: c d e f g a b (cis/es for sharps/flats) - LilyPond default
    Nederlands,

    /// English: c d e f g a b (cs/ef for sharps/flats)
    English,
}

impl PitchLanguage {
    /// Name for `\language`
    pub fn lilypond_name(&self) -> &'static str {
        match self {
            PitchLanguage::Nederlands => "nederlands",
            PitchLanguage::English => "english",
        }
    }
}

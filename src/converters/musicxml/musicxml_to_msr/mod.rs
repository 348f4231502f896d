//! MusicXML to MSR translator
//!
//! Reads a MusicXML 3.x/4.0 `score-partwise` document and builds the Music
//! Score Representation from it.
//!
//! # Overview
//!
//! 1. **Parse**: read the XML with roxmltree (zero-copy)
//! 2. **Translate**: walk the tree once, in document order, driving the
//!    [`ScoreBuilder`](crate::msr::ScoreBuilder)
//! 3. **Finish**: close pending measures, repeats and rest runs and hand out
//!    the read-only [`FinishedScore`]
//!
//! Builder errors (duplicate voices, unmatched repeats, ...) abort the run by
//! default. With `abort_on_errors` off they are recorded as diagnostics and
//! the offending element is dropped.
//!
//! # Basic Usage
//!
//! ```ignore
//! use msr_translator::converters::musicxml::musicxml_to_msr::{translate_musicxml, TranslatorSettings};
//!
//! let score = translate_musicxml(musicxml, &TranslatorSettings::default())?;
//! println!("{}", score.diagnostics().summary());
//! ```

pub mod errors;
pub mod parser;
pub mod translator;

pub use errors::{ConversionError, ParseError};

use crate::msr::{FinishedScore, MsrOptions};
use parser::XmlDocument;
use serde::{Deserialize, Serialize};
use std::path::Path;
use translator::Translator;

/// Settings of one MusicXML to MSR translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorSettings {
    /// Options handed to the MSR builder
    pub msr: MsrOptions,
    /// Stop at the first builder error instead of recording it
    pub abort_on_errors: bool,
    /// Treat a backward repeat or an ending with no open repeat as closing
    /// a repeat that starts after the previous one
    pub implicit_initial_repeat_start: bool,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            msr: MsrOptions::default(),
            abort_on_errors: true,
            implicit_initial_repeat_start: true,
        }
    }
}

impl TranslatorSettings {
    /// Parse settings from JSON, missing fields taking their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Translate a MusicXML document into a finished MSR
///
/// # Returns
///
/// * `Ok(FinishedScore)` - the score and the diagnostics recorded on the way
/// * `Err(ConversionError)` - unreadable XML, or a builder error while
///   `abort_on_errors` is set
pub fn translate_musicxml(
    musicxml: &str,
    settings: &TranslatorSettings,
) -> Result<FinishedScore, ConversionError> {
    let document = XmlDocument::parse(musicxml)?;
    let score = Translator::new(&document, settings).translate()?;
    log::info!(
        "MusicXML translated: {}",
        score.diagnostics().summary()
    );
    Ok(score)
}

/// Read a MusicXML file and translate it
pub fn translate_musicxml_file(
    path: impl AsRef<Path>,
    settings: &TranslatorSettings,
) -> Result<FinishedScore, ConversionError> {
    let path = path.as_ref();
    let musicxml = std::fs::read_to_string(path).map_err(|e| ConversionError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    translate_musicxml(&musicxml, settings)
}

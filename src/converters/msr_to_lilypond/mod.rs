//! MSR to LilyPond generator
//!
//! Turns a finished MSR into LilyPond 2.24+ source code.
//!
//! # Overview
//!
//! 1. **Walk**: browse the score with a visitor writing staff groups,
//!    staves and voices (`lilypond.rs`)
//! 2. **Render**: wrap the music in a document template carrying version,
//!    language and header (`templates.rs`)
//!
//! Combined with the MusicXML translator this gives the full pipeline:
//!
//! ```ignore
//! use msr_translator::converters::msr_to_lilypond::convert_musicxml_to_lilypond;
//!
//! let result = convert_musicxml_to_lilypond(musicxml, None)?;
//! println!("{}", result.lilypond_source);
//! ```

pub mod lilypond;
pub mod templates;
pub mod types;

pub use types::{ConversionResult, ConversionSettings, LilyPondSettings, PitchLanguage};

use crate::converters::musicxml::musicxml_to_msr::{translate_musicxml, ConversionError};
use crate::msr::FinishedScore;
use lilypond::{escape_lilypond_string, generate_staves};
use templates::{render_lilypond, LilyPondTemplate, TemplateContext};

/// Generate a complete LilyPond document from a finished score
///
/// The full score template is used when the score has a title or a
/// composer, the minimal one otherwise.
pub fn generate_lilypond_document(
    score: &FinishedScore,
    settings: &LilyPondSettings,
) -> Result<String, ConversionError> {
    let staves = generate_staves(score, settings);

    let identification = &score.score().identification;
    let title = identification.title().map(escape_lilypond_string);
    let composer = identification.composer().map(escape_lilypond_string);
    let template = if title.is_some() || composer.is_some() {
        LilyPondTemplate::Score
    } else {
        LilyPondTemplate::Minimal
    };

    let context = TemplateContext::builder(
        settings.target_lilypond_version.clone(),
        settings.language.lilypond_name().to_string(),
        staves,
    )
    .title(title)
    .composer(composer)
    .midi(settings.midi)
    .build();

    render_lilypond(template, &context).map_err(|e| {
        log::error!("Template rendering failed: {}", e);
        ConversionError::InternalError(format!("template rendering failed: {}", e))
    })
}

/// Convert a MusicXML document to LilyPond source code
///
/// # Arguments
///
/// * `musicxml` - MusicXML 3.x/4.0 document as string
/// * `settings` - Optional conversion settings (uses defaults if None)
///
/// # Returns
///
/// * `Ok(ConversionResult)` - LilyPond source and the translation diagnostics
/// * `Err(ConversionError)` - Fatal error preventing output generation
pub fn convert_musicxml_to_lilypond(
    musicxml: &str,
    settings: Option<ConversionSettings>,
) -> Result<ConversionResult, ConversionError> {
    let settings = settings.unwrap_or_default();
    let score = translate_musicxml(musicxml, &settings.translator)?;
    let lilypond_source = generate_lilypond_document(&score, &settings.lilypond)?;

    Ok(ConversionResult {
        lilypond_source,
        diagnostics: score.diagnostics().entries().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNTITLED: &str = r#"<?xml version="1.0"?>
<score-partwise version="4.0">
  <part-list>
    <score-part id="P1"><part-name>Violin</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>1</divisions>
        <key><fifths>-1</fifths></key>
        <time><beats>3</beats><beat-type>4</beat-type></time>
        <clef><sign>G</sign><line>2</line></clef>
      </attributes>
      <note><pitch><step>B</step><alter>-1</alter><octave>4</octave></pitch><duration>3</duration><type>half</type><dot/></note>
    </measure>
  </part>
</score-partwise>"#;

    #[test]
    fn test_untitled_score_uses_minimal_template() {
        let result = convert_musicxml_to_lilypond(UNTITLED, None).unwrap();
        let source = &result.lilypond_source;

        assert!(source.contains("\\version \"2.24.0\""));
        assert!(source.contains("\\language \"nederlands\""));
        assert!(!source.contains("\\header"));
        assert!(source.contains("instrumentName = \"Violin\""));
        assert!(source.contains("\\key f \\major"));
        assert!(source.contains("\\time 3/4"));
        assert!(source.contains("bes'2. |"));
    }

    #[test]
    fn test_english_note_names() {
        let settings = ConversionSettings {
            lilypond: LilyPondSettings {
                language: PitchLanguage::English,
                ..LilyPondSettings::default()
            },
            ..ConversionSettings::default()
        };
        let result = convert_musicxml_to_lilypond(UNTITLED, Some(settings)).unwrap();
        assert!(result.lilypond_source.contains("\\language \"english\""));
        assert!(result.lilypond_source.contains("bf'2. |"));
    }

    #[test]
    fn test_invalid_xml_is_fatal() {
        let error = convert_musicxml_to_lilypond("<score-partwise>", None).unwrap_err();
        assert!(matches!(error, ConversionError::ParseError(_)));
    }
}

//! Format converters
//!
//! MusicXML is read into the MSR by `musicxml::musicxml_to_msr`; the MSR is
//! written out as LilyPond by `msr_to_lilypond`.

pub mod msr_to_lilypond;
pub mod musicxml;

// Re-export for convenience
pub use msr_to_lilypond::{
    convert_musicxml_to_lilypond, generate_lilypond_document, ConversionResult,
    ConversionSettings, LilyPondSettings, PitchLanguage,
};
pub use musicxml::{
    translate_musicxml, translate_musicxml_file, ConversionError, ParseError, TranslatorSettings,
};

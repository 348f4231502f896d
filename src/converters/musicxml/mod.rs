//! MusicXML format converters
//!
//! This module contains converters for MusicXML format.

pub mod musicxml_to_msr;

// Re-export for convenience
pub use musicxml_to_msr::{
    translate_musicxml,
    translate_musicxml_file,
    ConversionError,
    ParseError,
    TranslatorSettings,
};

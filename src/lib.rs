//! MSR Translator WASM Module
//!
//! Builds a Music Score Representation (MSR) from MusicXML and writes it out
//! as LilyPond.
//!
//! - `msr`: the score tree, its builder and read-only visitor
//! - `converters`: MusicXML to MSR translator and MSR to LilyPond generator
//! - `api`: JavaScript-facing entry points

pub mod msr;
pub mod converters;
pub mod api;

// Re-export commonly used types
pub use converters::{
    convert_musicxml_to_lilypond, generate_lilypond_document, translate_musicxml,
    translate_musicxml_file, ConversionError, ConversionResult, ConversionSettings,
    LilyPondSettings, PitchLanguage, TranslatorSettings,
};
pub use msr::{Duration, FinishedScore, MsrOptions, ScoreBuilder};

use wasm_bindgen::prelude::*;

// This is like the `main` function, but for WASM modules.
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(feature = "console_log")]
    if console_log::init_with_level(log::Level::Debug).is_err() {
        return;
    }

    log::info!("MSR translator WASM module initialized");
}

//! WASM API
//!
//! JavaScript-facing entry points of the translator.
//!
//! # Module Structure
//!
//! - `helpers`: serialization, settings parsing, error handling and logging
//! - `export`: MusicXML conversion functions

pub mod helpers;
pub mod export;

pub use export::{convert_musicxml_to_lilypond, describe_musicxml};

//! Conversion functions exposed to JavaScript

use crate::api::helpers::{js_error, parse_settings, serialize, to_json};
use crate::converters::musicxml::musicxml_to_msr::{translate_musicxml, TranslatorSettings};
use crate::converters::{convert_musicxml_to_lilypond as convert, ConversionSettings};
use crate::msr::ScoreSummary;
use crate::{wasm_info, wasm_log};
use wasm_bindgen::prelude::*;

/// Convert MusicXML to LilyPond source code
///
/// # Parameters
/// - `musicxml`: MusicXML 3.x/4.0 `score-partwise` document
/// - `settings_json`: optional JSON settings, every field optional
///
/// # Settings JSON Format
/// ```json
/// {
///   "translator": {
///     "abort_on_errors": true,
///     "implicit_initial_repeat_start": true,
///     "msr": { "ignore_redundant_clefs": true }
///   },
///   "lilypond": {
///     "target_lilypond_version": "2.24.0",
///     "language": "nederlands",
///     "compress_rest_measures": true,
///     "midi": false
///   }
/// }
/// ```
///
/// # Returns
/// JSON string with `lilypond_source` and `diagnostics`
#[wasm_bindgen(js_name = convertMusicXMLToLilyPond)]
pub fn convert_musicxml_to_lilypond(
    musicxml: String,
    settings_json: Option<String>,
) -> Result<String, JsValue> {
    wasm_info!("convertMusicXMLToLilyPond called ({} bytes)", musicxml.len());

    let settings: ConversionSettings =
        parse_settings(settings_json.as_deref()).map_err(js_error)?;

    let result = convert(&musicxml, Some(settings))
        .map_err(|e| js_error(format!("Conversion error: {}", e)))?;

    let result_json = to_json(&result, "Result serialization error").map_err(js_error)?;

    wasm_info!("  LilyPond generated: {} bytes", result.lilypond_source.len());
    if !result.diagnostics.is_empty() {
        wasm_log!("  {} diagnostics during conversion", result.diagnostics.len());
    }
    Ok(result_json)
}

/// Translate MusicXML and describe the resulting score
///
/// Returns parts, staves and voices with their measure and note counts.
#[wasm_bindgen(js_name = describeMusicXML)]
pub fn describe_musicxml(musicxml: String, settings_json: Option<String>) -> Result<JsValue, JsValue> {
    wasm_info!("describeMusicXML called ({} bytes)", musicxml.len());

    let settings: TranslatorSettings =
        parse_settings(settings_json.as_deref()).map_err(js_error)?;
    let score = translate_musicxml(&musicxml, &settings)
        .map_err(|e| js_error(format!("Translation error: {}", e)))?;

    let summary = ScoreSummary::of(&score);
    wasm_log!("  {} voices in {} parts", summary.voice_count(), summary.parts.len());
    serialize(&summary, "Summary serialization error")
}

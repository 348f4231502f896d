//! Shared helpers for WASM API operations
//!
//! Serialization, settings parsing and error conversion used by every
//! exported function. Logging goes through the `log` crate, which the
//! start hook routes to the browser console.

use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::prelude::*;

// ============================================================================
// Logging Macros
// ============================================================================

/// Log a debug message with [WASM] prefix
#[macro_export]
macro_rules! wasm_log {
    ($($arg:tt)*) => {
        log::debug!("[WASM] {}", format!($($arg)*))
    };
}

/// Log an info message with [WASM] prefix
#[macro_export]
macro_rules! wasm_info {
    ($($arg:tt)*) => {
        log::info!("[WASM] {}", format!($($arg)*))
    };
}

/// Log a warning message with [WASM] prefix
#[macro_export]
macro_rules! wasm_warn {
    ($($arg:tt)*) => {
        log::warn!("[WASM] {}", format!($($arg)*))
    };
}

/// Log an error message with [WASM] prefix
#[macro_export]
macro_rules! wasm_error {
    ($($arg:tt)*) => {
        log::error!("[WASM] {}", format!($($arg)*))
    };
}

// ============================================================================
// Serialization/Deserialization Helpers
// ============================================================================

/// Serialize a value to JavaScript with automatic error handling
pub fn serialize<T: Serialize>(value: &T, error_context: &str) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| js_error(format!("{}: {}", error_context, e)))
}

/// Serialize a value to a JSON string
pub fn to_json<T: Serialize>(value: &T, error_context: &str) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("{}: {}", error_context, e))
}

/// Parse optional settings JSON, falling back to the defaults
pub fn parse_settings<T: DeserializeOwned + Default>(json: Option<&str>) -> Result<T, String> {
    match json.map(str::trim) {
        None | Some("") => Ok(T::default()),
        Some(json) => {
            serde_json::from_str(json).map_err(|e| format!("Settings parse error: {}", e))
        }
    }
}

// ============================================================================
// Result Conversion Helpers
// ============================================================================

/// Log an error and turn it into a JsValue
pub fn js_error(msg: impl Into<String>) -> JsValue {
    let msg = msg.into();
    wasm_error!("{}", msg);
    JsValue::from_str(&msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::ConversionSettings;
    use crate::converters::PitchLanguage;

    #[test]
    fn test_missing_settings_take_defaults() {
        let settings: ConversionSettings = parse_settings(None).unwrap();
        assert_eq!(settings, ConversionSettings::default());
        let settings: ConversionSettings = parse_settings(Some("  ")).unwrap();
        assert_eq!(settings, ConversionSettings::default());
    }

    #[test]
    fn test_partial_settings() {
        let settings: ConversionSettings =
            parse_settings(Some(r#"{"lilypond": {"language": "english"}}"#)).unwrap();
        assert_eq!(settings.lilypond.language, PitchLanguage::English);
        assert!(settings.translator.abort_on_errors);
    }

    #[test]
    fn test_malformed_settings() {
        let error = parse_settings::<ConversionSettings>(Some("{not json")).unwrap_err();
        assert!(error.starts_with("Settings parse error"));
    }

    #[test]
    fn test_to_json() {
        let json = to_json(&vec![1, 2], "numbers").unwrap();
        assert_eq!(json, "[1,2]");
    }
}

// Speech request configuration
use serde::{Deserialize, Serialize};

/// Options recognized by the speech endpoint.
///
/// Every optional field is omitted from the request when unset; the
/// endpoint then applies its own defaults. This replaces ad-hoc request
/// assembly with one named place where every knob is enumerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Model identifier, e.g. "gemini-2.5-flash-preview-tts"
    pub model: String,
    /// Prebuilt voice name, e.g. "Kore" or "Puck"
    pub voice: Option<String>,
    /// BCP-47 language code, e.g. "en-US"
    pub language: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-preview-tts".to_string(),
            voice: None,
            language: None,
        }
    }
}

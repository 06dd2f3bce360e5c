// HTTP client for the generative language speech endpoint
// Assembles generateContent requests and extracts the inline audio payload

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::decoder::{decode_base64, decode_pcm16, AudioBuffer, SYNTH_SAMPLE_RATE};
use crate::error::{Error, Result};
use crate::speech::config::SpeechConfig;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// The endpoint reports "audio/L16;codec=pcm;rate=24000"; the pipeline
// assumes mono rather than parsing the mime string.
const SYNTH_CHANNELS: usize = 1;

/// Client for the `models/{model}:generateContent` speech endpoint.
pub struct SpeechClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SpeechClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the endpoint base URL (for proxies and tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Request synthesized speech for `text` and decode the inline PCM16
    /// payload into an [`AudioBuffer`].
    ///
    /// Transport failures, non-success statuses and responses without an
    /// audio part all surface as [`Error::Upstream`]. There is no retry.
    pub async fn synthesize(&self, text: &str, config: &SpeechConfig) -> Result<AudioBuffer> {
        let url = format!("{}/models/{}:generateContent", self.base_url, config.model);
        let request = GenerateContentRequest::speech(text, config);
        debug!(model = %config.model, chars = text.len(), "requesting speech synthesis");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "endpoint returned {}: {}",
                status, body
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("unreadable response body: {}", e)))?;

        let blob = body
            .audio_payload()
            .ok_or_else(|| Error::Upstream("response contained no audio payload".to_string()))?;

        let bytes = decode_base64(&blob.data)?;
        decode_pcm16(&bytes, SYNTH_SAMPLE_RATE, SYNTH_CHANNELS)
    }
}

// ===== Wire types (camelCase per the REST API) =====

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    fn speech(text: &str, config: &SpeechConfig) -> Self {
        let speech_config =
            if config.voice.is_some() || config.language.is_some() {
                Some(SpeechConfigWire {
                    voice_config: config.voice.as_ref().map(|name| VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: name.clone() },
                    }),
                    language_code: config.language.clone(),
                })
            } else {
                None
            };

        Self {
            contents: vec![Content {
                parts: vec![Part::Text { text: text.to_string() }],
                role: None,
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfigWire>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfigWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_config: Option<VoiceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// First inline-data blob in the first candidate, if any
    fn audio_payload(&self) -> Option<&Blob> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|content| {
                content.parts.iter().find_map(|part| match part {
                    Part::InlineData { inline_data } => Some(inline_data),
                    _ => None,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let config = SpeechConfig {
            model: "gemini-2.5-flash-preview-tts".to_string(),
            voice: Some("Kore".to_string()),
            language: Some("en-US".to_string()),
        };
        let request = GenerateContentRequest::speech("hello", &config);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            json["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Kore"
        );
        assert_eq!(
            json["generationConfig"]["speechConfig"]["languageCode"],
            "en-US"
        );
    }

    #[test]
    fn test_request_omits_unset_options() {
        let request = GenerateContentRequest::speech("hi", &SpeechConfig::default());
        let json = serde_json::to_value(&request).unwrap();

        assert!(json["generationConfig"].get("speechConfig").is_none());
        assert!(json["contents"][0].get("role").is_none());
    }

    #[test]
    fn test_response_audio_extraction() {
        let body = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "inlineData": {
                            "mimeType": "audio/L16;codec=pcm;rate=24000",
                            "data": "AAAAgA=="
                        }
                    }]
                }
            }]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(body).unwrap();
        let blob = response.audio_payload().unwrap();
        assert_eq!(blob.mime_type, "audio/L16;codec=pcm;rate=24000");

        // "AAAAgA==" decodes to samples [0, -32768]
        let bytes = decode_base64(&blob.data).unwrap();
        let buffer = decode_pcm16(&bytes, SYNTH_SAMPLE_RATE, SYNTH_CHANNELS).unwrap();
        assert_eq!(buffer.plane(0), &[0.0, -1.0]);
    }

    #[test]
    fn test_response_without_audio() {
        let body = r#"{
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "cannot comply" }] }
            }]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(body).unwrap();
        assert!(response.audio_payload().is_none());

        let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.audio_payload().is_none());
    }
}

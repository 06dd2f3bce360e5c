// Voicebox - text-to-speech decode and playback pipeline
//
// Pipeline: base64 payload -> bytes -> little-endian i16 -> normalized
// f32 channel planes -> single-session playback on the output device.
// Audio is fetched from a Gemini-style generateContent endpoint; at most
// one playback session is live at a time.

pub mod audio;
pub mod error;
pub mod speech;

pub use audio::{decode_base64, decode_pcm16, AudioBuffer, PlaybackSession, Player, SYNTH_SAMPLE_RATE};
pub use error::{Error, Result};
pub use speech::{RequestState, SpeakOutcome, SpeechClient, SpeechConfig, SpeechService};

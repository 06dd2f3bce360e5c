// Audio pipeline module
// PCM16 decoding plus cpal-backed single-session playback

pub mod decoder;
pub mod output;
pub mod player;

pub use decoder::{decode_base64, decode_pcm16, AudioBuffer, SYNTH_SAMPLE_RATE};
pub use output::{AudioOutput, SampleSink};
pub use player::{PlaybackSession, Player};

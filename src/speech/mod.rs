// Speech synthesis module
// Request assembly against the generative API plus playback orchestration

pub mod client;
pub mod config;
pub mod service;

pub use client::SpeechClient;
pub use config::SpeechConfig;
pub use service::{RequestState, SpeakOutcome, SpeechService, Synthesizer};

// Error taxonomy for the decode/playback pipeline
use thiserror::Error;

/// Errors surfaced by the voicebox pipeline.
///
/// Decode and parameter errors are synchronous; upstream errors come back
/// from the async API call. None of these are fatal — every error is
/// recoverable at single-request granularity.
#[derive(Debug, Error)]
pub enum Error {
    /// The audio payload was not valid standard-alphabet base64.
    #[error("invalid base64 audio payload: {0}")]
    Decode(String),

    /// A decode parameter (sample rate, channel count) was out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The generative API call failed or returned no audio payload.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// The audio output device or stream failed.
    #[error("audio output error: {0}")]
    Output(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// Decode-then-play orchestration
// Tracks explicit request state and discards stale completions

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::audio::decoder::AudioBuffer;
use crate::audio::player::{PlaybackSession, Player};
use crate::error::Result;
use crate::speech::client::SpeechClient;
use crate::speech::config::SpeechConfig;

/// State of the most recent speech request.
///
/// UI surfaces that only need a trigger gate can disable on `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Pending,
    Completed,
    Failed,
}

/// What became of a `speak` call once its synthesis resolved.
#[derive(Debug)]
pub enum SpeakOutcome {
    /// The synthesized audio was started; holds the playback session.
    Played(PlaybackSession),
    /// A newer request was issued while this one was in flight; its audio
    /// was discarded without touching the player.
    Superseded,
}

/// Source of synthesized audio.
///
/// [`crate::speech::SpeechClient`] is the real implementation; tests
/// substitute their own to drive the state machine without a network.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, config: &SpeechConfig) -> Result<AudioBuffer>;
}

#[async_trait]
impl Synthesizer for SpeechClient {
    async fn synthesize(&self, text: &str, config: &SpeechConfig) -> Result<AudioBuffer> {
        SpeechClient::synthesize(self, text, config).await
    }
}

/// Orchestrates synthesize-then-play with single-request semantics.
///
/// Each `speak` call takes a monotonic sequence ticket. A completion whose
/// ticket is no longer the newest is discarded instead of superseding
/// fresher audio, so output order follows request order even when network
/// completions arrive out of order.
pub struct SpeechService<S> {
    synthesizer: S,
    player: Arc<Player>,
    config: SpeechConfig,
    state: Mutex<RequestState>,
    seq: AtomicU64,
}

impl<S: Synthesizer> SpeechService<S> {
    pub fn new(synthesizer: S, player: Arc<Player>, config: SpeechConfig) -> Self {
        Self {
            synthesizer,
            player,
            config,
            state: Mutex::new(RequestState::Idle),
            seq: AtomicU64::new(0),
        }
    }

    /// State of the most recent request
    pub fn state(&self) -> RequestState {
        *self.state.lock()
    }

    /// Synthesize `text` and play it, superseding any live playback.
    ///
    /// No queuing and no retry; a failed request leaves the previous
    /// audio playing and the state at `Failed` until re-issued.
    pub async fn speak(&self, text: &str) -> Result<SpeakOutcome> {
        let ticket = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.lock() = RequestState::Pending;
        debug!(ticket, "speech request issued");

        match self.synthesizer.synthesize(text, &self.config).await {
            Ok(buffer) => {
                if self.seq.load(Ordering::SeqCst) != ticket {
                    // A newer request owns the state now; leave it alone
                    info!(ticket, "discarding stale synthesis result");
                    return Ok(SpeakOutcome::Superseded);
                }

                let session = self.player.play(buffer)?;
                *self.state.lock() = RequestState::Completed;
                Ok(SpeakOutcome::Played(session))
            }
            Err(e) => {
                if self.seq.load(Ordering::SeqCst) == ticket {
                    *self.state.lock() = RequestState::Failed;
                }
                Err(e)
            }
        }
    }
}

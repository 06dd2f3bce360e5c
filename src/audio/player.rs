// Playback controller
// Owns the output sink and enforces at-most-one live playback session

use parking_lot::Mutex;
use rubato::Resampler;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::audio::decoder::AudioBuffer;
use crate::audio::output::{AudioOutput, SampleSink};
use crate::error::{Error, Result};

const FEED_CHUNK: usize = 1024;

/// Handle to one playback of a decoded buffer.
///
/// Cheap to clone; all clones refer to the same session. Stopping a
/// session whose audio already finished is a no-op, not an error.
#[derive(Clone, Debug)]
pub struct PlaybackSession {
    id: u64,
    cancel: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

impl PlaybackSession {
    /// Request the session to stop. Best-effort and idempotent.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether this session is still playing
    pub fn is_active(&self) -> bool {
        !self.done.load(Ordering::SeqCst) && !self.cancel.load(Ordering::SeqCst)
    }

    /// Identifier of this session, unique per player
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Single-session playback over one owned output sink.
///
/// Starting a new playback stops whichever session is live at that moment;
/// there is no queuing. `close()` releases the output context and is
/// idempotent.
pub struct Player {
    sink: Mutex<Option<Arc<dyn SampleSink>>>,
    current: Mutex<Option<PlaybackSession>>,
    next_id: AtomicU64,
}

impl Player {
    /// Acquire the default audio output (24 kHz preferred)
    pub fn new() -> Result<Self> {
        let output = AudioOutput::new()?;
        Ok(Self::with_sink(Arc::new(output)))
    }

    /// Build a player over a custom sink
    pub fn with_sink(sink: Arc<dyn SampleSink>) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
            current: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Start playing a decoded buffer, superseding any live session.
    ///
    /// The previous session is stopped first and queued samples are
    /// dropped, so the new audio starts immediately. Last caller to reach
    /// this method wins.
    pub fn play(&self, buffer: AudioBuffer) -> Result<PlaybackSession> {
        if buffer.channels() == 0 {
            return Err(Error::InvalidParameter(
                "buffer has no channels".to_string(),
            ));
        }

        let sink = self
            .sink
            .lock()
            .clone()
            .ok_or_else(|| Error::Output("player is closed".to_string()))?;

        // Stop whatever is live right now; a finished session ignores this
        if let Some(prev) = self.current.lock().take() {
            prev.stop();
        }
        sink.clear();

        let session = PlaybackSession {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            cancel: Arc::new(AtomicBool::new(false)),
            done: Arc::new(AtomicBool::new(false)),
        };
        debug!(
            session = session.id,
            frames = buffer.frames(),
            "starting playback"
        );

        let feeder = session.clone();
        thread::spawn(move || feed(sink, buffer, feeder));

        *self.current.lock() = Some(session.clone());
        Ok(session)
    }

    /// Stop the current session, if any
    pub fn stop(&self) {
        if let Some(session) = self.current.lock().take() {
            session.stop();
        }
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.clear();
        }
    }

    /// Whether a session is currently playing
    pub fn is_playing(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map(|s| s.is_active())
            .unwrap_or(false)
    }

    /// Set the output volume (0.0 to 1.0)
    pub fn set_volume(&self, volume: f32) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.set_volume(volume);
        }
    }

    /// Release the output context. Calling twice is a no-op.
    pub fn close(&self) {
        self.stop();
        self.sink.lock().take();
    }
}

/// Feed one buffer into the sink until it is consumed or the session is
/// stopped, then mark the session done.
fn feed(sink: Arc<dyn SampleSink>, buffer: AudioBuffer, session: PlaybackSession) {
    let samples = prepare(&buffer, sink.sample_rate(), sink.channels() as usize);

    let mut remaining = samples.as_slice();
    while !remaining.is_empty() && !session.cancel.load(Ordering::SeqCst) {
        let take = remaining.len().min(FEED_CHUNK);
        let written = sink.write(&remaining[..take]);
        if written > 0 {
            remaining = &remaining[written..];
        } else {
            // Ring buffer full, wait for the device to drain a little
            thread::sleep(Duration::from_millis(1));
        }
    }

    // Written does not mean heard: wait for the device side to drain
    while sink.pending() > 0 && !session.cancel.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    session.done.store(true, Ordering::SeqCst);
}

/// Resample to the device rate if needed and interleave to the device
/// channel layout. Mono buffers are duplicated across output channels;
/// excess source channels are dropped.
fn prepare(buffer: &AudioBuffer, device_rate: u32, device_channels: usize) -> Vec<f32> {
    let planes = if buffer.sample_rate() != device_rate {
        resample(buffer.planes(), buffer.sample_rate(), device_rate)
    } else {
        buffer.planes().to_vec()
    };

    let frames = planes.first().map(|p| p.len()).unwrap_or(0);
    let src_channels = planes.len();
    let mut interleaved = Vec::with_capacity(frames * device_channels);

    for frame in 0..frames {
        for ch in 0..device_channels {
            let plane = &planes[ch.min(src_channels - 1)];
            interleaved.push(plane[frame]);
        }
    }

    interleaved
}

fn resample(planes: &[Vec<f32>], from_rate: u32, to_rate: u32) -> Vec<Vec<f32>> {
    let ratio = to_rate as f64 / from_rate as f64;
    let channels = planes.len();

    let mut resampler = match rubato::FastFixedIn::<f32>::new(
        ratio,
        10.,
        rubato::PolynomialDegree::Septic,
        FEED_CHUNK,
        channels,
    ) {
        Ok(r) => r,
        Err(e) => {
            // Fall back to the un-resampled audio (plays pitch-shifted)
            tracing::warn!("resampler init failed: {}", e);
            return planes.to_vec();
        }
    };

    let frames = planes.first().map(|p| p.len()).unwrap_or(0);
    let mut out: Vec<Vec<f32>> = vec![Vec::new(); channels];
    let mut pos = 0;

    while pos < frames {
        // Final short chunk is zero-padded to the fixed input size
        let end = (pos + FEED_CHUNK).min(frames);
        let chunk: Vec<Vec<f32>> = planes
            .iter()
            .map(|p| {
                let mut c = p[pos..end].to_vec();
                c.resize(FEED_CHUNK, 0.0);
                c
            })
            .collect();

        if let Ok(output) = resampler.process(&chunk, None) {
            for (ch, plane) in output.into_iter().enumerate() {
                out[ch].extend_from_slice(&plane);
            }
        }
        pos = end;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::decode_pcm16;
    use std::sync::atomic::AtomicUsize;

    /// Sink that accepts a bounded number of samples and never drains,
    /// keeping sessions alive until they are stopped.
    struct StalledSink {
        accepted: AtomicUsize,
        capacity: usize,
    }

    impl StalledSink {
        fn new(capacity: usize) -> Self {
            Self { accepted: AtomicUsize::new(0), capacity }
        }
    }

    impl SampleSink for StalledSink {
        fn write(&self, samples: &[f32]) -> usize {
            let used = self.accepted.load(Ordering::SeqCst);
            let take = samples.len().min(self.capacity.saturating_sub(used));
            self.accepted.fetch_add(take, Ordering::SeqCst);
            take
        }

        fn clear(&self) {}

        fn pending(&self) -> usize {
            self.accepted.load(Ordering::SeqCst)
        }

        fn sample_rate(&self) -> u32 {
            24000
        }

        fn channels(&self) -> u16 {
            1
        }
    }

    /// Sink that swallows everything immediately, so sessions finish fast.
    struct DrainedSink;

    impl SampleSink for DrainedSink {
        fn write(&self, samples: &[f32]) -> usize {
            samples.len()
        }

        fn clear(&self) {}

        fn pending(&self) -> usize {
            0
        }

        fn sample_rate(&self) -> u32 {
            24000
        }

        fn channels(&self) -> u16 {
            1
        }
    }

    fn tone_buffer(frames: usize) -> AudioBuffer {
        let bytes: Vec<u8> = (0..frames)
            .flat_map(|i| ((i % 100) as i16 * 300).to_le_bytes())
            .collect();
        decode_pcm16(&bytes, 24000, 1).unwrap()
    }

    fn wait_until<F: Fn() -> bool>(cond: F) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached within timeout");
    }

    #[test]
    fn test_play_twice_supersedes_first() {
        let player = Player::with_sink(Arc::new(StalledSink::new(256)));

        let first = player.play(tone_buffer(48000)).unwrap();
        let second = player.play(tone_buffer(48000)).unwrap();

        // The first session was stopped when the second started
        assert!(!first.is_active());
        assert!(second.is_active());
        assert!(player.is_playing());
        assert_ne!(first.id(), second.id());

        player.stop();
        assert!(!second.is_active());
        assert!(!player.is_playing());
    }

    #[test]
    fn test_stop_after_natural_finish_is_noop() {
        let player = Player::with_sink(Arc::new(DrainedSink));

        let session = player.play(tone_buffer(512)).unwrap();
        wait_until(|| !session.is_active());

        // Already finished: stopping again must not panic or error
        session.stop();
        player.stop();
        assert!(!player.is_playing());
    }

    #[test]
    fn test_close_is_idempotent() {
        let player = Player::with_sink(Arc::new(DrainedSink));
        player.close();
        player.close();

        assert!(matches!(
            player.play(tone_buffer(16)),
            Err(Error::Output(_))
        ));
    }

    #[test]
    fn test_prepare_duplicates_mono_to_stereo() {
        let buffer = decode_pcm16(&[0x00, 0x40, 0x00, 0xc0], 24000, 1).unwrap();
        let interleaved = prepare(&buffer, 24000, 2);
        assert_eq!(interleaved, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_prepare_resamples_to_device_rate() {
        let buffer = tone_buffer(24000); // one second at 24kHz
        let interleaved = prepare(&buffer, 48000, 1);
        // Doubling the rate should roughly double the frame count
        let got = interleaved.len() as f64;
        assert!((got - 48000.0).abs() < 4096.0, "got {} frames", got);
    }
}

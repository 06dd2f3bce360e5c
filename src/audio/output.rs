// Audio output using cpal
// The stream lives on its own thread (cpal streams are not Send); the
// rest of the crate only touches the ring-buffer producer

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::audio::decoder::SYNTH_SAMPLE_RATE;
use crate::error::{Error, Result};

const RING_BUFFER_FRAMES: usize = 24000 / 4; // ~250ms per channel at 24kHz

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Destination for interleaved f32 samples.
///
/// [`AudioOutput`] is the cpal-backed implementation; tests substitute
/// their own so session bookkeeping runs without audio hardware.
pub trait SampleSink: Send + Sync {
    /// Write samples, returning how many were accepted.
    fn write(&self, samples: &[f32]) -> usize;

    /// Drop any queued samples.
    fn clear(&self);

    /// Samples written but not yet consumed by the device.
    fn pending(&self) -> usize;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Number of output channels.
    fn channels(&self) -> u16;

    /// Set the output volume (0.0 to 1.0). Default: no-op.
    fn set_volume(&self, _volume: f32) {}
}

/// The one audio output context: a cpal stream pulling from a ring buffer.
///
/// Opened at 24000 Hz when the device supports it; otherwise the device's
/// default config is used and callers resample. Released when dropped.
pub struct AudioOutput {
    producer: Arc<Mutex<RingProducer>>,
    sample_rate: u32,
    channels: u16,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AudioOutput {
    /// Open the default output device, preferring a 24 kHz stream
    pub fn new() -> Result<Self> {
        let volume = Arc::new(Mutex::new(1.0f32));
        let clear_flag = Arc::new(AtomicBool::new(false));
        let queued = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (tx, rx) = mpsc::channel();
        let thread = {
            let volume = volume.clone();
            let clear_flag = clear_flag.clone();
            let queued = queued.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || run_output_thread(tx, volume, clear_flag, queued, shutdown))
                .map_err(|e| Error::Output(format!("failed to spawn output thread: {}", e)))?
        };

        // The thread reports back once the stream is running
        match rx.recv() {
            Ok(Ok((producer, sample_rate, channels))) => Ok(Self {
                producer: Arc::new(Mutex::new(producer)),
                sample_rate,
                channels,
                volume,
                clear_flag,
                queued,
                shutdown,
                thread: Some(thread),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Output("audio output thread died during setup".to_string())),
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl SampleSink for AudioOutput {
    /// Write samples to the ring buffer, returning how many fit
    fn write(&self, samples: &[f32]) -> usize {
        let mut producer = self.producer.lock();
        let mut written = 0;

        for &sample in samples {
            if producer.try_push(sample).is_ok() {
                written += 1;
            } else {
                // Buffer full, caller retries with the rest
                break;
            }
        }

        self.queued.fetch_add(written, Ordering::SeqCst);
        written
    }

    fn clear(&self) {
        // The audio callback drains on its next wakeup
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    fn pending(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }
}

type StreamSetup = Result<(RingProducer, u32, u16)>;

/// Open the device, run the stream, and hold it alive until shutdown.
fn run_output_thread(
    tx: mpsc::Sender<StreamSetup>,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
) {
    match open_stream(volume, clear_flag, queued) {
        Ok((producer, stream, sample_rate, channels)) => {
            let _ = tx.send(Ok((producer, sample_rate, channels)));
            while !shutdown.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(50));
            }
            drop(stream);
        }
        Err(e) => {
            let _ = tx.send(Err(e));
        }
    }
}

fn open_stream(
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
) -> Result<(RingProducer, Stream, u32, u16)> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Output("no output device available".to_string()))?;

    let (config, sample_format) = choose_config(&device)?;
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    debug!(sample_rate, channels, "opening output stream");

    // Ring buffer for handing samples to the audio callback
    let rb = HeapRb::<f32>::new(RING_BUFFER_FRAMES * channels as usize);
    let (producer, consumer) = rb.split();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &config, consumer, volume, clear_flag, queued)?
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &config, consumer, volume, clear_flag, queued)?
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(&device, &config, consumer, volume, clear_flag, queued)?
        }
        format => return Err(Error::Output(format!("unsupported sample format: {:?}", format))),
    };

    stream
        .play()
        .map_err(|e| Error::Output(format!("failed to start stream: {}", e)))?;

    Ok((producer, stream, sample_rate, channels))
}

/// Pick a stream config at the synthesis rate if the device offers one,
/// falling back to the device default otherwise.
fn choose_config(device: &cpal::Device) -> Result<(StreamConfig, cpal::SampleFormat)> {
    if let Ok(ranges) = device.supported_output_configs() {
        for range in ranges {
            if range.min_sample_rate().0 <= SYNTH_SAMPLE_RATE
                && SYNTH_SAMPLE_RATE <= range.max_sample_rate().0
            {
                let supported = range.with_sample_rate(SampleRate(SYNTH_SAMPLE_RATE));
                let format = supported.sample_format();
                return Ok((supported.into(), format));
            }
        }
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::Output(format!("failed to get default output config: {}", e)))?;
    warn!(
        rate = default.sample_rate().0,
        "device does not support 24kHz output, will resample"
    );
    let format = default.sample_format();
    Ok((default.into(), format))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: RingConsumer,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
) -> Result<Stream> {
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let vol = *volume.lock();
                let mut popped = 0;

                // Drain everything and go silent when a clear was requested
                if clear_flag.swap(false, Ordering::SeqCst) {
                    while consumer.try_pop().is_some() {
                        popped += 1;
                    }
                }

                for sample in data.iter_mut() {
                    let value = match consumer.try_pop() {
                        Some(v) => {
                            popped += 1;
                            v * vol
                        }
                        None => 0.0,
                    };
                    *sample = T::from_sample(value);
                }

                // Keep the producer-side pending count honest
                if popped > 0 {
                    queued.fetch_sub(popped, Ordering::SeqCst);
                }
            },
            move |err| {
                error!("audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| Error::Output(format!("failed to build output stream: {}", e)))?;

    Ok(stream)
}

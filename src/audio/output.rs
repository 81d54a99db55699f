// Audio output using cpal
// A scheduled mixer: play commands travel through a ring buffer to the audio
// thread, which starts each voice when the sample clock reaches its frame

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use super::decoder::AudioDecoder;
use super::resample;
use super::{AudioSink, ClockTime, DecodeError, DecodedAudio, TransportState};

const COMMAND_QUEUE_SIZE: usize = 4096;
const MAX_VOICES: usize = 256;

type CommandProducer = ringbuf::HeapProd<PlayCommand>;
type CommandConsumer = ringbuf::HeapCons<PlayCommand>;

struct PlayCommand {
    audio: Arc<DecodedAudio>,
    start_frame: u64,
}

struct Voice {
    audio: Arc<DecodedAudio>,
    start_frame: u64,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame.saturating_add(self.audio.frames() as u64)
    }
}

/// State shared between the sink handle and the audio callback
struct Clock {
    frames: AtomicU64,
    running: AtomicBool,
}

/// Device-backed audio sink.
///
/// The cpal stream lives on its own thread for the lifetime of the sink. Its
/// callback counts rendered frames; that count is the shared clock. The
/// clock only advances while the transport is running, so suspending holds
/// every pending and playing voice in place.
pub struct CpalSink {
    clock: Arc<Clock>,
    state: Mutex<TransportState>,
    producer: Mutex<CommandProducer>,
    volume: Arc<Mutex<f32>>,
    sample_rate: u32,
    channels: u16,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
    stream_thread: Mutex<Option<JoinHandle<()>>>,
}

impl CpalSink {
    /// Create a sink on the default output device
    pub fn new(volume: f32) -> Result<Self, String> {
        let rb = HeapRb::<PlayCommand>::new(COMMAND_QUEUE_SIZE);
        let (producer, consumer) = rb.split();

        let clock = Arc::new(Clock {
            frames: AtomicU64::new(0),
            running: AtomicBool::new(false),
        });
        let volume = Arc::new(Mutex::new(volume.clamp(0.0, 1.0)));

        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_clock = Arc::clone(&clock);
        let thread_volume = Arc::clone(&volume);
        let stream_thread = std::thread::Builder::new()
            .name("dawplayer-output".into())
            .spawn(move || {
                let stream = match Self::open_stream(consumer, thread_clock, thread_volume) {
                    Ok((stream, sample_rate, channels)) => {
                        let _ = ready_tx.send(Ok((sample_rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Blocks until the sink is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| format!("Failed to spawn output thread: {}", e))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| "Output thread exited before opening a stream".to_string())??;

        log::info!("Audio output opened: {} Hz, {} channels", sample_rate, channels);

        Ok(Self {
            clock,
            state: Mutex::new(TransportState::Idle),
            producer: Mutex::new(producer),
            volume,
            sample_rate,
            channels,
            shutdown: Mutex::new(Some(shutdown_tx)),
            stream_thread: Mutex::new(Some(stream_thread)),
        })
    }

    fn open_stream(
        consumer: CommandConsumer,
        clock: Arc<Clock>,
        volume: Arc<Mutex<f32>>,
    ) -> Result<(cpal::Stream, u32, u16), String> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or("No output device available")?;

        let config = device
            .default_output_config()
            .map_err(|e| format!("Failed to get default output config: {}", e))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        let mixer = Mixer::new(consumer, clock, volume, channels as usize);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &config.into(), mixer)?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config.into(), mixer)?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &config.into(), mixer)?,
            format => return Err(format!("Unsupported sample format: {:?}", format)),
        };

        stream
            .play()
            .map_err(|e| format!("Failed to start stream: {}", e))?;

        Ok((stream, sample_rate, channels))
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut mixer: Mixer,
    ) -> Result<cpal::Stream, String> {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| mixer.render(data),
                move |err| {
                    log::error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| format!("Failed to build output stream: {}", e))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Set the output volume (0.0 to 1.0)
    pub fn set_volume(&self, vol: f32) {
        *self.volume.lock() = vol.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }
}

impl AudioSink for CpalSink {
    fn decode(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio, DecodeError> {
        let audio = AudioDecoder::from_bytes(bytes, extension)?.decode_all()?;
        resample::to_output_format(audio, self.sample_rate, self.channels as usize)
    }

    fn play(&self, audio: Arc<DecodedAudio>, at: ClockTime) {
        let command = PlayCommand {
            audio,
            start_frame: at.to_frames(self.sample_rate),
        };
        if self.producer.lock().try_push(command).is_err() {
            log::warn!("Play queue full, dropping clip scheduled at {:.3}s", at.as_secs_f64());
            return;
        }

        let mut state = self.state.lock();
        if *state == TransportState::Idle {
            self.clock.running.store(true, Ordering::SeqCst);
            *state = TransportState::Running;
            log::debug!("Clock started");
        }
    }

    fn state(&self) -> TransportState {
        *self.state.lock()
    }

    fn suspend(&self) {
        let mut state = self.state.lock();
        if *state == TransportState::Running {
            self.clock.running.store(false, Ordering::SeqCst);
            *state = TransportState::Suspended;
        }
    }

    fn resume(&self) {
        let mut state = self.state.lock();
        if *state == TransportState::Suspended {
            self.clock.running.store(true, Ordering::SeqCst);
            *state = TransportState::Running;
        }
    }

    fn now(&self) -> ClockTime {
        ClockTime::from_frames(self.clock.frames.load(Ordering::SeqCst), self.sample_rate)
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.shutdown.lock().take();
        if let Some(handle) = self.stream_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Runs inside the audio callback
struct Mixer {
    consumer: CommandConsumer,
    clock: Arc<Clock>,
    volume: Arc<Mutex<f32>>,
    channels: usize,
    voices: Vec<Voice>,
    scratch: Vec<f32>,
}

impl Mixer {
    fn new(consumer: CommandConsumer, clock: Arc<Clock>, volume: Arc<Mutex<f32>>, channels: usize) -> Self {
        Self {
            consumer,
            clock,
            volume,
            channels,
            voices: Vec::with_capacity(MAX_VOICES),
            scratch: Vec::new(),
        }
    }

    fn render<T: cpal::Sample + cpal::FromSample<f32>>(&mut self, data: &mut [T]) {
        let now = self.clock.frames.load(Ordering::SeqCst);

        // Late arrivals start right away instead of being skipped into
        while let Some(mut command) = self.consumer.try_pop() {
            command.start_frame = command.start_frame.max(now);
            self.voices.push(Voice {
                audio: command.audio,
                start_frame: command.start_frame,
            });
        }

        if !self.clock.running.load(Ordering::SeqCst) {
            data.fill(T::EQUILIBRIUM);
            return;
        }

        self.scratch.clear();
        self.scratch.resize(data.len(), 0.0);
        let frames = (data.len() / self.channels) as u64;
        mix_voices(&self.voices, now, frames, self.channels, &mut self.scratch);

        let vol = *self.volume.lock();
        for (out, &sample) in data.iter_mut().zip(self.scratch.iter()) {
            *out = T::from_sample(sample * vol);
        }

        let end = now.saturating_add(frames);
        self.voices.retain(|voice| voice.end_frame() > end);
        self.clock.frames.store(end, Ordering::SeqCst);
    }
}

/// Sum every voice overlapping `[now, now + frames)` into `out`
fn mix_voices(voices: &[Voice], now: u64, frames: u64, channels: usize, out: &mut [f32]) {
    let end = now.saturating_add(frames);
    for voice in voices {
        let from = voice.start_frame.max(now);
        let to = voice.end_frame().min(end);
        if from >= to {
            continue;
        }
        let src_channels = voice.audio.channels;
        for frame in from..to {
            let src = (frame - voice.start_frame) as usize * src_channels;
            let dst = (frame - now) as usize * channels;
            for ch in 0..channels.min(src_channels) {
                out[dst + ch] += voice.audio.samples[src + ch];
            }
        }
    }
}

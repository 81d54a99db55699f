// Audio playback module
// Uses Symphonia for decoding, rubato for resampling and cpal for output

pub mod decoder;
pub mod output;
pub mod player;
pub mod resample;

use std::ops::Add;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub use output::CpalSink;
pub use player::{Player, PlayerError, ToggleOutcome};

/// A point on the sink's clock, measured from when the clock first started
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
pub struct ClockTime(Duration);

impl ClockTime {
    pub const ZERO: ClockTime = ClockTime(Duration::ZERO);
    pub const MAX: ClockTime = ClockTime(Duration::MAX);

    /// Negative or NaN input gives `ZERO`; values past `Duration::MAX` saturate
    pub fn from_secs_f64(seconds: f64) -> Self {
        ClockTime(saturating_duration(seconds))
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Offset by a number of seconds; negative offsets clamp to `self`
    pub fn offset_by(self, seconds: f64) -> Self {
        if seconds.is_finite() && seconds > 0.0 {
            self + saturating_duration(seconds)
        } else {
            self
        }
    }

    /// Convert to a frame index at the given sample rate
    pub fn to_frames(&self, sample_rate: u32) -> u64 {
        (self.0.as_secs_f64() * sample_rate as f64).round() as u64
    }

    pub fn from_frames(frames: u64, sample_rate: u32) -> Self {
        ClockTime::from_secs_f64(frames as f64 / sample_rate as f64)
    }
}

fn saturating_duration(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

impl Add<Duration> for ClockTime {
    type Output = ClockTime;

    /// Saturates at `ClockTime::MAX`
    fn add(self, rhs: Duration) -> ClockTime {
        ClockTime(self.0.saturating_add(rhs))
    }
}

/// Transport state of the sink's shared clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportState {
    /// No clock running yet
    Idle,
    Running,
    Suspended,
}

/// Fully decoded audio, interleaved f32 samples
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error("unsupported or unrecognized format: {0}")]
    Unsupported(String),
    #[error("no audio track found")]
    NoAudioTrack,
    #[error("decode failed: {0}")]
    Corrupt(String),
    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Where scheduled clips end up.
///
/// Implementations own a single shared clock. `play` must not block: it
/// hands the audio over and returns, and the sink starts it once its clock
/// reaches `at`. All methods take `&self` so one sink can serve many
/// concurrent scheduling tasks.
pub trait AudioSink: Send + Sync {
    /// Decode raw file bytes. `extension` is a format hint, e.g. "wav".
    fn decode(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio, DecodeError>;

    /// Start `audio` when the clock reaches `at`. A time already in the past
    /// starts immediately.
    fn play(&self, audio: Arc<DecodedAudio>, at: ClockTime);

    fn state(&self) -> TransportState;

    fn suspend(&self);

    fn resume(&self);

    fn now(&self) -> ClockTime;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// In-memory sink that records play requests instead of making sound.
    ///
    /// Bytes starting with `b"BAD"` fail to decode; anything else decodes to
    /// one frame of silence per byte.
    pub(crate) struct RecordingSink {
        pub(crate) plays: Mutex<Vec<(Arc<DecodedAudio>, ClockTime)>>,
        state: Mutex<TransportState>,
        now: Mutex<ClockTime>,
        pub(crate) suspends: Mutex<usize>,
        pub(crate) resumes: Mutex<usize>,
    }

    impl RecordingSink {
        pub(crate) fn new() -> Self {
            Self {
                plays: Mutex::new(Vec::new()),
                state: Mutex::new(TransportState::Idle),
                now: Mutex::new(ClockTime::ZERO),
                suspends: Mutex::new(0),
                resumes: Mutex::new(0),
            }
        }

        pub(crate) fn set_now(&self, now: ClockTime) {
            *self.now.lock() = now;
        }

        pub(crate) fn play_times(&self) -> Vec<f64> {
            let mut times: Vec<f64> = self.plays.lock().iter().map(|(_, at)| at.as_secs_f64()).collect();
            times.sort_by(|a, b| a.total_cmp(b));
            times
        }
    }

    impl AudioSink for RecordingSink {
        fn decode(&self, bytes: Vec<u8>, _extension: Option<&str>) -> Result<DecodedAudio, DecodeError> {
            if bytes.starts_with(b"BAD") {
                return Err(DecodeError::Corrupt("test data".into()));
            }
            Ok(DecodedAudio {
                samples: vec![0.0; bytes.len()],
                sample_rate: 48000,
                channels: 1,
            })
        }

        fn play(&self, audio: Arc<DecodedAudio>, at: ClockTime) {
            let mut state = self.state.lock();
            if *state == TransportState::Idle {
                *state = TransportState::Running;
            }
            self.plays.lock().push((audio, at));
        }

        fn state(&self) -> TransportState {
            *self.state.lock()
        }

        fn suspend(&self) {
            *self.state.lock() = TransportState::Suspended;
            *self.suspends.lock() += 1;
        }

        fn resume(&self) {
            *self.state.lock() = TransportState::Running;
            *self.resumes.lock() += 1;
        }

        fn now(&self) -> ClockTime {
            *self.now.lock()
        }
    }

    #[test]
    fn test_offset_clamps_negative() {
        let base = ClockTime::from_secs_f64(1.0);
        assert_eq!(base.offset_by(-3.0), base);
        assert_eq!(base.offset_by(0.0), base);
        assert_eq!(base.offset_by(2.0).as_secs_f64(), 3.0);
    }

    #[test]
    fn test_huge_offsets_saturate() {
        let base = ClockTime::from_secs_f64(1.0);
        assert_eq!(base.offset_by(1e20), ClockTime::MAX);
        assert_eq!(ClockTime::MAX.offset_by(5.0), ClockTime::MAX);
        assert_eq!(ClockTime::from_secs_f64(f64::INFINITY), ClockTime::MAX);
        assert_eq!(ClockTime::from_secs_f64(f64::NAN), ClockTime::ZERO);
        assert_eq!(ClockTime::MAX.to_frames(48000), u64::MAX);
    }

    #[test]
    fn test_frames_conversion() {
        let t = ClockTime::from_secs_f64(0.5);
        assert_eq!(t.to_frames(48000), 24000);
        assert_eq!(ClockTime::from_frames(24000, 48000), t);
    }

    #[test]
    fn test_decoded_duration() {
        let audio = DecodedAudio {
            samples: vec![0.0; 88200],
            sample_rate: 44100,
            channels: 2,
        };
        assert_eq!(audio.frames(), 44100);
        assert_eq!(audio.duration_secs(), 1.0);
    }
}

// Audio resampling using rubato
// Maps channel counts, then converts the sample rate with an FFT resampler

use rubato::{FftFixedIn, Resampler};

use super::{DecodeError, DecodedAudio};

const CHUNK_FRAMES: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Convert `audio` to `sample_rate` and `channels`
pub fn to_output_format(
    audio: DecodedAudio,
    sample_rate: u32,
    channels: usize,
) -> Result<DecodedAudio, DecodeError> {
    let audio = map_channels(audio, channels);
    resample(audio, sample_rate)
}

/// Remap the channel layout.
///
/// Mono is copied to every output channel, downmixing to mono averages all
/// inputs. Otherwise channels are copied by index and extra outputs stay
/// silent.
pub fn map_channels(audio: DecodedAudio, channels: usize) -> DecodedAudio {
    if audio.channels == channels || audio.channels == 0 || channels == 0 {
        return audio;
    }

    let src = audio.channels;
    let frames = audio.frames();
    let mut samples = Vec::with_capacity(frames * channels);

    for frame in audio.samples.chunks_exact(src) {
        if src == 1 {
            samples.extend(std::iter::repeat(frame[0]).take(channels));
        } else if channels == 1 {
            samples.push(frame.iter().sum::<f32>() / src as f32);
        } else {
            for ch in 0..channels {
                samples.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }

    DecodedAudio {
        samples,
        sample_rate: audio.sample_rate,
        channels,
    }
}

/// Resample interleaved audio to `sample_rate`
pub fn resample(audio: DecodedAudio, sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
    if audio.sample_rate == sample_rate || audio.frames() == 0 {
        return Ok(DecodedAudio {
            sample_rate,
            ..audio
        });
    }
    if audio.sample_rate == 0 || sample_rate == 0 {
        return Err(DecodeError::Resample(format!(
            "cannot convert {} Hz to {} Hz",
            audio.sample_rate, sample_rate
        )));
    }

    let channels = audio.channels;
    let frames = audio.frames();
    let planar = deinterleave(&audio.samples, channels);

    let mut resampler = FftFixedIn::<f32>::new(
        audio.sample_rate as usize,
        sample_rate as usize,
        CHUNK_FRAMES,
        SUB_CHUNKS,
        channels,
    )
    .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected = (frames as f64 * sample_rate as f64 / audio.sample_rate as f64).ceil() as usize;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

    let mut pos = 0;
    while pos < frames {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(frames);
        let chunk: Vec<&[f32]> = planar.iter().map(|p| &p[pos..end]).collect();

        let processed = if end - pos == needed {
            resampler.process(&chunk, None)
        } else {
            resampler.process_partial(Some(&chunk), None)
        }
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

        append(&mut output, processed);
        pos = end;
    }

    // Flush the resampler's internal delay
    while output[0].len() < expected + delay {
        let processed = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;
        if processed[0].is_empty() {
            break;
        }
        append(&mut output, processed);
    }

    for plane in output.iter_mut() {
        plane.drain(..delay.min(plane.len()));
        plane.truncate(expected);
    }

    Ok(DecodedAudio {
        samples: interleave(&output),
        sample_rate,
        channels,
    })
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        for plane in planar {
            samples.push(plane[frame]);
        }
    }
    samples
}

fn append(output: &mut [Vec<f32>], processed: Vec<Vec<f32>>) {
    for (plane, chunk) in output.iter_mut().zip(processed) {
        plane.extend_from_slice(&chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(samples: Vec<f32>, sample_rate: u32, channels: usize) -> DecodedAudio {
        DecodedAudio {
            samples,
            sample_rate,
            channels,
        }
    }

    #[test]
    fn test_mono_to_stereo() {
        let out = map_channels(audio(vec![0.1, 0.2], 48000, 1), 2);
        assert_eq!(out.channels, 2);
        assert_eq!(out.samples, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_stereo_to_mono() {
        let out = map_channels(audio(vec![0.2, 0.4, -1.0, 1.0], 48000, 2), 1);
        assert_eq!(out.samples.len(), 2);
        assert!((out.samples[0] - 0.3).abs() < 1e-6);
        assert_eq!(out.samples[1], 0.0);
    }

    #[test]
    fn test_stereo_to_quad() {
        let out = map_channels(audio(vec![0.1, 0.2], 48000, 2), 4);
        assert_eq!(out.samples, vec![0.1, 0.2, 0.0, 0.0]);
    }

    #[test]
    fn test_same_rate_is_untouched() {
        let input = audio(vec![0.5; 10], 44100, 1);
        let out = resample(input.clone(), 44100).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_resample_length() {
        let frames = 44100;
        let input = audio(vec![0.25; frames * 2], 44100, 2);
        let out = resample(input, 48000).unwrap();

        assert_eq!(out.sample_rate, 48000);
        assert_eq!(out.channels, 2);
        assert_eq!(out.frames(), 48000);
        // Steady signal stays steady away from the edges
        let mid = out.samples[48000];
        assert!((mid - 0.25).abs() < 0.01, "mid sample {}", mid);
    }
}

//! WAV encoding and decoding (16-bit PCM, mono).

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::Path;
use tts_core::{RawAudio, TtsError, TtsResult};

fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn codec_err(e: hound::Error) -> TtsError {
    match e {
        hound::Error::IoError(io) => TtsError::Io(io),
        other => TtsError::Io(io::Error::other(other.to_string())),
    }
}

#[inline]
fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn write_samples<W: Write + Seek>(writer: W, audio: &RawAudio) -> TtsResult<()> {
    if audio.sample_rate == 0 {
        return Err(TtsError::storage("cannot encode audio with zero sample rate"));
    }
    let mut writer = WavWriter::new(writer, wav_spec(audio.sample_rate)).map_err(codec_err)?;
    for &sample in &audio.samples {
        writer.write_sample(to_i16(sample)).map_err(codec_err)?;
    }
    writer.finalize().map_err(codec_err)
}

/// Encode audio as a complete WAV file in memory.
pub fn encode_wav(audio: &RawAudio) -> TtsResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + audio.samples.len() * 2));
    write_samples(&mut cursor, audio)?;
    Ok(cursor.into_inner())
}

/// Write audio to a WAV file.
pub fn write_wav(path: impl AsRef<Path>, audio: &RawAudio) -> TtsResult<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_samples(io::BufWriter::new(file), audio)
}

fn read_samples<R: Read>(reader: WavReader<R>) -> TtsResult<RawAudio> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()
                .map_err(codec_err)?
        }
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(codec_err)?,
    };

    // Downmix to mono.
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(RawAudio::new(samples, spec.sample_rate))
}

/// Decode a WAV file held in memory.
pub fn decode_wav(bytes: &[u8]) -> TtsResult<RawAudio> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(codec_err)?;
    read_samples(reader)
}

/// Read audio from a WAV file.
pub fn read_wav(path: impl AsRef<Path>) -> TtsResult<RawAudio> {
    let reader = WavReader::open(path.as_ref()).map_err(codec_err)?;
    read_samples(reader)
}

/// Apply a Hann fade-in over the first `fade_ms` milliseconds.
pub fn apply_fade_in(samples: &mut [f32], fade_ms: f32, sample_rate: u32) {
    let fade_samples = fade_len(samples.len(), fade_ms, sample_rate);

    for (i, sample) in samples.iter_mut().take(fade_samples).enumerate() {
        let t = i as f32 / fade_samples as f32;
        *sample *= 0.5 * (1.0 - (std::f32::consts::PI * t).cos());
    }
}

/// Apply a Hann fade-out over the last `fade_ms` milliseconds.
pub fn apply_fade_out(samples: &mut [f32], fade_ms: f32, sample_rate: u32) {
    let fade_samples = fade_len(samples.len(), fade_ms, sample_rate);
    let start = samples.len() - fade_samples;

    for (i, sample) in samples[start..].iter_mut().enumerate() {
        let t = (i + 1) as f32 / fade_samples as f32;
        *sample *= 0.5 * (1.0 + (std::f32::consts::PI * t).cos());
    }
}

fn fade_len(len: usize, fade_ms: f32, sample_rate: u32) -> usize {
    let fade = ((fade_ms.max(0.0) / 1000.0) * sample_rate as f32) as usize;
    fade.min(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, sample_rate: u32) -> RawAudio {
        let samples = (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        RawAudio::new(samples, sample_rate)
    }

    #[test]
    fn test_encode_header_and_size() {
        let audio = tone(480, 48_000);
        let bytes = encode_wav(&audio).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte canonical header + 2 bytes per sample
        assert_eq!(bytes.len(), 44 + 480 * 2);
    }

    #[test]
    fn test_decode_preserves_rate_and_length() {
        let audio = tone(1000, 24_000);
        let decoded = decode_wav(&encode_wav(&audio).unwrap()).unwrap();

        assert_eq!(decoded.sample_rate, 24_000);
        assert_eq!(decoded.num_samples(), 1000);
        let max_err = audio
            .samples
            .iter()
            .zip(&decoded.samples)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "quantization error too large: {max_err}");
    }

    #[test]
    fn test_sample_clamping() {
        let audio = RawAudio::new(vec![2.0, -2.0], 16_000);
        let bytes = encode_wav(&audio).unwrap();

        let first = i16::from_le_bytes([bytes[44], bytes[45]]);
        assert_eq!(first, i16::MAX);
        let second = i16::from_le_bytes([bytes[46], bytes[47]]);
        assert!(second < -30000);
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let audio = RawAudio::new(vec![0.0; 10], 0);
        assert!(encode_wav(&audio).is_err());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_wav(b"definitely not a wav file").is_err());
    }

    #[test]
    fn test_write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, &tone(256, 8_000)).unwrap();

        let audio = read_wav(&path).unwrap();
        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.num_samples(), 256);
    }

    #[test]
    fn test_fades_reach_silence_at_edges() {
        let mut samples = vec![1.0f32; 1000];
        apply_fade_in(&mut samples, 10.0, 10_000);
        apply_fade_out(&mut samples, 10.0, 10_000);

        assert_eq!(samples[0], 0.0);
        assert!(samples[999].abs() < 1e-6);
        assert_eq!(samples[500], 1.0);
    }
}

//! Frame codec: still-image frames and PCM audio in transport-safe forms.
//!
//! Frames travel as base64-encoded JPEG bytes. Audio travels as a WAV (RIFF)
//! container so the header carries sample rate, channel count and bit depth
//! and the client decodes without out-of-band negotiation.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use std::io::Cursor;

/// One encoded still image ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    data: Bytes,
}

impl EncodedFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let data = BASE64
            .decode(encoded)
            .map_err(|e| Error::TransportDecode(format!("invalid base64 frame: {}", e)))?;
        Ok(Self::new(data))
    }
}

/// Decoded audio clip: 16-bit signed little-endian PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl AudioClip {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::Audio("sample rate must be non-zero".to_string()));
        }
        if channels == 0 {
            return Err(Error::Audio("channel count must be non-zero".to_string()));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// A clip of silence, useful as a placeholder when synthesis is disabled.
    pub fn silence(duration_seconds: f64, sample_rate: u32) -> Self {
        let count = (duration_seconds.max(0.0) * sample_rate as f64) as usize;
        Self {
            samples: vec![0i16; count],
            sample_rate,
            channels: 1,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// True decoded duration in seconds, derived from the sample count.
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Serialize into a WAV container with a self-describing header.
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| Error::Audio(format!("failed to write WAV header: {}", e)))?;
            for sample in &self.samples {
                writer
                    .write_sample(*sample)
                    .map_err(|e| Error::Audio(format!("failed to write WAV sample: {}", e)))?;
            }
            writer
                .finalize()
                .map_err(|e| Error::Audio(format!("failed to finalize WAV: {}", e)))?;
        }
        Ok(cursor.into_inner())
    }

    /// Parse a WAV container. Only 16-bit integer PCM is accepted.
    pub fn from_wav(data: &[u8]) -> Result<Self> {
        let mut reader = hound::WavReader::new(Cursor::new(data))
            .map_err(|e| Error::Audio(format!("invalid WAV container: {}", e)))?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(Error::Audio(format!(
                "unsupported sample format: {:?} at {} bits, expected 16-bit PCM",
                spec.sample_format, spec.bits_per_sample
            )));
        }
        let samples = reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Audio(format!("failed to read WAV samples: {}", e)))?;
        Self::new(samples, spec.sample_rate, spec.channels)
    }

    pub fn to_base64_wav(&self) -> Result<String> {
        Ok(BASE64.encode(self.to_wav()?))
    }

    pub fn from_base64_wav(encoded: &str) -> Result<Self> {
        let data = BASE64
            .decode(encoded)
            .map_err(|e| Error::TransportDecode(format!("invalid base64 audio: {}", e)))?;
        Self::from_wav(&data)
    }
}

/// An ordered frame sequence paired with optional audio, meant to be
/// presented in lock-step.
#[derive(Debug, Clone)]
pub struct FrameBatch {
    pub frames: Vec<EncodedFrame>,
    pub audio: Option<AudioClip>,
}

impl FrameBatch {
    pub fn new(frames: Vec<EncodedFrame>, audio: Option<AudioClip>) -> Self {
        Self { frames, audio }
    }

    /// Expected playback duration derived from the audio clip.
    pub fn expected_duration(&self) -> Option<f64> {
        self.audio.as_ref().map(|a| a.duration_seconds())
    }

    /// Frame-advance rate so the frames exactly span the decoded audio
    /// duration, clamped into the given band. None when there is no audio
    /// (or no frames), in which case the player falls back to its default.
    pub fn derived_fps(&self, min_fps: f64, max_fps: f64) -> Option<f64> {
        let duration = self.expected_duration()?;
        if duration <= 0.0 || self.frames.is_empty() {
            return None;
        }
        Some((self.frames.len() as f64 / duration).clamp(min_fps, max_fps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_base64_round_trip() {
        let frame = EncodedFrame::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x01, 0x02]);
        let encoded = frame.to_base64();
        let decoded = EncodedFrame::from_base64(&encoded).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_frame_rejects_bad_base64() {
        assert!(EncodedFrame::from_base64("not//valid!!base64===").is_err());
    }

    #[test]
    fn test_wav_round_trip_preserves_header() {
        let clip = AudioClip::new(vec![0, 100, -100, 32767, -32768], 22050, 1).unwrap();
        let wav = clip.to_wav().unwrap();
        let parsed = AudioClip::from_wav(&wav).unwrap();
        assert_eq!(parsed.sample_rate(), 22050);
        assert_eq!(parsed.channels(), 1);
        assert_eq!(parsed.samples(), clip.samples());
    }

    #[test]
    fn test_clip_duration() {
        let clip = AudioClip::new(vec![0i16; 44100], 22050, 1).unwrap();
        assert!((clip.duration_seconds() - 2.0).abs() < 1e-9);

        let stereo = AudioClip::new(vec![0i16; 44100], 22050, 2).unwrap();
        assert!((stereo.duration_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        assert!(AudioClip::new(vec![0i16; 10], 0, 1).is_err());
        assert!(AudioClip::new(vec![0i16; 10], 22050, 0).is_err());
    }

    #[test]
    fn test_derived_fps_clamps_into_band() {
        // 100 frames over 4 seconds => 25 fps, inside [15, 30]
        let audio = AudioClip::silence(4.0, 16000);
        let frames = vec![EncodedFrame::new(vec![1u8]); 100];
        let batch = FrameBatch::new(frames, Some(audio));
        let fps = batch.derived_fps(15.0, 30.0).unwrap();
        assert!((fps - 25.0).abs() < 1e-9);

        // 10 frames over 4 seconds => 2.5 fps, clamped up to 15
        let audio = AudioClip::silence(4.0, 16000);
        let frames = vec![EncodedFrame::new(vec![1u8]); 10];
        let batch = FrameBatch::new(frames, Some(audio));
        assert_eq!(batch.derived_fps(15.0, 30.0), Some(15.0));

        // 400 frames over 4 seconds => 100 fps, clamped down to 30
        let audio = AudioClip::silence(4.0, 16000);
        let frames = vec![EncodedFrame::new(vec![1u8]); 400];
        let batch = FrameBatch::new(frames, Some(audio));
        assert_eq!(batch.derived_fps(15.0, 30.0), Some(30.0));
    }

    #[test]
    fn test_derived_fps_without_audio() {
        let batch = FrameBatch::new(vec![EncodedFrame::new(vec![1u8]); 10], None);
        assert_eq!(batch.derived_fps(15.0, 30.0), None);
    }
}

use thiserror::Error;

use super::capture::RawFrame;

/// Wire format targeted by the encoder: mono, 16-bit signed PCM, 16 kHz.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const TARGET_CHANNELS: u16 = 1;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("unsupported channel layout: {0} channels")]
    UnsupportedChannels(u16),
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),
}

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Output sample rate in Hz.
    pub target_sample_rate: u32,
    /// Duration of each emitted chunk in milliseconds.
    pub chunk_ms: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: TARGET_SAMPLE_RATE,
            chunk_ms: 100,
        }
    }
}

/// One wire-ready audio chunk: little-endian PCM16 bytes, mono, at the
/// encoder's target rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub pcm: Vec<u8>,
}

impl AudioChunk {
    pub fn sample_count(&self) -> usize {
        self.pcm.len() / 2
    }
}

/// Converts raw device frames of arbitrary rate and channel count into
/// fixed-duration mono PCM16 chunks.
///
/// Streaming: fractional resample position and the previous tail sample are
/// carried across `push` calls, so chunk boundaries do not depend on how the
/// device slices its buffers. Work per push is proportional to the frame;
/// nothing is buffered beyond one chunk of pending samples.
pub struct Pcm16Encoder {
    config: EncoderConfig,
    chunk_samples: usize,
    pending: Vec<i16>,
    /// Fractional read position relative to the carried tail sample.
    phase: f64,
    /// Last input sample of the previous frame, for interpolation continuity.
    tail: Option<i16>,
}

impl Pcm16Encoder {
    pub fn new(config: EncoderConfig) -> Self {
        let chunk_samples =
            ((config.target_sample_rate as u64 * config.chunk_ms) / 1000).max(1) as usize;
        Self {
            config,
            chunk_samples,
            pending: Vec::new(),
            phase: 0.0,
            tail: None,
        }
    }

    /// Consume one raw frame, returning zero or more completed chunks.
    ///
    /// A failed conversion drops the frame; real-time audio is lossy-tolerant
    /// and retrying stale samples is worse than skipping them.
    pub fn push(&mut self, frame: RawFrame) -> Result<Vec<AudioChunk>, EncodeError> {
        if frame.sample_rate == 0 {
            return Err(EncodeError::InvalidSampleRate(frame.sample_rate));
        }
        if frame.channels == 0 || frame.channels > 2 {
            return Err(EncodeError::UnsupportedChannels(frame.channels));
        }

        let mono = downmix_to_mono(&frame.samples, frame.channels);
        self.resample_into_pending(&mono, frame.sample_rate);

        let mut chunks = Vec::new();
        while self.pending.len() >= self.chunk_samples {
            let rest = self.pending.split_off(self.chunk_samples);
            let chunk = std::mem::replace(&mut self.pending, rest);
            let pcm = chunk.iter().flat_map(|s| s.to_le_bytes()).collect();
            chunks.push(AudioChunk { pcm });
        }
        Ok(chunks)
    }

    /// Restart for a new session: drops pending samples and resample state.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.phase = 0.0;
        self.tail = None;
    }

    pub fn chunk_samples(&self) -> usize {
        self.chunk_samples
    }

    /// Linear-interpolation resampler. Generalizes plain decimation so
    /// non-integer ratios (44.1 kHz -> 16 kHz) work without artifacts worse
    /// than the source.
    fn resample_into_pending(&mut self, mono: &[i16], source_rate: u32) {
        if mono.is_empty() {
            return;
        }
        if source_rate == self.config.target_sample_rate {
            self.pending.extend_from_slice(mono);
            self.tail = mono.last().copied();
            self.phase = 0.0;
            return;
        }

        let step = source_rate as f64 / self.config.target_sample_rate as f64;

        // Virtual source: carried tail sample (if any) followed by this frame.
        let tail = self.tail;
        let offset = if tail.is_some() { 1 } else { 0 };
        let len = mono.len() + offset;
        let sample_at = |i: usize| -> f64 {
            if i < offset {
                tail.unwrap_or(0) as f64
            } else {
                mono[i - offset] as f64
            }
        };

        let mut pos = self.phase;
        while pos + 1.0 < len as f64 {
            let i = pos as usize;
            let frac = pos - i as f64;
            let value = sample_at(i) * (1.0 - frac) + sample_at(i + 1) * frac;
            self.pending
                .push(value.clamp(i16::MIN as f64, i16::MAX as f64) as i16);
            pos += step;
        }

        // Re-anchor on the new tail sample for the next frame.
        self.phase = pos - (len - 1) as f64;
        self.tail = mono.last().copied();
    }
}

/// Channel-sum downmix with clamp, preserving perceived volume.
fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels == 1 {
        return samples.to_vec();
    }

    let mut mono = Vec::with_capacity(samples.len() / 2);
    for pair in samples.chunks_exact(2) {
        let sum = pair[0] as i32 + pair[1] as i32;
        mono.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }
    mono
}

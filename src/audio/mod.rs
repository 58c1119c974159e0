//! Audio capture and wire encoding
//!
//! `capture` acquires raw frames from the input device at its native format;
//! `encoder` converts them into fixed-duration mono PCM16 chunks at 16 kHz,
//! ready for the stream transport. Both sides are drop-on-overflow: network
//! backpressure never reaches the hardware callback.

pub mod capture;
pub mod encoder;

pub use capture::{CaptureBackend, CaptureError, MicrophoneBackend, RawFrame};
pub use encoder::{AudioChunk, EncodeError, EncoderConfig, Pcm16Encoder};

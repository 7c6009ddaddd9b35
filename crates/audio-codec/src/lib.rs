//! # audio-codec
//!
//! Audio encoding and post-processing for the speech service.
//!
//! This crate provides:
//! - WAV encode/decode (16-bit PCM mono), in memory and on disk
//! - Hann fades used to shape generated audio
//! - Spectral noise reduction (`SpectralDenoiser`)

pub mod denoise;
pub mod wav;

pub use denoise::SpectralDenoiser;
pub use wav::{apply_fade_in, apply_fade_out, decode_wav, encode_wav, read_wav, write_wav};

/// File extension of stored audio.
pub const WAV_EXTENSION: &str = "wav";

/// MIME type of stored audio.
pub const WAV_CONTENT_TYPE: &str = "audio/wav";

//! # tts-core
//!
//! Core types, traits, and error definitions for the speech synthesis service.
//!
//! This crate provides the foundational abstractions used across all other crates
//! in the workspace, including:
//!
//! - Common data types (`NormText`, `VoiceKey`, `RawAudio`, etc.)
//! - Trait definitions for the pluggable pipeline stages
//! - Unified error handling via `TtsError`
//! - Configuration structures

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{CatalogConfig, DefaultsConfig, EnhanceConfig, ServerConfig};
pub use error::{TtsError, TtsResult};
pub use traits::{Enhancer, ModelLoader, TextNormalizer, VoiceModel};
pub use types::{
    AudioArtifact, Directive, EmphasisLevel, Lang, NormText, ProsodyMarker, RawAudio,
    SynthesisRequest, VoiceKey,
};

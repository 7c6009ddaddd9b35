//! # runtime
//!
//! Request orchestration for the speech service.
//!
//! This crate provides:
//! - Voice catalog lookup and validation
//! - Lazily loaded, shared voice models (one load per key)
//! - Best-effort noise enhancement
//! - The audio store (persist and serve generated files)
//! - Bounded offload of blocking synthesis from the async event loop
//! - Structured logging and metrics

pub mod catalog;
pub mod dispatcher;
pub mod engine;
pub mod enhance;
pub mod job;
pub mod logging;
pub mod metrics;
pub mod mock;
pub mod pipeline;
pub mod store;
pub mod warm;

pub use catalog::{Catalog, ResolvedVoice};
pub use dispatcher::Dispatcher;
pub use engine::SynthesisEngine;
pub use enhance::PostProcessor;
pub use job::{Job, JobStage};
pub use metrics::TtsMetrics;
pub use mock::{MockModelLoader, MockVoiceModel};
pub use pipeline::{SpeechPipeline, ValidatedRequest};
pub use store::AudioStore;

//! # tts-server
//!
//! HTTP front-end for the speech synthesis service.
//!
//! Provides:
//! - `POST /tts` synthesis endpoint
//! - `GET /audio/{filename}` download of generated files
//! - Health, voice catalog and Prometheus metrics endpoints

pub mod error;
pub mod server;
pub mod service;

pub use error::ApiError;
pub use server::TtsServer;
pub use service::{TtsRequestBody, TtsResponse};

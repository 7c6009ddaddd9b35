//! Configuration structures for the speech service.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{TtsError, TtsResult};
use crate::types::{Lang, VoiceKey};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory where generated audio is stored.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Maximum number of synthesis jobs running at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Maximum accepted input length in characters.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    /// Request body size limit in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// Expose Prometheus metrics on `/metrics`.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Output sample rate for the built-in backend.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Request defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Noise reduction parameters.
    #[serde(default)]
    pub enhance: EnhanceConfig,
    /// Voices to load at startup.
    #[serde(default = "default_preload")]
    pub preload: Vec<VoiceKey>,
    /// Catalog manifest override; the built-in manifest is used when absent.
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("tts_outputs")
}

fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_max_text_chars() -> usize {
    10_000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_preload() -> Vec<VoiceKey> {
    vec![VoiceKey::new(Lang::Ru, "v4_ru")]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            output_dir: default_output_dir(),
            max_workers: default_max_workers(),
            max_text_chars: default_max_text_chars(),
            max_body_bytes: default_max_body_bytes(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            metrics_enabled: default_metrics_enabled(),
            sample_rate: default_sample_rate(),
            defaults: DefaultsConfig::default(),
            enhance: EnhanceConfig::default(),
            preload: default_preload(),
            catalog: None,
        }
    }
}

impl ServerConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> TtsResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TtsError::config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| TtsError::config(format!("invalid {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> TtsResult<()> {
        if self.max_workers == 0 {
            return Err(TtsError::config("max_workers must be at least 1"));
        }
        if self.max_text_chars == 0 {
            return Err(TtsError::config("max_text_chars must be at least 1"));
        }
        if self.sample_rate == 0 {
            return Err(TtsError::config("sample_rate must be positive"));
        }
        self.enhance.validate()
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Values used when a request leaves a field out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Language when the request names none.
    #[serde(default)]
    pub language: Lang,
    /// Speaker when the request names none.
    #[serde(default = "default_speaker")]
    pub speaker: String,
    /// Whether to enhance when the request does not say.
    #[serde(default = "default_enhance_noise")]
    pub enhance_noise: bool,
}

fn default_speaker() -> String {
    "xenia".to_string()
}

fn default_enhance_noise() -> bool {
    true
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            language: Lang::default(),
            speaker: default_speaker(),
            enhance_noise: default_enhance_noise(),
        }
    }
}

/// Spectral noise reduction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhanceConfig {
    /// Leading frames assumed to be noise only.
    #[serde(default = "default_initial_noise_frames")]
    pub initial_noise_frames: usize,
    /// Analysis window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: f32,
    /// Mean log-likelihood ratio below which a frame updates the noise estimate.
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: f32,
}

fn default_initial_noise_frames() -> usize {
    3
}

fn default_window_ms() -> f32 {
    50.0
}

fn default_noise_threshold() -> f32 {
    0.25
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            initial_noise_frames: default_initial_noise_frames(),
            window_ms: default_window_ms(),
            noise_threshold: default_noise_threshold(),
        }
    }
}

impl EnhanceConfig {
    /// Check value ranges.
    pub fn validate(&self) -> TtsResult<()> {
        if self.initial_noise_frames == 0 {
            return Err(TtsError::config("initial_noise_frames must be at least 1"));
        }
        if self.window_ms.is_nan() || self.window_ms <= 0.0 {
            return Err(TtsError::config("window_ms must be positive"));
        }
        if self.noise_threshold < 0.0 {
            return Err(TtsError::config("noise_threshold must not be negative"));
        }
        Ok(())
    }
}

/// Voice catalog manifest: language → models → speakers.
///
/// Order is significant: the first model listed for a language is its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub languages: Vec<LanguageEntry>,
}

/// Models available for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub language: Lang,
    pub models: Vec<ModelEntry>,
}

/// Speakers available in one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub speakers: Vec<String>,
}

//! Unified error types for the speech service.

/// Main error type for TTS operations.
#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    /// Request rejected before any work was queued (missing text, bad body, ...).
    #[error("{0}")]
    Validation(String),

    /// Markup is unbalanced or a recognized directive carries an invalid value.
    #[error("malformed markup: {0}")]
    MalformedMarkup(String),

    /// The (language, model, speaker) selection is not in the catalog.
    #[error("{0}")]
    UnknownVoice(String),

    /// Backend initialization failed for a voice key.
    #[error("could not load voice model {key}: {message}")]
    ModelLoad { key: String, message: String },

    /// Inference-time failure.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Post-processing failure. Recovered locally by the pipeline.
    #[error("enhancement failed: {0}")]
    Enhancement(String),

    /// Audio could not be encoded or persisted.
    #[error("storage error: {0}")]
    Storage(String),

    /// Unknown or invalid artifact name.
    #[error("Audio file {0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results with TtsError.
pub type TtsResult<T> = Result<T, TtsError>;

impl TtsError {
    /// Create a validation error with message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a malformed markup error with message.
    pub fn malformed_markup(msg: impl Into<String>) -> Self {
        Self::MalformedMarkup(msg.into())
    }

    /// Create an unknown voice error with message.
    pub fn unknown_voice(msg: impl Into<String>) -> Self {
        Self::UnknownVoice(msg.into())
    }

    /// Create a model load error for the given key.
    pub fn model_load(key: impl std::fmt::Display, msg: impl Into<String>) -> Self {
        Self::ModelLoad {
            key: key.to_string(),
            message: msg.into(),
        }
    }

    /// Create a synthesis error with message.
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    /// Create an enhancement error with message.
    pub fn enhancement(msg: impl Into<String>) -> Self {
        Self::Enhancement(msg.into())
    }

    /// Create a storage error with message.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a not-found error for an artifact name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a config error with message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error with message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure was caused by the request itself.
    ///
    /// Client errors are rejected before queuing and never touch a model.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::MalformedMarkup(_) | Self::UnknownVoice(_)
        )
    }

    /// Short machine-readable category, used for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::MalformedMarkup(_) => "malformed_markup",
            Self::UnknownVoice(_) => "unknown_voice",
            Self::ModelLoad { .. } => "model_load",
            Self::Synthesis(_) => "synthesis",
            Self::Enhancement(_) => "enhancement",
            Self::Storage(_) => "storage",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TtsError::validation("Text is required");
        assert_eq!(err.to_string(), "Text is required");

        let err = TtsError::model_load("ru/v4_ru", "weights missing");
        assert_eq!(
            err.to_string(),
            "could not load voice model ru/v4_ru: weights missing"
        );

        let err = TtsError::not_found("x.wav");
        assert_eq!(err.to_string(), "Audio file x.wav not found");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(TtsError::validation("empty").is_client_error());
        assert!(TtsError::malformed_markup("unclosed <p>").is_client_error());
        assert!(TtsError::unknown_voice("nope").is_client_error());

        assert!(!TtsError::synthesis("overflow").is_client_error());
        assert!(!TtsError::storage("disk full").is_client_error());
        assert!(!TtsError::not_found("a.wav").is_client_error());
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(TtsError::model_load("k", "m").kind(), "model_load");
        assert_eq!(TtsError::enhancement("nan").kind(), "enhancement");
    }
}

//! Speech pipeline: validation on the caller's thread, synthesis on a worker.

use std::sync::Arc;
use std::time::Instant;

use text_normalizer::Normalizer;
use tracing::{info, instrument};
use tts_core::{
    AudioArtifact, ModelLoader, NormText, RawAudio, ServerConfig, SynthesisRequest, TextNormalizer,
    TtsError, TtsResult, VoiceKey,
};

use crate::catalog::Catalog;
use crate::engine::SynthesisEngine;
use crate::enhance::PostProcessor;
use crate::job::{Job, JobStage};
use crate::metrics::TtsMetrics;
use crate::mock::MockModelLoader;
use crate::store::AudioStore;

/// A request that passed validation and is ready for a worker.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// Request id.
    pub id: uuid::Uuid,
    /// Backend to synthesize with.
    pub key: VoiceKey,
    /// Speaker within the backend.
    pub speaker: String,
    /// Normalized text and prosody markers.
    pub text: NormText,
    /// Run the post-processor.
    pub enhance_noise: bool,
}

/// Normalizer, catalog, engine, post-processor and store wired together.
pub struct SpeechPipeline {
    normalizer: Arc<dyn TextNormalizer>,
    catalog: Arc<Catalog>,
    engine: Arc<SynthesisEngine>,
    post: PostProcessor,
    store: AudioStore,
    max_text_chars: usize,
    metrics: TtsMetrics,
}

impl std::fmt::Debug for SpeechPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechPipeline")
            .field("engine", &self.engine)
            .field("post", &self.post)
            .field("store", &self.store)
            .field("max_text_chars", &self.max_text_chars)
            .finish_non_exhaustive()
    }
}

impl SpeechPipeline {
    /// Assemble a pipeline from its parts.
    pub fn new(
        normalizer: Arc<dyn TextNormalizer>,
        catalog: Arc<Catalog>,
        engine: Arc<SynthesisEngine>,
        post: PostProcessor,
        store: AudioStore,
        max_text_chars: usize,
    ) -> Self {
        Self {
            normalizer,
            catalog,
            engine,
            post,
            store,
            max_text_chars,
            metrics: TtsMetrics,
        }
    }

    /// Build from configuration with the given model loader.
    pub fn from_config(config: &ServerConfig, loader: Arc<dyn ModelLoader>) -> TtsResult<Self> {
        let catalog = Arc::new(Self::catalog_from_config(config)?);
        Self::with_catalog(config, catalog, loader)
    }

    /// Build from configuration with the mock voice backend.
    pub fn new_mock(config: &ServerConfig) -> TtsResult<Self> {
        let catalog = Arc::new(Self::catalog_from_config(config)?);
        let loader = Arc::new(MockModelLoader::new(catalog.clone(), config.sample_rate));
        info!(sample_rate = config.sample_rate, "Creating pipeline with mock voice backend");
        Self::with_catalog(config, catalog, loader)
    }

    fn with_catalog(
        config: &ServerConfig,
        catalog: Arc<Catalog>,
        loader: Arc<dyn ModelLoader>,
    ) -> TtsResult<Self> {
        config.validate()?;
        Ok(Self::new(
            Arc::new(Normalizer::new()),
            catalog,
            Arc::new(SynthesisEngine::new(loader)),
            PostProcessor::denoiser(config.enhance.clone()),
            AudioStore::open(&config.output_dir)?,
            config.max_text_chars,
        ))
    }

    /// Catalog named by the configuration (built-in unless overridden).
    pub fn catalog_from_config(config: &ServerConfig) -> TtsResult<Catalog> {
        let catalog = match &config.catalog {
            Some(manifest) => Catalog::from_config(manifest.clone())?,
            None => Catalog::builtin(),
        };
        catalog.with_default_language(config.defaults.language)
    }

    /// Voice catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Synthesis engine.
    pub fn engine(&self) -> &Arc<SynthesisEngine> {
        &self.engine
    }

    /// Audio store.
    pub fn store(&self) -> &AudioStore {
        &self.store
    }

    /// Cheap checks that run before anything is queued: text length, markup,
    /// voice selection. Never touches a model.
    #[instrument(skip(self, request), fields(request_id = %request.id, text_len = request.text.len()))]
    pub fn validate(&self, request: &SynthesisRequest) -> TtsResult<ValidatedRequest> {
        if request.text.trim().is_empty() {
            return Err(TtsError::validation("Text is required"));
        }
        let chars = request.text.chars().count();
        if chars > self.max_text_chars {
            return Err(TtsError::validation(format!(
                "Text is too long: {chars} characters (limit {})",
                self.max_text_chars
            )));
        }

        let text = self.normalizer.normalize(&request.text)?;
        let voice = self.catalog.resolve(
            request.lang,
            request.model_id.as_deref(),
            &request.speaker,
        )?;

        Ok(ValidatedRequest {
            id: request.id,
            key: voice.key,
            speaker: voice.speaker,
            text,
            enhance_noise: request.enhance_noise,
        })
    }

    /// Synthesize, post-process and persist. Blocking; run on a worker.
    ///
    /// Advances `job` from `Queued` to `Persisted`, or to `Failed`.
    #[instrument(skip_all, fields(request_id = %request.id, key = %request.key, speaker = %request.speaker))]
    pub fn run(&self, job: &mut Job, request: &ValidatedRequest) -> TtsResult<AudioArtifact> {
        let result = self.run_stages(job, request);
        if result.is_err() {
            job.fail();
        }
        result
    }

    fn run_stages(&self, job: &mut Job, request: &ValidatedRequest) -> TtsResult<AudioArtifact> {
        let start = Instant::now();

        job.advance(JobStage::Synthesizing)?;
        let audio = self
            .engine
            .synthesize(&request.key, &request.speaker, &request.text)?;

        job.advance(JobStage::PostProcessing)?;
        let audio = if request.enhance_noise {
            self.post.apply(audio)
        } else {
            audio
        };

        let artifact = self.store.save(&audio)?;
        job.advance(JobStage::Persisted)?;

        self.metrics
            .record_audio(artifact.duration_secs, start.elapsed().as_secs_f64() * 1000.0);
        Ok(artifact)
    }

    /// Synthesize and post-process without persisting. Blocking.
    pub fn render(&self, request: &ValidatedRequest) -> TtsResult<RawAudio> {
        let audio = self
            .engine
            .synthesize(&request.key, &request.speaker, &request.text)?;
        Ok(if request.enhance_noise {
            self.post.apply(audio)
        } else {
            audio
        })
    }

    /// Validate and run on the current thread (CLI and tests).
    pub fn synthesize_blocking(&self, request: &SynthesisRequest) -> TtsResult<AudioArtifact> {
        let mut job = Job::new(request.id);
        let validated = self.validate(request)?;
        job.advance(JobStage::Validated)?;
        job.advance(JobStage::Queued)?;
        self.run(&mut job, &validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tts_core::Lang;

    fn pipeline(dir: &std::path::Path) -> SpeechPipeline {
        let config = ServerConfig {
            output_dir: dir.to_path_buf(),
            sample_rate: 8_000,
            max_text_chars: 100,
            ..Default::default()
        };
        SpeechPipeline::new_mock(&config).unwrap()
    }

    #[test]
    fn test_validate_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let validated = pipeline
            .validate(&SynthesisRequest::new("<speak>Hello</speak>"))
            .unwrap();
        assert_eq!(validated.key, VoiceKey::new(Lang::Ru, "v4_ru"));
        assert_eq!(validated.speaker, "xenia");
        assert_eq!(validated.text.text, "Hello");
        assert!(!pipeline.engine().is_loaded(&validated.key));
    }

    #[test]
    fn test_validate_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let cases = [
            (SynthesisRequest::new(""), "validation"),
            (SynthesisRequest::new("x".repeat(101)), "validation"),
            (SynthesisRequest::new("<p>open"), "malformed_markup"),
            (SynthesisRequest::new("hi").with_speaker("nonexistent"), "unknown_voice"),
            (
                SynthesisRequest::new("hi").with_lang(Lang::En).with_model("v4_ru"),
                "unknown_voice",
            ),
        ];
        for (request, kind) in cases {
            let err = pipeline.validate(&request).unwrap_err();
            assert_eq!(err.kind(), kind, "{err}");
            assert!(err.is_client_error());
        }
        assert!(pipeline.engine().loaded_keys().is_empty());
    }

    #[test]
    fn test_synthesize_blocking_persists() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let request = SynthesisRequest::new("Hello world")
            .with_lang(Lang::En)
            .with_speaker("lj")
            .with_enhance_noise(false);
        let artifact = pipeline.synthesize_blocking(&request).unwrap();

        assert!(artifact.duration_secs > 0.0);
        let on_disk = std::fs::read(pipeline.store().root().join(&artifact.filename)).unwrap();
        assert_eq!(on_disk, artifact.bytes);
    }

    #[test]
    fn test_render_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let request = pipeline
            .validate(&SynthesisRequest::new("Guten Tag").with_lang(Lang::De).with_speaker("thorsten"))
            .unwrap();
        let audio = pipeline.render(&request).unwrap();

        assert_eq!(audio.sample_rate, 8_000);
        assert!(!audio.is_empty());
        assert_eq!(std::fs::read_dir(pipeline.store().root()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_run_marks_job_failed() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        // Bypass validation with a speaker the model does not have.
        let request = ValidatedRequest {
            id: uuid::Uuid::new_v4(),
            key: VoiceKey::new(Lang::Ru, "v4_ru"),
            speaker: "lj".to_string(),
            text: NormText::new("привет"),
            enhance_noise: true,
        };
        let mut job = Job::new(request.id);
        job.advance(JobStage::Validated).unwrap();
        job.advance(JobStage::Queued).unwrap();

        let err = pipeline.run(&mut job, &request).unwrap_err();
        assert!(matches!(err, TtsError::Synthesis(_)));
        assert_eq!(job.stage(), JobStage::Failed);
    }
}

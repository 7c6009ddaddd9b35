//! Synthesis engine: lazily loaded, shared voice models.
//!
//! Each [`VoiceKey`] owns one slot. The first caller for a key runs the
//! loader outside the slot lock; concurrent callers wait on the slot's
//! condvar and share the outcome of that load, success or failure. Every
//! load attempt gets a generation number, and a waiter only accepts the
//! failure recorded for the generation it waited on. Only callers that
//! arrive after a failed load has finished start a new attempt.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, instrument, warn};
use tts_core::{ModelLoader, NormText, RawAudio, TtsError, TtsResult, VoiceKey, VoiceModel};

use crate::metrics::TtsMetrics;

#[derive(Default)]
struct SlotState {
    model: Option<Arc<dyn VoiceModel>>,
    loading: bool,
    generation: u64,
    /// Message of the last failed load and the generation it belongs to.
    failure: Option<(u64, String)>,
}

#[derive(Default)]
struct ModelSlot {
    state: Mutex<SlotState>,
    done: Condvar,
}

/// Voice model cache and blocking synthesis entry point.
pub struct SynthesisEngine {
    loader: Arc<dyn ModelLoader>,
    models: DashMap<VoiceKey, Arc<ModelSlot>>,
    metrics: TtsMetrics,
}

impl std::fmt::Debug for SynthesisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisEngine")
            .field("loaded", &self.loaded_keys())
            .finish()
    }
}

impl SynthesisEngine {
    /// Create an engine backed by `loader`.
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            models: DashMap::new(),
            metrics: TtsMetrics,
        }
    }

    /// Get the model for `key`, loading it on first use. Blocking.
    ///
    /// Callers that arrive while a load is running get that load's result
    /// and never trigger a second one.
    pub fn model(&self, key: &VoiceKey) -> TtsResult<Arc<dyn VoiceModel>> {
        // Clone the slot out so the map shard is not locked during the load.
        let slot = self.models.entry(key.clone()).or_default().clone();

        let mut state = slot.state.lock();
        while state.loading || state.model.is_some() {
            if let Some(model) = &state.model {
                return Ok(model.clone());
            }
            let waited = state.generation;
            while state.loading && state.generation == waited {
                slot.done.wait(&mut state);
            }
            if let Some((generation, message)) = &state.failure {
                if *generation == waited {
                    debug!(key = %key, generation, "Sharing failed load result");
                    return Err(TtsError::model_load(key, message.clone()));
                }
            }
        }

        state.loading = true;
        state.generation += 1;
        let generation = state.generation;
        drop(state);

        let result = self.load_checked(key);

        let mut state = slot.state.lock();
        state.loading = false;
        match &result {
            Ok(model) => {
                state.model = Some(model.clone());
                state.failure = None;
            }
            Err(e) => {
                let message = match e {
                    TtsError::ModelLoad { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                state.failure = Some((generation, message));
            }
        }
        drop(state);
        slot.done.notify_all();
        result
    }

    /// Run the loader once and validate what it returned.
    fn load_checked(&self, key: &VoiceKey) -> TtsResult<Arc<dyn VoiceModel>> {
        info!(key = %key, "Loading voice model");
        let start = Instant::now();
        let loaded = panic::catch_unwind(AssertUnwindSafe(|| self.loader.load(key)))
            .unwrap_or_else(|_| Err(TtsError::model_load(key, "loader panicked")));
        let result = loaded.and_then(|model| {
            if model.key() != key {
                return Err(TtsError::model_load(
                    key,
                    format!("loader returned model for {}", model.key()),
                ));
            }
            if model.sample_rate() == 0 {
                return Err(TtsError::model_load(key, "model reports zero sample rate"));
            }
            Ok(model)
        });

        self.metrics.model_loaded(result.is_ok());
        match &result {
            Ok(model) => info!(
                key = %key,
                speakers = model.speakers().len(),
                load_ms = start.elapsed().as_millis() as u64,
                "Voice model loaded"
            ),
            Err(e) => warn!(key = %key, error = %e, "Voice model load failed"),
        }
        result
    }

    /// Load `key` now instead of on first request.
    pub fn preload(&self, key: &VoiceKey) -> TtsResult<()> {
        self.model(key).map(|_| ())
    }

    /// Whether `key` has a loaded model.
    pub fn is_loaded(&self, key: &VoiceKey) -> bool {
        self.models
            .get(key)
            .is_some_and(|slot| slot.state.lock().model.is_some())
    }

    /// Keys with a loaded model.
    pub fn loaded_keys(&self) -> Vec<VoiceKey> {
        self.models
            .iter()
            .filter(|entry| entry.value().state.lock().model.is_some())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Render `text` with `speaker` on the model for `key`. Blocking.
    ///
    /// Prosody markers are dropped for backends that do not consume them.
    #[instrument(skip(self, text), fields(key = %key, text_len = text.text.len()))]
    pub fn synthesize(&self, key: &VoiceKey, speaker: &str, text: &NormText) -> TtsResult<RawAudio> {
        let model = self.model(key)?;

        let stripped;
        let text = if model.supports_prosody() || text.markers.is_empty() {
            text
        } else {
            debug!(markers = text.markers.len(), "Backend ignores prosody, dropping markers");
            stripped = text.without_markers();
            &stripped
        };

        let start = Instant::now();
        let audio = model.synthesize(text, speaker)?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_synthesis_latency(elapsed_ms);

        if audio.is_empty() {
            return Err(TtsError::synthesis("model produced no audio"));
        }
        if audio.samples.iter().any(|s| !s.is_finite()) {
            return Err(TtsError::synthesis("model produced non-finite samples"));
        }

        debug!(
            samples = audio.num_samples(),
            duration_s = audio.duration_secs(),
            elapsed_ms,
            "Synthesis complete"
        );
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::mock::MockModelLoader;
    use std::time::Duration;
    use tts_core::{Directive, Lang, ProsodyMarker};

    /// Backend without prosody support that records what it was given.
    struct PlainModel {
        key: VoiceKey,
        speakers: Vec<String>,
        seen_markers: parking_lot::Mutex<Vec<usize>>,
    }

    impl VoiceModel for PlainModel {
        fn key(&self) -> &VoiceKey {
            &self.key
        }
        fn sample_rate(&self) -> u32 {
            16_000
        }
        fn speakers(&self) -> &[String] {
            &self.speakers
        }
        fn synthesize(&self, text: &NormText, _speaker: &str) -> TtsResult<RawAudio> {
            self.seen_markers.lock().push(text.markers.len());
            Ok(RawAudio::new(vec![0.0; 160], 16_000))
        }
    }

    struct PlainLoader(Arc<PlainModel>);

    impl ModelLoader for PlainLoader {
        fn load(&self, _key: &VoiceKey) -> TtsResult<Arc<dyn VoiceModel>> {
            Ok(self.0.clone())
        }
    }

    struct PanickingLoader;

    impl ModelLoader for PanickingLoader {
        fn load(&self, _key: &VoiceKey) -> TtsResult<Arc<dyn VoiceModel>> {
            panic!("weights file truncated");
        }
    }

    fn mock_engine() -> (Arc<MockModelLoader>, SynthesisEngine) {
        let loader = Arc::new(MockModelLoader::new(Arc::new(Catalog::builtin()), 8_000));
        let engine = SynthesisEngine::new(loader.clone());
        (loader, engine)
    }

    #[test]
    fn test_lazy_load_once() {
        let (loader, engine) = mock_engine();
        let key = VoiceKey::new(Lang::Ru, "v4_ru");
        assert!(!engine.is_loaded(&key));

        engine.synthesize(&key, "xenia", &NormText::new("да")).unwrap();
        engine.synthesize(&key, "baya", &NormText::new("нет")).unwrap();

        assert!(engine.is_loaded(&key));
        assert_eq!(loader.load_count(), 1);
        assert_eq!(engine.loaded_keys(), vec![key]);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let (loader, engine) = mock_engine();
        let key = VoiceKey::new(Lang::De, "v3_de");
        loader.fail_next_loads(key.clone(), 1);

        let err = engine.preload(&key).unwrap_err();
        assert!(matches!(err, TtsError::ModelLoad { .. }));
        assert!(!engine.is_loaded(&key));

        engine.preload(&key).unwrap();
        assert!(engine.is_loaded(&key));
        assert_eq!(loader.load_count(), 2);
    }

    #[test]
    fn test_markers_dropped_without_prosody_support() {
        let key = VoiceKey::new(Lang::En, "v3_en");
        let model = Arc::new(PlainModel {
            key: key.clone(),
            speakers: vec!["lj".to_string()],
            seen_markers: parking_lot::Mutex::new(Vec::new()),
        });
        let engine = SynthesisEngine::new(Arc::new(PlainLoader(model.clone())));

        let text = NormText::with_markers(
            "hello",
            vec![ProsodyMarker::point(5, Directive::Pause { ms: 100 })],
        );
        engine.synthesize(&key, "lj", &text).unwrap();
        assert_eq!(*model.seen_markers.lock(), vec![0]);
    }

    #[test]
    fn test_key_mismatch_is_load_error() {
        let model = Arc::new(PlainModel {
            key: VoiceKey::new(Lang::En, "v3_en"),
            speakers: vec!["lj".to_string()],
            seen_markers: parking_lot::Mutex::new(Vec::new()),
        });
        let engine = SynthesisEngine::new(Arc::new(PlainLoader(model)));
        let err = engine.preload(&VoiceKey::new(Lang::En, "lj_v2")).unwrap_err();
        assert!(matches!(err, TtsError::ModelLoad { .. }));
    }

    #[test]
    fn test_waiters_share_failed_load() {
        let catalog = Arc::new(Catalog::builtin());
        let loader = Arc::new(
            MockModelLoader::new(catalog, 8_000).with_load_delay(Duration::from_millis(150)),
        );
        let engine = Arc::new(SynthesisEngine::new(loader.clone()));
        let key = VoiceKey::new(Lang::Ru, "v4_ru");
        loader.fail_next_loads(key.clone(), 100);

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let engine = engine.clone();
                let key = key.clone();
                std::thread::spawn(move || engine.preload(&key))
            })
            .collect();
        for handle in handles {
            let err = handle.join().unwrap().unwrap_err();
            assert!(err.to_string().contains("simulated load failure"), "{err}");
        }

        assert_eq!(loader.load_count(), 1);
        assert!(!engine.is_loaded(&key));
    }

    #[test]
    fn test_loader_panic_is_load_error() {
        let engine = SynthesisEngine::new(Arc::new(PanickingLoader));
        let key = VoiceKey::new(Lang::En, "v3_en");

        for _ in 0..2 {
            let err = engine.preload(&key).unwrap_err();
            assert!(matches!(err, TtsError::ModelLoad { .. }));
        }
        assert!(!engine.is_loaded(&key));
    }
}

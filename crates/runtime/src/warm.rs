use std::sync::Arc;

use tracing::{info, warn};
use tts_core::{Lang, NormText, VoiceKey};

use crate::engine::SynthesisEngine;
use crate::mock::RANDOM_SPEAKER;

fn sample_text(lang: Lang) -> &'static str {
    match lang {
        Lang::Ru => "Привет! Это пример текста для прогрева системы.",
        Lang::En => "Hello! This is a sample text for system warmup.",
        Lang::De => "Hallo! Dies ist ein Beispieltext zum Aufwärmen.",
    }
}

/// Load the given voices and run one sample synthesis on each.
///
/// Failures are logged, not returned: a key that fails here is loaded again
/// on its first real request. Returns how many keys are ready.
///
/// # Example
/// ```ignore
/// use runtime::warm::warm_model_cache;
/// let ready = warm_model_cache(&engine, &[VoiceKey::new(Lang::Ru, "v4_ru")]);
/// ```
pub fn warm_model_cache(engine: &Arc<SynthesisEngine>, keys: &[VoiceKey]) -> usize {
    info!(keys = keys.len(), "Warming model cache...");

    let mut ready = 0;
    for key in keys {
        let model = match engine.model(key) {
            Ok(model) => model,
            Err(e) => {
                warn!(key = %key, error = %e, "Warmup load failed");
                continue;
            }
        };

        let speaker = model
            .speakers()
            .iter()
            .find(|s| s.as_str() != RANDOM_SPEAKER)
            .or_else(|| model.speakers().first())
            .cloned();
        if let Some(speaker) = speaker {
            let text = NormText::new(sample_text(key.lang));
            if let Err(e) = engine.synthesize(key, &speaker, &text) {
                warn!(key = %key, error = %e, "Warmup synthesis failed");
            }
        }
        ready += 1;
    }

    info!(ready, "Cold start pre-warming complete");
    ready
}

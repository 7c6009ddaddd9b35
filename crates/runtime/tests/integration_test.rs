//! Integration tests for the speech runtime.
//!
//! These run the whole pipeline (normalizer → catalog → engine → enhancer →
//! store) against the mock voice backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use runtime::{
    AudioStore, Catalog, Dispatcher, MockModelLoader, PostProcessor, SpeechPipeline,
    SynthesisEngine,
};
use text_normalizer::Normalizer;
use tts_core::{EnhanceConfig, Lang, RawAudio, SynthesisRequest, TtsError, VoiceKey};

const SAMPLE_RATE: u32 = 16_000;

/// Pipeline plus a handle on its loader for counting loads.
fn pipeline_with_loader(
    dir: &std::path::Path,
    load_delay: Duration,
) -> (Arc<SpeechPipeline>, Arc<MockModelLoader>) {
    let catalog = Arc::new(Catalog::builtin());
    let loader = Arc::new(
        MockModelLoader::new(catalog.clone(), SAMPLE_RATE).with_load_delay(load_delay),
    );
    let pipeline = SpeechPipeline::new(
        Arc::new(Normalizer::new()),
        catalog,
        Arc::new(SynthesisEngine::new(loader.clone())),
        PostProcessor::denoiser(EnhanceConfig::default()),
        AudioStore::open(dir).unwrap(),
        10_000,
    );
    (Arc::new(pipeline), loader)
}

/// Every manifest triple resolves; anything outside it is an unknown voice.
#[test]
fn test_catalog_resolve_law() {
    let catalog = Catalog::builtin();

    for key in catalog.keys() {
        for speaker in catalog.speakers(&key).unwrap() {
            let voice = catalog
                .resolve(Some(key.lang), Some(&key.model_id), speaker)
                .unwrap();
            assert_eq!(voice.key, key);
            assert_eq!(&voice.speaker, speaker);
        }
    }

    let outside = [
        (Lang::Ru, "v4_ru", "lj"),
        (Lang::En, "v3_en", "xenia"),
        (Lang::De, "v4_ru", "thorsten"),
        (Lang::En, "v5_en", "lj"),
        (Lang::Ru, "v4_ru", ""),
    ];
    for (lang, model, speaker) in outside {
        let err = catalog.resolve(Some(lang), Some(model), speaker).unwrap_err();
        assert!(matches!(err, TtsError::UnknownVoice(_)), "{lang}/{model}/{speaker}");
    }
}

/// Identical requests give audio of the same duration.
#[test]
fn test_repeated_synthesis_duration_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _) = pipeline_with_loader(dir.path(), Duration::ZERO);

    let request = || {
        SynthesisRequest::new(
            r#"<speak>Привет, мир! <break time="300ms"/> <prosody rate="slow">Как дела?</prosody></speak>"#,
        )
        .with_speaker("random")
    };

    let first = pipeline.synthesize_blocking(&request()).unwrap();
    for _ in 0..3 {
        let next = pipeline.synthesize_blocking(&request()).unwrap();
        assert!((next.duration_secs - first.duration_secs).abs() < 1e-3);
        assert_ne!(next.filename, first.filename);
    }
}

/// Many concurrent requests for an unloaded key load it exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_load_model_once() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, loader) = pipeline_with_loader(dir.path(), Duration::from_millis(300));
    let dispatcher = Dispatcher::new(pipeline.clone(), 16);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            let request = SynthesisRequest::new(format!("Request number {i}"))
                .with_lang(Lang::En)
                .with_speaker("lj")
                .with_enhance_noise(i % 2 == 0);
            dispatcher.submit(request).await
        }));
    }

    let mut names = HashSet::new();
    for task in tasks {
        let artifact = task.await.unwrap().unwrap();
        assert!(names.insert(artifact.filename));
    }

    assert_eq!(loader.load_count(), 1);
    assert_eq!(
        pipeline.engine().loaded_keys(),
        vec![VoiceKey::new(Lang::En, "v3_en")]
    );
}

/// A failed load is reported, then retried by the next request.
#[tokio::test]
async fn test_model_load_failure_then_retry() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, loader) = pipeline_with_loader(dir.path(), Duration::ZERO);
    let dispatcher = Dispatcher::new(pipeline, 2);
    loader.fail_next_loads(VoiceKey::new(Lang::De, "v3_de"), 1);

    let request = || {
        SynthesisRequest::new("Guten Tag")
            .with_lang(Lang::De)
            .with_speaker("thorsten")
    };

    let err = dispatcher.submit(request()).await.unwrap_err();
    assert!(matches!(err, TtsError::ModelLoad { .. }));
    assert!(!err.is_client_error());

    dispatcher.submit(request()).await.unwrap();
    assert_eq!(loader.load_count(), 2);
}

/// Requests that pile up behind a failing load all get its error; the
/// loader runs once for the whole batch.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_failed_load() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, loader) = pipeline_with_loader(dir.path(), Duration::from_millis(200));
    let dispatcher = Dispatcher::new(pipeline.clone(), 12);
    let key = VoiceKey::new(Lang::De, "v3_de");
    loader.fail_next_loads(key.clone(), 1000);

    let mut tasks = Vec::new();
    for i in 0..12 {
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            let request = SynthesisRequest::new(format!("Anfrage {i}"))
                .with_lang(Lang::De)
                .with_speaker("thorsten");
            dispatcher.submit(request).await
        }));
    }

    for task in tasks {
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, TtsError::ModelLoad { .. }), "{err}");
    }

    assert_eq!(loader.load_count(), 1);
    assert!(!pipeline.engine().is_loaded(&key));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// Saved audio comes back byte for byte.
#[tokio::test]
async fn test_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = AudioStore::open(dir.path()).unwrap();
    let audio = RawAudio::new((0..2400).map(|i| ((i % 50) as f32 / 50.0) - 0.5).collect(), 24_000);

    let artifact = store.save(&audio).unwrap();
    let loaded = store.load(&artifact.filename).await.unwrap();

    assert_eq!(loaded, artifact.bytes);
    let decoded = audio_codec::decode_wav(&loaded).unwrap();
    assert_eq!(decoded.num_samples(), 2400);
    assert_eq!(decoded.sample_rate, 24_000);
}

/// Names the store never issued are not found, even if a file exists there.
#[tokio::test]
async fn test_store_rejects_foreign_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = AudioStore::open(dir.path().join("outputs")).unwrap();
    std::fs::write(dir.path().join("secrets"), b"password").unwrap();
    std::fs::write(store.root().join("notes.wav"), b"RIFF").unwrap();

    for name in [
        "../secrets",
        "..\\secrets",
        "notes.wav",
        "/etc/passwd",
        "%2e%2e%2fsecrets",
        "00000000-0000-0000-0000-000000000000.wav/../../secrets",
    ] {
        let err = store.load(name).await.unwrap_err();
        assert!(matches!(err, TtsError::NotFound(_)), "{name}");
    }
}

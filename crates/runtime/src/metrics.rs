//! Metrics collection and Prometheus export.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tts_core::{TtsError, TtsResult};

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Metrics recorder for TTS operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtsMetrics;

impl TtsMetrics {
    /// Install the process-wide Prometheus recorder.
    ///
    /// Safe to call more than once; later calls return the same handle.
    pub fn install_prometheus() -> TtsResult<PrometheusHandle> {
        PROMETHEUS
            .get_or_try_init(|| {
                let handle = PrometheusBuilder::new()
                    .install_recorder()
                    .map_err(|e| TtsError::internal(format!("metrics init failed: {e}")))?;
                Self::register_metrics();
                Ok(handle)
            })
            .cloned()
    }

    /// Metrics handle that records nothing unless a recorder is installed.
    pub fn noop() -> Self {
        Self
    }

    fn register_metrics() {
        // Request metrics
        describe_counter!("tts_requests_total", "Total number of TTS requests received");
        describe_counter!(
            "tts_requests_rejected",
            "Requests rejected during validation, by error kind"
        );
        describe_counter!(
            "tts_requests_completed",
            "Total number of TTS requests completed successfully"
        );
        describe_counter!(
            "tts_requests_failed",
            "Total number of TTS requests that failed after queuing, by error kind"
        );

        // Model and post-processing
        describe_counter!("tts_model_loads_total", "Voice model loads, by outcome");
        describe_counter!(
            "tts_enhancement_fallbacks_total",
            "Enhancement failures that fell back to unenhanced audio"
        );

        // Latency metrics
        describe_histogram!(
            "tts_synthesis_latency_ms",
            "Model inference latency in milliseconds"
        );
        describe_histogram!(
            "tts_total_latency_ms",
            "Total request latency in milliseconds"
        );
        describe_histogram!("tts_audio_duration_s", "Duration of generated audio in seconds");
        describe_histogram!(
            "tts_rtf",
            "Real-time factor (processing time / audio duration)"
        );

        describe_gauge!("tts_active_jobs", "Synthesis jobs currently on a worker");
    }

    /// Record a new request received.
    pub fn request_received(&self) {
        counter!("tts_requests_total").increment(1);
    }

    /// Record a request rejected before queuing.
    pub fn request_rejected(&self, kind: &'static str) {
        counter!("tts_requests_rejected", "kind" => kind).increment(1);
    }

    /// Record a request completed successfully.
    pub fn request_completed(&self) {
        counter!("tts_requests_completed").increment(1);
    }

    /// Record a request that failed on a worker.
    pub fn request_failed(&self, kind: &'static str) {
        counter!("tts_requests_failed", "kind" => kind).increment(1);
    }

    /// Record a model load attempt.
    pub fn model_loaded(&self, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        counter!("tts_model_loads_total", "outcome" => outcome).increment(1);
    }

    /// Record an enhancement fallback.
    pub fn enhancement_fallback(&self) {
        counter!("tts_enhancement_fallbacks_total").increment(1);
    }

    /// Record inference latency.
    pub fn record_synthesis_latency(&self, ms: f64) {
        histogram!("tts_synthesis_latency_ms").record(ms);
    }

    /// Record total latency.
    pub fn record_total_latency(&self, ms: f64) {
        histogram!("tts_total_latency_ms").record(ms);
    }

    /// Record generated audio length and the resulting real-time factor.
    pub fn record_audio(&self, duration_s: f64, processing_ms: f64) {
        histogram!("tts_audio_duration_s").record(duration_s);
        if duration_s > 0.0 {
            histogram!("tts_rtf").record(processing_ms / 1000.0 / duration_s);
        }
    }

    /// Adjust the number of jobs running on workers.
    pub fn job_started(&self) {
        gauge!("tts_active_jobs").increment(1.0);
    }

    /// See [`TtsMetrics::job_started`].
    pub fn job_finished(&self) {
        gauge!("tts_active_jobs").decrement(1.0);
    }
}

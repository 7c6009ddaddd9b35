//! Request dispatcher: bounded offload of blocking synthesis.
//!
//! Validation runs inline on the async task. Everything from `Queued` to
//! `Persisted` runs on tokio's blocking pool, at most `max_workers` jobs at a
//! time. The semaphore permit moves into the blocking closure, so if the
//! caller goes away the job still finishes, still holds its slot until then,
//! and its result is dropped.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};
use tts_core::{AudioArtifact, SynthesisRequest, TtsError, TtsResult};

use crate::job::{Job, JobStage};
use crate::metrics::TtsMetrics;
use crate::pipeline::SpeechPipeline;

/// Front door for synthesis requests.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pipeline: Arc<SpeechPipeline>,
    workers: Arc<Semaphore>,
    max_workers: usize,
    metrics: TtsMetrics,
}

impl Dispatcher {
    /// Create a dispatcher running at most `max_workers` jobs at once.
    pub fn new(pipeline: Arc<SpeechPipeline>, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        info!(max_workers, "Dispatcher ready");
        Self {
            pipeline,
            workers: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            metrics: TtsMetrics,
        }
    }

    /// The pipeline jobs run through.
    pub fn pipeline(&self) -> &Arc<SpeechPipeline> {
        &self.pipeline
    }

    /// Worker pool size.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Jobs currently holding a worker slot.
    pub fn active_jobs(&self) -> usize {
        self.max_workers - self.workers.available_permits()
    }

    /// Validate, queue, synthesize and persist one request.
    #[instrument(skip_all, fields(request_id = %request.id))]
    pub async fn submit(&self, request: SynthesisRequest) -> TtsResult<AudioArtifact> {
        self.metrics.request_received();
        let mut job = Job::new(request.id);

        let validated = match self.pipeline.validate(&request) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Request rejected");
                job.advance(JobStage::Rejected)?;
                job.advance(JobStage::Responded)?;
                self.metrics.request_rejected(e.kind());
                return Err(e);
            }
        };
        job.advance(JobStage::Validated)?;
        job.advance(JobStage::Queued)?;

        let Ok(permit) = self.workers.clone().acquire_owned().await else {
            job.fail();
            job.advance(JobStage::Responded)?;
            self.metrics.request_failed("internal");
            return Err(TtsError::internal("worker pool is closed"));
        };

        let pipeline = self.pipeline.clone();
        let metrics = self.metrics;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            metrics.job_started();
            let result = pipeline.run(&mut job, &validated);
            metrics.job_finished();
            (job, result)
        });

        let (mut job, result) = handle.await.map_err(|e| {
            error!(error = %e, "Synthesis worker panicked");
            self.metrics.request_failed("internal");
            TtsError::internal(format!("synthesis worker failed: {e}"))
        })?;

        match &result {
            Ok(artifact) => {
                self.metrics.request_completed();
                info!(
                    filename = %artifact.filename,
                    duration_s = artifact.duration_secs,
                    elapsed_ms = job.elapsed().as_millis() as u64,
                    "Request completed"
                );
            }
            Err(e) => {
                self.metrics.request_failed(e.kind());
                error!(error = %e, kind = e.kind(), "Request failed");
            }
        }
        self.metrics
            .record_total_latency(job.elapsed().as_secs_f64() * 1000.0);
        job.advance(JobStage::Responded)?;
        result
    }

    /// Stop accepting new jobs; jobs already on a worker run to completion.
    pub fn close(&self) {
        self.workers.close();
    }
}

//! Per-request lifecycle.
//!
//! ```text
//! Received ─▶ Validated ─▶ Queued ─▶ Synthesizing ─▶ PostProcessing ─▶ Persisted ─▶ Responded
//!    │                        │            │               │                            ▲
//!    ▼                        └────────────┴───────────────┴──▶ Failed ─────────────────┤
//! Rejected ─────────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use tracing::debug;
use tts_core::{TtsError, TtsResult};
use uuid::Uuid;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStage {
    Received,
    Validated,
    Rejected,
    Queued,
    Synthesizing,
    PostProcessing,
    Persisted,
    Failed,
    Responded,
}

impl JobStage {
    /// Whether `next` may follow `self`.
    pub fn can_advance_to(self, next: JobStage) -> bool {
        use JobStage::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Received, Rejected)
                | (Validated, Queued)
                | (Queued, Synthesizing)
                | (Synthesizing, PostProcessing)
                | (PostProcessing, Persisted)
                | (Queued | Synthesizing | PostProcessing, Failed)
                | (Persisted | Failed | Rejected, Responded)
        )
    }

    /// Whether the request has been answered.
    pub fn is_terminal(self) -> bool {
        self == JobStage::Responded
    }

    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Received => "received",
            JobStage::Validated => "validated",
            JobStage::Rejected => "rejected",
            JobStage::Queued => "queued",
            JobStage::Synthesizing => "synthesizing",
            JobStage::PostProcessing => "post_processing",
            JobStage::Persisted => "persisted",
            JobStage::Failed => "failed",
            JobStage::Responded => "responded",
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request's progress through the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    id: Uuid,
    stage: JobStage,
    received_at: Instant,
}

impl Job {
    /// A freshly received request.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            stage: JobStage::Received,
            received_at: Instant::now(),
        }
    }

    /// Request id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current stage.
    pub fn stage(&self) -> JobStage {
        self.stage
    }

    /// Time since the request was received.
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// Move to `next`, refusing transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: JobStage) -> TtsResult<()> {
        if !self.stage.can_advance_to(next) {
            return Err(TtsError::internal(format!(
                "job {}: invalid transition {} -> {next}",
                self.id, self.stage
            )));
        }
        debug!(
            job = %self.id,
            from = %self.stage,
            to = %next,
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Job stage"
        );
        self.stage = next;
        Ok(())
    }

    /// Move to `Failed` if the job is still in flight.
    pub fn fail(&mut self) {
        if self.stage.can_advance_to(JobStage::Failed) {
            let _ = self.advance(JobStage::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut job = Job::new(Uuid::new_v4());
        for stage in [
            JobStage::Validated,
            JobStage::Queued,
            JobStage::Synthesizing,
            JobStage::PostProcessing,
            JobStage::Persisted,
            JobStage::Responded,
        ] {
            job.advance(stage).unwrap();
        }
        assert!(job.stage().is_terminal());
    }

    #[test]
    fn test_rejection_path() {
        let mut job = Job::new(Uuid::new_v4());
        job.advance(JobStage::Rejected).unwrap();
        assert!(job.advance(JobStage::Queued).is_err());
        job.advance(JobStage::Responded).unwrap();
    }

    #[test]
    fn test_invalid_transitions() {
        let mut job = Job::new(Uuid::new_v4());
        assert!(matches!(
            job.advance(JobStage::Synthesizing),
            Err(TtsError::Internal(_))
        ));
        assert_eq!(job.stage(), JobStage::Received);

        // Validation failures happen before queuing, never after.
        job.advance(JobStage::Validated).unwrap();
        assert!(job.advance(JobStage::Rejected).is_err());
        assert!(job.advance(JobStage::Failed).is_err());
    }

    #[test]
    fn test_fail_from_worker_stages() {
        let mut job = Job::new(Uuid::new_v4());
        job.advance(JobStage::Validated).unwrap();
        job.advance(JobStage::Queued).unwrap();
        job.advance(JobStage::Synthesizing).unwrap();
        job.fail();
        assert_eq!(job.stage(), JobStage::Failed);

        // Already failed: no-op.
        job.fail();
        job.advance(JobStage::Responded).unwrap();
        job.fail();
        assert_eq!(job.stage(), JobStage::Responded);
    }
}

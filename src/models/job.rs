use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

/// Progress shown for a job the remote side has not started yet.
pub const INITIAL_PROGRESS: f64 = 10.0;

/// Lifecycle state of a tracked transformation job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
    Error,
}

impl JobStatus {
    /// Terminal states are never left once entered.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// One in-flight or recently finished transformation job.
///
/// This is both the persisted form (the slot holds a JSON list of these) and
/// the form handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransformationJob {
    pub job_id: String,
    pub correlation_id: Uuid,
    pub selected_style: String,
    pub status: JobStatus,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransformationJob {
    /// Build a fresh `processing` record for a newly submitted job.
    pub fn start(new: NewJob, started_at: DateTime<Utc>) -> Self {
        Self {
            job_id: new.job_id,
            correlation_id: new.correlation_id,
            selected_style: new.selected_style,
            status: JobStatus::Processing,
            progress: INITIAL_PROGRESS,
            started_at,
            completed_at: None,
            processed_image: None,
            error: None,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Request to start tracking a job the initiator has just submitted.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    #[garde(length(min = 1, max = 200))]
    pub job_id: String,

    #[garde(skip)]
    pub correlation_id: Uuid,

    #[garde(length(min = 1, max = 100))]
    pub selected_style: String,
}

/// Partial update merged into a single record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    #[garde(skip)]
    pub status: Option<JobStatus>,

    #[garde(range(min = 0.0, max = 100.0))]
    pub progress: Option<f64>,

    #[garde(skip)]
    pub completed_at: Option<DateTime<Utc>>,

    #[garde(skip)]
    pub processed_image: Option<String>,

    #[garde(length(max = 1000))]
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn completed(artifact: String, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100.0),
            completed_at: Some(at),
            processed_image: Some(artifact),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            progress: None,
            completed_at: Some(at),
            processed_image: None,
            error: Some(error.into()),
        }
    }

    /// Merge into `job`, touching only the fields present. Returns `false`
    /// and leaves `job` untouched when the record has already finished.
    ///
    /// Progress never moves backwards.
    pub fn apply_to(&self, job: &mut TransformationJob) -> bool {
        if !job.is_open() {
            tracing::debug!(
                job_id = %job.job_id,
                current = %job.status,
                requested = ?self.status,
                "Ignoring update to finished job"
            );
            return false;
        }

        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = job.progress.max(progress.clamp(0.0, 100.0));
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        if let Some(image) = &self.processed_image {
            job.processed_image = Some(image.clone());
        }
        if let Some(error) = &self.error {
            job.error = Some(error.clone());
        }
        true
    }

    /// A `completed` update must carry the artifact it completed with.
    pub fn is_complete(&self) -> bool {
        self.status != Some(JobStatus::Completed) || self.processed_image.is_some()
    }
}

/// Result of a single poll of one job.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    Processing { progress: f64 },
    Completed { artifact: String },
    Failed { error: String },
    Error { message: String },
    NotTracked,
}

impl PollOutcome {
    /// Outcomes after which the job needs no further polling.
    pub fn ends_polling(&self) -> bool {
        matches!(
            self,
            PollOutcome::Completed { .. } | PollOutcome::Failed { .. } | PollOutcome::NotTracked
        )
    }

    /// Outcome implied by a record that already left `processing`.
    pub fn from_record(job: &TransformationJob) -> Self {
        match job.status {
            JobStatus::Processing => PollOutcome::Processing {
                progress: job.progress,
            },
            JobStatus::Completed => match &job.processed_image {
                Some(artifact) => PollOutcome::Completed {
                    artifact: artifact.clone(),
                },
                None => PollOutcome::Error {
                    message: "Completed job has no processed image".to_string(),
                },
            },
            JobStatus::Failed => PollOutcome::Failed {
                error: job.error.clone().unwrap_or_default(),
            },
            JobStatus::Error => PollOutcome::Error {
                message: job.error.clone().unwrap_or_default(),
            },
        }
    }
}

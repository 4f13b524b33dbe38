//! Jobs and their lifecycle states

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::spec::ReportSpec;
use crate::core::constants::DEFAULT_QUERY_CONTEXT;
use crate::data::artifacts::ArtifactPaths;

/// Opaque job identifier (CUID2)
pub type JobId = String;

pub fn new_job_id() -> JobId {
    cuid2::create_id()
}

/// One submitted report, immutable once queued
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub owner: String,
    pub is_admin: bool,
    pub datasource: String,
    pub spec: ReportSpec,
    /// Application tag forwarded to the backend
    pub context: String,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(owner: &str, is_admin: bool, datasource: &str, spec: ReportSpec) -> Self {
        Self {
            id: new_job_id(),
            owner: owner.to_string(),
            is_admin,
            datasource: datasource.to_string(),
            spec,
            context: DEFAULT_QUERY_CONTEXT.to_string(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// Stored job state. `expired` is never stored; it is derived on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    FinishedOk,
    FinishedError,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::FinishedOk | JobState::FinishedError)
    }
}

/// What a reader sees for a job id
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub state: JobState,
    pub owner: String,
    pub error: Option<String>,
    pub artifacts: Option<ArtifactPaths>,
    pub rows: Option<usize>,
}

impl JobResult {
    pub fn queued(owner: &str) -> Self {
        Self {
            state: JobState::Queued,
            owner: owner.to_string(),
            error: None,
            artifacts: None,
            rows: None,
        }
    }

    pub fn running(owner: &str) -> Self {
        Self {
            state: JobState::Running,
            ..Self::queued(owner)
        }
    }

    pub fn finished_ok(owner: &str, artifacts: ArtifactPaths, rows: usize) -> Self {
        Self {
            state: JobState::FinishedOk,
            artifacts: Some(artifacts),
            rows: Some(rows),
            ..Self::queued(owner)
        }
    }

    pub fn finished_error(owner: &str, error: impl Into<String>) -> Self {
        Self {
            state: JobState::FinishedError,
            error: Some(error.into()),
            ..Self::queued(owner)
        }
    }
}

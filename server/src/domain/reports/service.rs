//! Report intake, status and download lookups

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use thiserror::Error;

use super::job::{Job, JobId, JobResult, JobState};
use super::registry::JobRegistry;
use super::spec::ReportSpec;
use crate::data::artifacts::{ArtifactKind, ArtifactPaths, FileArtifactSink};
use crate::domain::access::{RightsProblem, check_rights};
use crate::domain::schema::SchemaStore;

/// Status names exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Waiting,
    Processing,
    Complete,
    Error,
    Expired,
    Unknown,
}

impl From<JobState> for ReportStatus {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Queued => ReportStatus::Waiting,
            JobState::Running => ReportStatus::Processing,
            JobState::FinishedOk => ReportStatus::Complete,
            JobState::FinishedError => ReportStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: ReportStatus,
    pub error: Option<String>,
    pub artifacts: Option<ArtifactPaths>,
}

impl StatusReport {
    fn bare(status: ReportStatus) -> Self {
        Self {
            status,
            error: None,
            artifacts: None,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SubmitError {
    #[error("report rejected: {}", format_problems(.0))]
    Rejected(Vec<RightsProblem>),
}

fn format_problems(problems: &[RightsProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    #[error("report not found")]
    NotFound,
    #[error("report belongs to another user")]
    Forbidden,
    #[error("report is not ready")]
    NotReady,
    #[error("report has expired")]
    Gone,
}

/// Schema entry as shown to one caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasourceListing {
    pub dimensions: Vec<String>,
    pub metrics: Vec<MetricListing>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricListing {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
}

pub struct ReportService {
    registry: Arc<JobRegistry>,
    schemas: Arc<SchemaStore>,
    artifacts: FileArtifactSink,
    max_file_age: Option<Duration>,
}

impl ReportService {
    /// `max_file_age` of `None` means artifacts never expire
    pub fn new(
        registry: Arc<JobRegistry>,
        schemas: Arc<SchemaStore>,
        artifacts: FileArtifactSink,
        max_file_age: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            schemas,
            artifacts,
            max_file_age,
        }
    }

    /// Check rights, then queue the report. Never waits on the backend.
    /// `context` is the application tag the backend query will carry.
    pub fn submit(
        &self,
        spec: ReportSpec,
        datasource: &str,
        owner: &str,
        is_admin: bool,
        context: &str,
    ) -> Result<JobId, SubmitError> {
        let catalog = self.schemas.snapshot();
        let problems = check_rights(&spec, &catalog, datasource, is_admin);
        if !problems.is_empty() {
            tracing::debug!(
                owner,
                datasource,
                problems = %format_problems(&problems),
                "Report rejected"
            );
            return Err(SubmitError::Rejected(problems));
        }

        let id = self
            .registry
            .enqueue(Job::new(owner, is_admin, datasource, spec).with_context(context));
        tracing::debug!(job_id = %id, owner, datasource, context, "Report queued");
        Ok(id)
    }

    /// State of a job as seen by `username`. Ids the registry no longer
    /// knows are resolved from the caller's artifacts on disk.
    pub fn status_for(&self, id: &str, username: &str) -> Result<StatusReport, LookupError> {
        match self.registry.lookup(id) {
            Some(result) if result.owner != username => Err(LookupError::Forbidden),
            Some(result) => Ok(self.report_for(result)),
            None => Ok(self.report_from_disk(id, username)),
        }
    }

    /// Path of a finished artifact owned by `username`
    pub fn artifact(
        &self,
        id: &str,
        username: &str,
        kind: ArtifactKind,
    ) -> Result<PathBuf, LookupError> {
        let report = self.status_for(id, username)?;
        match report.status {
            ReportStatus::Complete => {}
            ReportStatus::Expired => return Err(LookupError::Gone),
            ReportStatus::Unknown => return Err(LookupError::NotFound),
            ReportStatus::Waiting | ReportStatus::Processing | ReportStatus::Error => {
                return Err(LookupError::NotReady);
            }
        }
        let path = report
            .artifacts
            .map(|a| a.get(kind).to_path_buf())
            .ok_or(LookupError::NotFound)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(LookupError::NotFound)
        }
    }

    /// Datasources with their visible dimensions and metrics, sorted
    pub fn schema_listing(&self, is_admin: bool) -> BTreeMap<String, DatasourceListing> {
        let catalog = self.schemas.snapshot();
        catalog
            .datasources
            .iter()
            .map(|(name, ds)| {
                let dimensions = ds
                    .dimensions
                    .iter()
                    .filter(|(_, f)| is_admin || !f.reserved)
                    .map(|(n, _)| n.clone())
                    .collect();
                let metrics = ds
                    .metrics
                    .iter()
                    .filter(|(_, f)| is_admin || !f.reserved)
                    .map(|(n, f)| MetricListing {
                        name: n.clone(),
                        display_type: f.display_type.clone(),
                    })
                    .collect();
                (
                    name.clone(),
                    DatasourceListing {
                        dimensions,
                        metrics,
                    },
                )
            })
            .collect()
    }

    fn report_for(&self, result: JobResult) -> StatusReport {
        if result.state == JobState::FinishedOk {
            if let Some(artifacts) = &result.artifacts {
                if self.is_expired(&artifacts.csv) {
                    return StatusReport::bare(ReportStatus::Expired);
                }
            }
        }
        StatusReport {
            status: result.state.into(),
            error: result.error,
            artifacts: result.artifacts,
        }
    }

    fn report_from_disk(&self, id: &str, username: &str) -> StatusReport {
        let paths = self.artifacts.paths_for(username, id);
        if !paths.csv.is_file() {
            return StatusReport::bare(ReportStatus::Unknown);
        }
        if self.is_expired(&paths.csv) {
            return StatusReport::bare(ReportStatus::Expired);
        }
        StatusReport {
            status: ReportStatus::Complete,
            error: None,
            artifacts: Some(paths),
        }
    }

    /// Expired when the artifact is older than the configured maximum age.
    /// A missing or unreadable file is not treated as expired.
    fn is_expired(&self, path: &Path) -> bool {
        let Some(max_age) = self.max_file_age else {
            return false;
        };
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > max_age)
    }
}

//! Execution pipeline and worker pool
//!
//! ```text
//! claim (FIFO) -> compile -> backend -> materialize -> artifacts -> terminal result
//! ```
//!
//! Workers poll the registry; an empty queue is re-checked every
//! `poll_interval`. A claimed job always runs to a terminal state, even
//! when shutdown is requested meanwhile.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::job::{Job, JobResult};
use super::materialize::materialize;
use super::registry::JobRegistry;
use crate::data::artifacts::{ArtifactError, ArtifactPaths, ArtifactSink};
use crate::data::druid::{BackendError, BackendTransport};
use crate::domain::query::{CompileError, QueryCompiler};
use crate::domain::schema::SchemaStore;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("unknown datasource: {0}")]
    UnknownDatasource(String),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("artifact writer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ExecutionError {
    /// Short message stored on the job; full details only go to the log
    pub fn user_message(&self) -> String {
        match self {
            ExecutionError::UnknownDatasource(_) | ExecutionError::Compile(_) => self.to_string(),
            ExecutionError::Backend(BackendError::Status { status, .. }) => {
                format!("backend query failed with status {}", status)
            }
            ExecutionError::Backend(_) => "backend query failed".to_string(),
            ExecutionError::Artifact(_) | ExecutionError::Join(_) => {
                "could not write report files".to_string()
            }
        }
    }
}

/// Runs one job end to end
pub struct JobExecutor {
    schemas: Arc<SchemaStore>,
    compiler: QueryCompiler,
    transport: Arc<dyn BackendTransport>,
    sink: Arc<dyn ArtifactSink>,
}

impl JobExecutor {
    pub fn new(
        schemas: Arc<SchemaStore>,
        compiler: QueryCompiler,
        transport: Arc<dyn BackendTransport>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            schemas,
            compiler,
            transport,
            sink,
        }
    }

    pub async fn execute(&self, job: &Job) -> Result<(ArtifactPaths, usize), ExecutionError> {
        // One snapshot for the whole job, even if a reload lands meanwhile
        let catalog = self.schemas.snapshot();
        let schema = catalog
            .get_datasource(&job.datasource)
            .ok_or_else(|| ExecutionError::UnknownDatasource(job.datasource.clone()))?;

        let query = self
            .compiler
            .compile(
                &job.datasource,
                schema,
                &job.spec,
                &job.owner,
                job.is_admin,
                &job.context,
            )
            .await?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let document = serde_json::to_string(&query).unwrap_or_default();
            tracing::debug!(job_id = %job.id, query = %document, "Compiled backend query");
        }

        let rows = self.transport.execute(&query).await?;
        let table = materialize(&job.spec, &rows);
        let row_count = table.rows.len();

        let sink = Arc::clone(&self.sink);
        let id = job.id.clone();
        let owner = job.owner.clone();
        let paths =
            tokio::task::spawn_blocking(move || sink.write_table(&id, &owner, &table)).await??;

        Ok((paths, row_count))
    }

    /// Execute and record exactly one terminal result
    pub async fn run(&self, registry: &JobRegistry, job: &Job) {
        let started = Instant::now();
        tracing::info!(
            job_id = %job.id,
            owner = %job.owner,
            datasource = %job.datasource,
            "Report START"
        );

        match self.execute(job).await {
            Ok((paths, rows)) => {
                tracing::info!(
                    job_id = %job.id,
                    rows,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Report COMPLETE"
                );
                registry.complete(&job.id, JobResult::finished_ok(&job.owner, paths, rows));
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Report FAIL");
                registry.complete(
                    &job.id,
                    JobResult::finished_error(&job.owner, e.user_message()),
                );
            }
        }
    }
}

/// Fixed-size pool of polling workers sharing one registry
pub struct WorkerPool {
    registry: Arc<JobRegistry>,
    executor: Arc<JobExecutor>,
    workers: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        registry: Arc<JobRegistry>,
        executor: Arc<JobExecutor>,
        workers: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            executor,
            workers,
            poll_interval,
        }
    }

    pub fn start(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        tracing::debug!(
            workers = self.workers,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting report workers"
        );
        (0..self.workers)
            .map(|worker| {
                let registry = Arc::clone(&self.registry);
                let executor = Arc::clone(&self.executor);
                let poll_interval = self.poll_interval;
                let rx = shutdown_rx.clone();
                tokio::spawn(worker_loop(worker, registry, executor, poll_interval, rx))
            })
            .collect()
    }
}

async fn worker_loop(
    worker: usize,
    registry: Arc<JobRegistry>,
    executor: Arc<JobExecutor>,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match registry.claim_next() {
            Some(job) => executor.run(&registry, &job).await,
            None => {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }
    tracing::debug!(worker, "Report worker stopped");
}

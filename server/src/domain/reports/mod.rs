//! Report jobs: intake, queueing, execution and materialization, plus
//! dimension value lookups for filter pickers

mod job;
mod materialize;
mod registry;
mod service;
mod spec;
mod values;
mod worker;

pub use job::{Job, JobId, JobResult, JobState, new_job_id};
pub use materialize::{ResultTable, TypedCell, column_order, materialize};
pub use registry::JobRegistry;
pub use service::{
    DatasourceListing, LookupError, MetricListing, ReportService, ReportStatus, StatusReport,
    SubmitError,
};
pub use spec::{
    Comparison, DATE_FORMAT, DateRange, FilterSpec, Granularity, RawReportSpec, ReportSpec,
    SpecError,
};
pub use values::{DimensionValuesService, ValuesError, ValuesRequest};
pub use worker::{ExecutionError, JobExecutor, WorkerPool};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state the control plane reports for a job run. `Active` is the
/// sentinel the window filter always treats as in scope.
#[derive(
    Debug, Clone, Copy, Default, Display, EnumString, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[strum(ascii_case_insensitive)]
pub enum RunStatus {
    /// Currently executing on an engine.
    Active,

    /// Spinning up on an engine but not yet processing records.
    Activating,

    /// Winding down after a stop request.
    Deactivating,

    /// Stopped without error.
    Inactive,

    /// Stopped because something went wrong; details land in the run's
    /// error message.
    InactiveError,

    /// Ran to completion.
    Finished,

    /// Status string this client does not recognize.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Execution state the control plane attaches to a job. Only the engine
/// placement matters here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStatus {
    /// Engines the job is currently placed on; the first entry is the one
    /// that serves pipeline metrics.
    #[serde(default)]
    pub sdc_ids: Vec<String>,
}

/// A job as served by the control plane. Read-only input; this tool never
/// mutates jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub name: String,

    /// Creation time in epoch milli.
    pub created_on: i64,

    /// Last modification time in epoch milli.
    pub last_modified_on: i64,

    /// Name of the pipeline the job executes.
    pub pipeline_name: String,

    /// Commit label of the pipeline version the job is pinned to.
    #[serde(default)]
    pub pipeline_commit_label: String,

    /// Templates are blueprints for spawning jobs, not runnable jobs
    /// themselves; the scan skips them.
    #[serde(default)]
    pub job_template: bool,

    /// Free-text labels attached by the job author.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Present while the control plane tracks an execution for this job.
    #[serde(default)]
    pub current_job_status: Option<CurrentStatus>,
}

/// One entry of a job's run history. The control plane serves histories
/// most-recent-first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    /// Monotonically increasing counter, unique within the job.
    pub run_count: u64,

    /// Start time in epoch milli.
    pub start_time: i64,

    /// Finish time in epoch milli; absent while the run is still going.
    #[serde(default)]
    pub finish_time: Option<i64>,

    #[serde(default)]
    pub status: RunStatus,

    /// Severity color the control plane paints the run with (GRAY, GREEN,
    /// RED).
    #[serde(default)]
    pub color: String,

    #[serde(default)]
    pub error_message: Option<String>,

    /// Engine-local identifier of the pipeline instance this run executed.
    /// Needed to query the engine's own REST API about the run.
    #[serde(default)]
    pub engine_pipeline_id: String,
}

/// Record counters for a single run, matched to history entries by
/// `run_count`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub run_count: u64,
    pub input_count: i64,
    pub output_count: i64,
    pub error_count: i64,
}

/// One execution engine registered with the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Engine {
    pub id: String,

    /// Base URL the engine's REST API is reachable at.
    pub engine_url: String,
}

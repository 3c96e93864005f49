//! Pipeline, run, and request types exchanged with the pipeline service.
//!
//! Field names serialize in camelCase to match the service's JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::DependencyGraph;
use crate::levels::{compute_levels, Levels};
use crate::stage::{string_key, PersistedStage, StageDraft, StageId, StageName, StageType};
use crate::{Result, StageGraphError};

string_key!(
    /// The server-issued identifier of a pipeline.
    PipelineId
);

string_key!(
    /// The server-issued identifier of a pipeline run.
    RunId
);

string_key!(
    /// The server-issued identifier of one stage's execution within a run.
    StageRunId
);

/// Lifecycle status shared by pipelines, runs, and stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Waiting to start.
    #[default]
    Pending,
    /// Executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped before finishing.
    Cancelled,
}

impl RunStatus {
    /// Returns true once the status can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    /// Started by a user.
    #[default]
    Manual,
    /// Started by a schedule.
    Scheduled,
    /// Started through the API.
    Api,
    /// Started by a webhook.
    Webhook,
}

/// Target environment of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment.
    #[default]
    Development,
    /// Staging environment.
    Staging,
    /// Production environment.
    Production,
}

/// One stage of a create-pipeline request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCreate {
    /// Stage name, unique within the request.
    pub name: StageName,
    /// Phase category.
    pub stage_type: StageType,
    /// Present iff `stage_type` is custom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    /// Sequence number.
    pub order: usize,
    /// Names of the stages this one depends on.
    #[serde(default)]
    pub dependencies: Vec<StageName>,
}

impl From<&StageDraft> for StageCreate {
    fn from(draft: &StageDraft) -> Self {
        Self {
            name: draft.name.clone(),
            stage_type: draft.stage_type,
            custom_name: draft.custom_name.clone(),
            order: draft.order,
            dependencies: draft.dependencies.iter().cloned().collect(),
        }
    }
}

impl From<&StageCreate> for StageDraft {
    fn from(stage: &StageCreate) -> Self {
        Self {
            name: stage.name.clone(),
            stage_type: stage.stage_type,
            custom_name: stage.custom_name.clone(),
            order: stage.order,
            dependencies: stage.dependencies.iter().cloned().collect(),
        }
    }
}

/// A request to create a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCreate {
    /// Pipeline name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stages in registry order.
    pub stages: Vec<StageCreate>,
}

/// A persisted pipeline with its stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    /// Server-issued identifier.
    pub id: PipelineId,
    /// Pipeline name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Overall status.
    pub status: RunStatus,
    /// When the pipeline was created.
    pub created_at: DateTime<Utc>,
    /// When the pipeline was last updated.
    pub updated_at: DateTime<Utc>,
    /// The id-keyed stage graph, in the order the service returned it.
    #[serde(default)]
    pub stages: DependencyGraph<PersistedStage>,
}

impl Pipeline {
    /// Returns the stage with the given id.
    pub fn stage(&self, id: &str) -> Option<&PersistedStage> {
        self.stages.get(id)
    }

    /// Levels the pipeline's stages for display.
    pub fn levels(&self) -> Levels<StageId> {
        compute_levels(&self.stages)
    }
}

/// Parameters for triggering a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRun {
    /// Where the run executes.
    #[serde(default)]
    pub environment: Environment,
    /// Who started the run.
    pub triggered_by: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Labels attached to the run.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Run-specific configuration.
    pub run_config: Option<serde_json::Value>,
}

/// One stage's execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRun {
    /// Server-issued identifier.
    pub id: StageRunId,
    /// The stage this execution belongs to.
    pub stage_id: StageId,
    /// Execution status.
    pub status: RunStatus,
    /// Attempt number, starting at 1.
    pub attempt_number: u32,
    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Duration in seconds.
    pub execution_time: Option<f64>,
    /// Output produced by the stage.
    pub output_data: Option<serde_json::Value>,
    /// Error message if the stage failed.
    pub error_message: Option<String>,
    /// Captured logs.
    pub logs: Option<String>,
    /// Memory used by the stage.
    #[serde(default)]
    pub memory_usage: Option<f64>,
    /// CPU used by the stage.
    #[serde(default)]
    pub cpu_usage: Option<f64>,
}

impl StageRun {
    /// Creates a pending first attempt for a stage.
    pub fn pending(id: StageRunId, stage_id: StageId) -> Self {
        Self {
            id,
            stage_id,
            status: RunStatus::Pending,
            attempt_number: 1,
            started_at: None,
            completed_at: None,
            execution_time: None,
            output_data: None,
            error_message: None,
            logs: None,
            memory_usage: None,
            cpu_usage: None,
        }
    }

    /// Stops a stage run that has not finished.
    ///
    /// Only a stage run that had started gets a duration.
    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = RunStatus::Cancelled;
        self.completed_at = Some(now);
        if let Some(start) = self.started_at {
            self.execution_time = Some(elapsed_seconds(start, now));
        }
    }

    /// Records the outcome of a running stage and stamps its timing.
    pub(crate) fn finish(&mut self, outcome: StageOutcome, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        self.execution_time = Some(self.started_at.map_or(0.0, |start| elapsed_seconds(start, now)));
        self.memory_usage = outcome.memory_usage;
        self.cpu_usage = outcome.cpu_usage;
        self.output_data = outcome.output_data;
        self.status = match outcome.error_message {
            Some(message) => {
                self.error_message = Some(message);
                RunStatus::Failed
            }
            None => RunStatus::Completed,
        };
    }
}

/// The result of executing one stage, reported to the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutcome {
    /// Set if the stage failed.
    pub error_message: Option<String>,
    /// Output produced by the stage.
    pub output_data: Option<serde_json::Value>,
    /// Memory used by the stage.
    pub memory_usage: Option<f64>,
    /// CPU used by the stage.
    pub cpu_usage: Option<f64>,
}

impl StageOutcome {
    /// A successful execution.
    pub fn completed(output_data: Option<serde_json::Value>) -> Self {
        Self {
            output_data,
            ..Self::default()
        }
    }

    /// A failed execution.
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            error_message: Some(error_message.into()),
            ..Self::default()
        }
    }

    /// Attaches resource usage.
    pub fn with_usage(mut self, memory_usage: f64, cpu_usage: f64) -> Self {
        self.memory_usage = Some(memory_usage);
        self.cpu_usage = Some(cpu_usage);
        self
    }

    /// Returns true if the stage failed.
    pub fn is_failure(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Seconds between two instants, with millisecond precision.
pub(crate) fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

/// An execution instance of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    /// Server-issued identifier.
    pub id: RunId,
    /// The pipeline being run.
    pub pipeline_id: PipelineId,
    /// Overall status.
    pub status: RunStatus,
    /// What started the run.
    pub trigger_type: TriggerType,
    /// Who started the run.
    pub triggered_by: Option<String>,
    /// Where the run executes.
    pub environment: Environment,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Labels attached to the run.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Run-specific configuration.
    pub run_config: Option<serde_json::Value>,
    /// When the run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Duration in seconds.
    pub execution_time: Option<f64>,
    /// Peak memory usage.
    pub max_memory_usage: Option<f64>,
    /// Peak CPU usage.
    pub max_cpu_usage: Option<f64>,
    /// Number of stages that completed.
    pub success_count: u32,
    /// Number of stages that failed.
    pub failed_count: u32,
    /// Error message if the run failed.
    pub error_message: Option<String>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// Per-stage results.
    #[serde(default)]
    pub stage_runs: Vec<StageRun>,
}

impl PipelineRun {
    /// Returns the run of the given stage.
    pub fn stage_run(&self, stage_id: &StageId) -> Option<&StageRun> {
        self.stage_runs.iter().find(|r| &r.stage_id == stage_id)
    }

    pub(crate) fn stage_run_mut(&mut self, stage_id: &StageId) -> Option<&mut StageRun> {
        self.stage_runs.iter_mut().find(|r| &r.stage_id == stage_id)
    }

    /// Moves the run to a terminal status.
    ///
    /// Stamps completion, computes the duration from `started_at` (zero if
    /// the run never started), and takes the peak usage over the stage runs
    /// that reported any.
    pub(crate) fn finish(&mut self, status: RunStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(now);
        self.execution_time = Some(self.started_at.map_or(0.0, |start| elapsed_seconds(start, now)));
        self.max_memory_usage = self
            .stage_runs
            .iter()
            .filter_map(|r| r.memory_usage)
            .reduce(f64::max);
        self.max_cpu_usage = self
            .stage_runs
            .iter()
            .filter_map(|r| r.cpu_usage)
            .reduce(f64::max);
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Items across all pages.
    pub total: usize,
    /// This page's number, starting at 1.
    pub page: usize,
    /// Maximum items per page.
    pub size: usize,
    /// Number of pages.
    pub pages: usize,
    /// True if a later page exists.
    pub has_next: bool,
    /// True if an earlier page exists.
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// Builds a page, deriving the navigation fields.
    pub fn new(items: Vec<T>, total: usize, page: usize, size: usize) -> Self {
        let pages = if size == 0 { 0 } else { total.div_ceil(size) };
        Self {
            items,
            total,
            page,
            size,
            pages,
            has_next: page < pages,
            has_prev: page > 1,
        }
    }

    /// Cuts page `page` of `size` items out of a full listing.
    ///
    /// # Errors
    ///
    /// Returns [`StageGraphError::InvalidPage`] if `page` or `size` is zero.
    pub fn paginate(all: Vec<T>, page: usize, size: usize) -> Result<Self> {
        if page == 0 || size == 0 {
            return Err(StageGraphError::InvalidPage { page, size });
        }
        let total = all.len();
        let items = all.into_iter().skip((page - 1) * size).take(size).collect();
        Ok(Self::new(items, total, page, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_navigation_fields() {
        let page = Page::new(vec![1, 2], 5, 2, 2);
        assert_eq!(page.pages, 3);
        assert!(page.has_next);
        assert!(page.has_prev);

        let last = Page::new(vec![5], 5, 3, 2);
        assert!(!last.has_next);
    }

    #[test]
    fn test_paginate() {
        let page = Page::paginate((1..=7).collect(), 2, 3).unwrap();
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 7);
        assert_eq!(page.pages, 3);

        let beyond = Page::paginate((1..=7).collect::<Vec<i32>>(), 9, 3).unwrap();
        assert!(beyond.items.is_empty());
        assert!(!beyond.has_next);
    }

    #[test]
    fn test_paginate_rejects_zero() {
        assert!(matches!(
            Page::<i32>::paginate(vec![], 0, 10),
            Err(StageGraphError::InvalidPage { page: 0, size: 10 })
        ));
        assert!(Page::<i32>::paginate(vec![], 1, 0).is_err());
    }

    #[test]
    fn test_empty_listing_has_no_pages() {
        let page = Page::<i32>::paginate(vec![], 1, 10).unwrap();
        assert_eq!(page.pages, 0);
        assert!(!page.has_next);
        assert!(!page.has_prev);
    }

    #[test]
    fn test_page_serializes_camel_case() {
        let value = serde_json::to_value(Page::new(vec!["a"], 1, 1, 10)).unwrap();
        assert_eq!(value["hasNext"], false);
        assert_eq!(value["hasPrev"], false);
    }

    fn started_stage_run(seconds_ago: i64) -> StageRun {
        let mut stage_run = StageRun::pending(StageRunId::new("sr-1"), StageId::new("s1"));
        stage_run.status = RunStatus::Running;
        stage_run.started_at = Some(Utc::now() - chrono::Duration::seconds(seconds_ago));
        stage_run
    }

    #[test]
    fn test_stage_run_finish_completed() {
        let mut stage_run = started_stage_run(2);
        let outcome = StageOutcome::completed(Some(serde_json::json!({"rows": 10})))
            .with_usage(256.0, 40.0);
        stage_run.finish(outcome, Utc::now());

        assert_eq!(stage_run.status, RunStatus::Completed);
        assert!(stage_run.completed_at.is_some());
        assert!(stage_run.execution_time.unwrap() >= 2.0);
        assert_eq!(stage_run.memory_usage, Some(256.0));
        assert_eq!(stage_run.output_data.unwrap()["rows"], 10);
        assert_eq!(stage_run.error_message, None);
    }

    #[test]
    fn test_stage_run_finish_failed() {
        let mut stage_run = started_stage_run(0);
        stage_run.finish(StageOutcome::failed("out of memory"), Utc::now());

        assert_eq!(stage_run.status, RunStatus::Failed);
        assert_eq!(stage_run.error_message.as_deref(), Some("out of memory"));
        assert_eq!(stage_run.memory_usage, None);
    }

    #[test]
    fn test_stage_run_cancel_times_only_started_runs() {
        let now = Utc::now();
        let mut started = started_stage_run(3);
        started.cancel(now);
        assert_eq!(started.status, RunStatus::Cancelled);
        assert!(started.execution_time.unwrap() >= 3.0);

        let mut pending = StageRun::pending(StageRunId::new("sr-2"), StageId::new("s2"));
        pending.cancel(now);
        assert_eq!(pending.status, RunStatus::Cancelled);
        assert_eq!(pending.completed_at, Some(now));
        assert_eq!(pending.execution_time, None);
    }

    #[test]
    fn test_elapsed_seconds() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(1500);
        assert_eq!(elapsed_seconds(start, end), 1.5);
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_trigger_defaults() {
        let trigger: TriggerRun = serde_json::from_str("{}").unwrap();
        assert_eq!(trigger.environment, Environment::Development);
        assert_eq!(
            serde_json::to_value(Environment::Production).unwrap(),
            "production"
        );
    }

    #[test]
    fn test_stage_create_from_draft() {
        let draft = StageDraft {
            name: StageName::new("train"),
            stage_type: StageType::ModelTraining,
            custom_name: None,
            order: 3,
            dependencies: vec![StageName::new("split")].into(),
        };
        let create = StageCreate::from(&draft);
        assert_eq!(create.order, 3);
        assert_eq!(create.dependencies, vec!["split"]);

        let value = serde_json::to_value(&create).unwrap();
        assert_eq!(value["stageType"], "MODEL_TRAINING");
    }
}

//! In-memory pipeline service.
//!
//! This module provides [`MemoryPipelineService`], a thread-safe in-memory
//! implementation of [`PipelineService`] suitable for testing and development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use super::PipelineService;
use crate::event::PipelineEvent;
use crate::pipeline::{
    Page, Pipeline, PipelineCreate, PipelineId, PipelineRun, RunId, RunStatus, StageOutcome,
    StageRun, StageRunId, TriggerRun, TriggerType,
};
use crate::stage::{PersistedStage, StageDraft, StageId, StageName, StageStatus};
use crate::{validate, DependencyGraph, Result, StageGraphError, StageRegistry, ValidationError};

/// Default capacity for the event broadcast channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Internal storage for the memory service.
#[derive(Debug, Default)]
struct Storage {
    /// Pipelines in creation order.
    pipelines: Vec<Pipeline>,
    /// Runs per pipeline, in trigger order.
    runs: HashMap<PipelineId, Vec<PipelineRun>>,
}

impl Storage {
    fn pipeline(&self, id: &PipelineId) -> Result<&Pipeline> {
        self.pipelines
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| StageGraphError::PipelineNotFound(id.to_string()))
    }

    fn run(&self, pipeline_id: &PipelineId, run_id: &RunId) -> Result<&PipelineRun> {
        self.pipeline(pipeline_id)?;
        self.runs
            .get(pipeline_id)
            .and_then(|runs| runs.iter().find(|r| &r.id == run_id))
            .ok_or_else(|| StageGraphError::RunNotFound(run_id.to_string()))
    }

    fn run_mut(&mut self, pipeline_id: &PipelineId, run_id: &RunId) -> Result<&mut PipelineRun> {
        self.pipeline(pipeline_id)?;
        self.runs
            .get_mut(pipeline_id)
            .and_then(|runs| runs.iter_mut().find(|r| &r.id == run_id))
            .ok_or_else(|| StageGraphError::RunNotFound(run_id.to_string()))
    }

    /// Borrows a pipeline and one of its runs at the same time.
    fn pipeline_and_run_mut(
        &mut self,
        pipeline_id: &PipelineId,
        run_id: &RunId,
    ) -> Result<(&Pipeline, &mut PipelineRun)> {
        let Storage { pipelines, runs } = self;
        let pipeline = pipelines
            .iter()
            .find(|p| &p.id == pipeline_id)
            .ok_or_else(|| StageGraphError::PipelineNotFound(pipeline_id.to_string()))?;
        let run = runs
            .get_mut(pipeline_id)
            .and_then(|runs| runs.iter_mut().find(|r| &r.id == run_id))
            .ok_or_else(|| StageGraphError::RunNotFound(run_id.to_string()))?;
        Ok((pipeline, run))
    }
}

fn require_run_status(run: &PipelineRun, expected: RunStatus) -> Result<()> {
    if run.status == expected {
        Ok(())
    } else {
        Err(StageGraphError::InvalidTransition(format!(
            "run {} is {:?}, expected {:?}",
            run.id, run.status, expected
        )))
    }
}

/// An in-memory implementation of [`PipelineService`].
///
/// This implementation uses `Arc<RwLock<...>>` internally, making it safe to
/// clone and share across async tasks. Clones share storage and the event
/// channel.
///
/// Created pipelines are validated the same way [`submit`](super::submit)
/// validates a registry, so requests built by hand cannot slip a cycle in.
///
/// Runs never progress on their own. A caller moves them forward, either one
/// step at a time with [`start_run`](Self::start_run),
/// [`start_stage`](Self::start_stage) and [`finish_stage`](Self::finish_stage),
/// or all at once with [`execute_run`](Self::execute_run).
#[derive(Debug, Clone)]
pub struct MemoryPipelineService {
    storage: Arc<RwLock<Storage>>,
    event_tx: broadcast::Sender<PipelineEvent>,
}

impl MemoryPipelineService {
    /// Creates a new, empty service.
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Creates a new, empty service whose event channel buffers `capacity`
    /// events per subscriber.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            storage: Arc::new(RwLock::new(Storage::default())),
            event_tx,
        }
    }

    /// Subscribes to service events.
    ///
    /// Only events sent after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    /// Returns the number of stored pipelines.
    pub async fn pipeline_count(&self) -> usize {
        self.storage.read().await.pipelines.len()
    }

    /// Returns the number of runs across all pipelines.
    pub async fn run_count(&self) -> usize {
        self.storage.read().await.runs.values().map(Vec::len).sum()
    }

    /// Clears all stored data.
    ///
    /// Useful for resetting state between tests.
    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.pipelines.clear();
        storage.runs.clear();
    }

    /// Ignores send errors (no subscribers).
    fn emit(&self, event: PipelineEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Default for MemoryPipelineService {
    fn default() -> Self {
        Self::new()
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Checks a create request and converts it into a persisted pipeline.
fn persist(request: PipelineCreate) -> Result<Pipeline> {
    if request.name.trim().is_empty() {
        return Err(ValidationError::MissingPipelineName.into());
    }
    let registry = StageRegistry::from_drafts(request.stages.iter().map(StageDraft::from).collect());
    validate::validate(&registry)?;

    let now = Utc::now();
    let ids: HashMap<&StageName, StageId> = request
        .stages
        .iter()
        .map(|stage| (&stage.name, StageId::new(new_id())))
        .collect();

    let mut stages = DependencyGraph::new();
    for stage in &request.stages {
        let Some(id) = ids.get(&stage.name).cloned() else {
            continue;
        };
        // Validation guarantees every dependency resolves
        let dependencies = stage
            .dependencies
            .iter()
            .filter_map(|name| ids.get(name).cloned())
            .collect();
        stages.push(PersistedStage {
            id,
            name: stage.name.clone(),
            stage_type: stage.stage_type,
            custom_name: stage.custom_name.clone(),
            status: StageStatus::Pending,
            order: stage.order,
            config: None,
            dependencies,
            started_at: None,
            completed_at: None,
            execution_time: None,
            output_path: None,
            metrics: None,
            created_at: now,
            updated_at: now,
        });
    }

    Ok(Pipeline {
        id: PipelineId::new(new_id()),
        name: request.name.trim().to_string(),
        description: request.description,
        status: RunStatus::Pending,
        created_at: now,
        updated_at: now,
        stages,
    })
}

#[async_trait]
impl PipelineService for MemoryPipelineService {
    async fn create_pipeline(&self, request: PipelineCreate) -> Result<Pipeline> {
        let pipeline = persist(request)?;
        self.storage.write().await.pipelines.push(pipeline.clone());

        info!(id = %pipeline.id, name = %pipeline.name, stages = pipeline.stages.len(), "pipeline created");
        self.emit(PipelineEvent::PipelineCreated {
            pipeline_id: pipeline.id.clone(),
            name: pipeline.name.clone(),
            stage_count: pipeline.stages.len(),
        });
        Ok(pipeline)
    }

    async fn get_pipeline(&self, id: &PipelineId) -> Result<Pipeline> {
        self.storage.read().await.pipeline(id).cloned()
    }

    async fn list_pipelines(&self, page: usize, size: usize) -> Result<Page<Pipeline>> {
        let storage = self.storage.read().await;
        let newest_first = storage.pipelines.iter().rev().cloned().collect();
        Page::paginate(newest_first, page, size)
    }

    async fn delete_pipeline(&self, id: &PipelineId) -> Result<()> {
        let mut storage = self.storage.write().await;
        let index = storage
            .pipelines
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| StageGraphError::PipelineNotFound(id.to_string()))?;
        storage.pipelines.remove(index);
        let runs = storage.runs.remove(id).map_or(0, |runs| runs.len());
        drop(storage);

        info!(id = %id, runs, "pipeline deleted");
        self.emit(PipelineEvent::PipelineDeleted {
            pipeline_id: id.clone(),
        });
        Ok(())
    }

    async fn trigger_run(
        &self,
        pipeline_id: &PipelineId,
        trigger: TriggerRun,
    ) -> Result<PipelineRun> {
        let mut storage = self.storage.write().await;
        let pipeline = storage.pipeline(pipeline_id)?;

        let stage_runs = pipeline
            .stages
            .iter()
            .map(|stage| StageRun::pending(StageRunId::new(new_id()), stage.id.clone()))
            .collect();

        let run = PipelineRun {
            id: RunId::new(new_id()),
            pipeline_id: pipeline_id.clone(),
            status: RunStatus::Pending,
            trigger_type: TriggerType::Manual,
            triggered_by: trigger.triggered_by,
            environment: trigger.environment,
            notes: trigger.notes,
            tags: trigger.tags,
            run_config: trigger.run_config,
            started_at: None,
            completed_at: None,
            execution_time: None,
            max_memory_usage: None,
            max_cpu_usage: None,
            success_count: 0,
            failed_count: 0,
            error_message: None,
            created_at: Utc::now(),
            stage_runs,
        };

        storage
            .runs
            .entry(pipeline_id.clone())
            .or_default()
            .push(run.clone());
        drop(storage);

        info!(pipeline = %pipeline_id, run = %run.id, "run triggered");
        self.emit(PipelineEvent::RunTriggered {
            pipeline_id: pipeline_id.clone(),
            run_id: run.id.clone(),
        });
        Ok(run)
    }

    async fn list_runs(
        &self,
        pipeline_id: &PipelineId,
        page: usize,
        size: usize,
    ) -> Result<Page<PipelineRun>> {
        let storage = self.storage.read().await;
        storage.pipeline(pipeline_id)?;
        let newest_first = storage
            .runs
            .get(pipeline_id)
            .map(|runs| runs.iter().rev().cloned().collect())
            .unwrap_or_default();
        Page::paginate(newest_first, page, size)
    }

    async fn get_run(&self, pipeline_id: &PipelineId, run_id: &RunId) -> Result<PipelineRun> {
        self.storage.read().await.run(pipeline_id, run_id).cloned()
    }

    async fn cancel_run(&self, pipeline_id: &PipelineId, run_id: &RunId) -> Result<PipelineRun> {
        let mut storage = self.storage.write().await;
        let run = storage.run_mut(pipeline_id, run_id)?;

        if run.status.is_terminal() {
            debug!(run = %run_id, status = ?run.status, "run already finished, not cancelling");
            return Ok(run.clone());
        }

        let now = Utc::now();
        for stage_run in &mut run.stage_runs {
            if matches!(stage_run.status, RunStatus::Pending | RunStatus::Running) {
                stage_run.cancel(now);
            }
        }
        run.finish(RunStatus::Cancelled, now);
        let run = run.clone();
        drop(storage);

        info!(pipeline = %pipeline_id, run = %run_id, "run cancelled");
        self.emit(PipelineEvent::RunCancelled {
            pipeline_id: pipeline_id.clone(),
            run_id: run_id.clone(),
        });
        Ok(run)
    }
}

/// Run lifecycle.
///
/// A run moves `Pending -> Running` and then to `Completed` once every stage
/// run completes, or to `Failed` at the first failed stage. Stages run once
/// all their dependencies have completed.
impl MemoryPipelineService {
    /// Starts a pending run.
    ///
    /// # Errors
    ///
    /// Returns [`StageGraphError::InvalidTransition`] unless the run is
    /// pending.
    pub async fn start_run(&self, pipeline_id: &PipelineId, run_id: &RunId) -> Result<PipelineRun> {
        let mut storage = self.storage.write().await;
        let run = storage.run_mut(pipeline_id, run_id)?;
        require_run_status(run, RunStatus::Pending)?;

        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        let run = run.clone();
        drop(storage);

        info!(pipeline = %pipeline_id, run = %run_id, "run started");
        self.emit(PipelineEvent::RunStarted {
            pipeline_id: pipeline_id.clone(),
            run_id: run_id.clone(),
        });
        Ok(run)
    }

    /// Starts one stage of a running run.
    ///
    /// # Errors
    ///
    /// Returns [`StageGraphError::StageNotFound`] if the pipeline has no such
    /// stage, and [`StageGraphError::InvalidTransition`] if the run is not
    /// running, the stage run is not pending, or a dependency has not
    /// completed.
    pub async fn start_stage(
        &self,
        pipeline_id: &PipelineId,
        run_id: &RunId,
        stage_id: &StageId,
    ) -> Result<PipelineRun> {
        let mut storage = self.storage.write().await;
        let (pipeline, run) = storage.pipeline_and_run_mut(pipeline_id, run_id)?;
        require_run_status(run, RunStatus::Running)?;

        let stage = pipeline
            .stage(stage_id.as_str())
            .ok_or_else(|| StageGraphError::StageNotFound(stage_id.to_string()))?;
        let waiting = stage.dependencies.iter().find(|dependency| {
            run.stage_run(dependency).map(|r| r.status) != Some(RunStatus::Completed)
        });
        if let Some(dependency) = waiting {
            return Err(StageGraphError::InvalidTransition(format!(
                "stage {} is waiting on {}",
                stage.name, dependency
            )));
        }

        let stage_run = run
            .stage_run_mut(stage_id)
            .ok_or_else(|| StageGraphError::StageNotFound(stage_id.to_string()))?;
        if stage_run.status != RunStatus::Pending {
            return Err(StageGraphError::InvalidTransition(format!(
                "stage {} is {:?}, expected {:?}",
                stage.name,
                stage_run.status,
                RunStatus::Pending
            )));
        }
        stage_run.status = RunStatus::Running;
        stage_run.started_at = Some(Utc::now());
        let run = run.clone();
        drop(storage);

        debug!(run = %run_id, stage = %stage_id, "stage started");
        self.emit(PipelineEvent::StageStarted {
            pipeline_id: pipeline_id.clone(),
            run_id: run_id.clone(),
            stage_id: stage_id.clone(),
        });
        Ok(run)
    }

    /// Records the outcome of a running stage.
    ///
    /// A success bumps `success_count` and completes the run once every stage
    /// has completed. A failure bumps `failed_count` and fails the run at
    /// once, naming the stage in the run's error message. Stage runs still
    /// running are cancelled and pending ones are left pending. Finishing the
    /// run stamps its duration and peak resource usage.
    ///
    /// # Errors
    ///
    /// Returns [`StageGraphError::InvalidTransition`] unless both the run and
    /// the stage run are running.
    pub async fn finish_stage(
        &self,
        pipeline_id: &PipelineId,
        run_id: &RunId,
        stage_id: &StageId,
        outcome: StageOutcome,
    ) -> Result<PipelineRun> {
        let mut storage = self.storage.write().await;
        let (pipeline, run) = storage.pipeline_and_run_mut(pipeline_id, run_id)?;
        require_run_status(run, RunStatus::Running)?;

        let name = pipeline
            .stage(stage_id.as_str())
            .map(|stage| stage.name.clone())
            .ok_or_else(|| StageGraphError::StageNotFound(stage_id.to_string()))?;
        let stage_run = run
            .stage_run_mut(stage_id)
            .ok_or_else(|| StageGraphError::StageNotFound(stage_id.to_string()))?;
        if stage_run.status != RunStatus::Running {
            return Err(StageGraphError::InvalidTransition(format!(
                "stage {} is {:?}, expected {:?}",
                name,
                stage_run.status,
                RunStatus::Running
            )));
        }

        let now = Utc::now();
        stage_run.finish(outcome, now);
        let stage_status = stage_run.status;

        if stage_status == RunStatus::Failed {
            run.failed_count += 1;
            run.error_message = Some(format!("Pipeline failed at stage: {name}"));
            for other in &mut run.stage_runs {
                if other.status == RunStatus::Running {
                    other.cancel(now);
                }
            }
            run.finish(RunStatus::Failed, now);
        } else {
            run.success_count += 1;
            if run
                .stage_runs
                .iter()
                .all(|r| r.status == RunStatus::Completed)
            {
                run.finish(RunStatus::Completed, now);
            }
        }
        let run = run.clone();
        drop(storage);

        debug!(run = %run_id, stage = %name, status = ?stage_status, "stage finished");
        self.emit(PipelineEvent::StageFinished {
            pipeline_id: pipeline_id.clone(),
            run_id: run_id.clone(),
            stage_id: stage_id.clone(),
            status: stage_status,
        });
        if run.status.is_terminal() {
            info!(pipeline = %pipeline_id, run = %run_id, status = ?run.status, "run finished");
            self.emit(PipelineEvent::RunFinished {
                pipeline_id: pipeline_id.clone(),
                run_id: run_id.clone(),
                status: run.status,
            });
        }
        Ok(run)
    }

    /// Starts a pending run and plays every stage through `execute`.
    ///
    /// Stages go one at a time in level order, so each one starts after its
    /// dependencies. Execution stops at the first failure. If the run is
    /// cancelled part way, the cancelled run is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StageGraphError::InvalidTransition`] if the run is not
    /// pending, and any lookup error from the service.
    pub async fn execute_run<F>(
        &self,
        pipeline_id: &PipelineId,
        run_id: &RunId,
        mut execute: F,
    ) -> Result<PipelineRun>
    where
        F: FnMut(&PersistedStage) -> StageOutcome + Send,
    {
        let span = info_span!("execute_run", pipeline = %pipeline_id, run = %run_id);
        async move {
            let pipeline = self.get_pipeline(pipeline_id).await?;
            let mut run = self.start_run(pipeline_id, run_id).await?;
            let levels = pipeline.levels();

            for stage_id in levels.groups().iter().flatten() {
                if run.status != RunStatus::Running {
                    break;
                }
                let Some(stage) = pipeline.stage(stage_id.as_str()) else {
                    continue;
                };
                if let Err(error) = self.start_stage(pipeline_id, run_id, stage_id).await {
                    return self.settled_or(pipeline_id, run_id, error).await;
                }
                let outcome = execute(stage);
                run = match self.finish_stage(pipeline_id, run_id, stage_id, outcome).await {
                    Ok(run) => run,
                    Err(error) => return self.settled_or(pipeline_id, run_id, error).await,
                };
            }
            Ok(run)
        }
        .instrument(span)
        .await
    }

    /// Returns the run if something else finished it, otherwise `error`.
    async fn settled_or(
        &self,
        pipeline_id: &PipelineId,
        run_id: &RunId,
        error: StageGraphError,
    ) -> Result<PipelineRun> {
        let run = self.get_run(pipeline_id, run_id).await?;
        if run.status.is_terminal() {
            debug!(run = %run_id, status = ?run.status, "run finished elsewhere");
            Ok(run)
        } else {
            Err(error)
        }
    }
}

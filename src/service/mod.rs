//! The pipeline service seam.
//!
//! This module provides the [`PipelineService`] trait, the boundary to the
//! backend that persists pipelines and executes runs, along with:
//!
//! - [`MemoryPipelineService`]: an in-memory implementation for tests and
//!   local development
//! - [`submit`]: validate a [`StageRegistry`] and create its pipeline
//!
//! # Example
//!
//! ```
//! use stagegraph::{submit, MemoryPipelineService, StageCandidate, StageRegistry, StageType};
//!
//! # async fn example() -> stagegraph::Result<()> {
//! let service = MemoryPipelineService::new();
//!
//! let mut registry = StageRegistry::new();
//! registry.add_stage(StageCandidate::new("ingest", StageType::DataIngestion))?;
//! registry.add_stage(StageCandidate::new("train", StageType::ModelTraining).depends_on("ingest"))?;
//!
//! let pipeline = submit(&registry, "churn", None, &service).await?;
//! assert_eq!(pipeline.levels().depth(), 2);
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryPipelineService;

use async_trait::async_trait;
use tracing::{info, info_span, Instrument};

use crate::pipeline::{Page, Pipeline, PipelineCreate, PipelineId, PipelineRun, RunId, TriggerRun};
use crate::{Result, StageRegistry};

/// The backend that persists pipelines and runs them.
///
/// Implementations resolve each stage's dependency names to the identifiers
/// they issue, so the returned [`Pipeline`] is keyed by id throughout.
/// Listings are newest first.
///
/// # Object Safety
///
/// This trait is object-safe, so a `Box<dyn PipelineService>` can stand in
/// for an HTTP client, a test double, or [`MemoryPipelineService`].
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Persists a new pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StageGraphError::Validation`](crate::StageGraphError::Validation)
    /// if the request is not a valid stage graph.
    async fn create_pipeline(&self, request: PipelineCreate) -> Result<Pipeline>;

    /// Fetches a pipeline with its stages.
    ///
    /// # Errors
    ///
    /// Returns [`StageGraphError::PipelineNotFound`](crate::StageGraphError::PipelineNotFound)
    /// if no such pipeline exists.
    async fn get_pipeline(&self, id: &PipelineId) -> Result<Pipeline>;

    /// Lists pipelines, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns [`StageGraphError::InvalidPage`](crate::StageGraphError::InvalidPage)
    /// for page or size zero.
    async fn list_pipelines(&self, page: usize, size: usize) -> Result<Page<Pipeline>>;

    /// Deletes a pipeline together with all of its runs.
    ///
    /// # Errors
    ///
    /// Returns [`StageGraphError::PipelineNotFound`](crate::StageGraphError::PipelineNotFound)
    /// if no such pipeline exists.
    async fn delete_pipeline(&self, id: &PipelineId) -> Result<()>;

    /// Starts a run of a pipeline.
    ///
    /// The run starts pending, with one pending stage run per stage.
    async fn trigger_run(&self, pipeline_id: &PipelineId, trigger: TriggerRun)
        -> Result<PipelineRun>;

    /// Lists a pipeline's runs, one page at a time.
    async fn list_runs(
        &self,
        pipeline_id: &PipelineId,
        page: usize,
        size: usize,
    ) -> Result<Page<PipelineRun>>;

    /// Fetches one run with its stage runs.
    ///
    /// # Errors
    ///
    /// Returns [`StageGraphError::RunNotFound`](crate::StageGraphError::RunNotFound)
    /// if the pipeline has no such run.
    async fn get_run(&self, pipeline_id: &PipelineId, run_id: &RunId) -> Result<PipelineRun>;

    /// Cancels a run that has not finished.
    ///
    /// Pending and running stage runs become cancelled. The run's duration
    /// runs from its start to now (zero if it never started), and every
    /// stage run that had started gets its duration too. A run that already
    /// reached a terminal status is returned unchanged.
    async fn cancel_run(&self, pipeline_id: &PipelineId, run_id: &RunId) -> Result<PipelineRun>;
}

/// Validates the registry and creates its pipeline.
///
/// The registry itself is not consumed or changed, so a rejected submission
/// leaves the session editable.
///
/// # Errors
///
/// Returns [`StageGraphError::Validation`](crate::StageGraphError::Validation)
/// before contacting the service if the registry is invalid, or whatever the
/// service returns.
pub async fn submit<S>(
    registry: &StageRegistry,
    name: &str,
    description: Option<&str>,
    service: &S,
) -> Result<Pipeline>
where
    S: PipelineService + ?Sized,
{
    let span = info_span!("submit", pipeline = name, stages = registry.len());
    async move {
        let request = registry.to_create_request(name, description)?;
        let pipeline = service.create_pipeline(request).await?;
        info!(id = %pipeline.id, "pipeline submitted");
        Ok(pipeline)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StageCandidate, StageGraphError, StageType, ValidationError};

    #[tokio::test]
    async fn test_submit_rejects_invalid_registry_without_calling_service() {
        let service = MemoryPipelineService::new();
        let mut registry = StageRegistry::new();
        registry
            .add_stage(StageCandidate::new("a", StageType::DataIngestion).depends_on("b"))
            .unwrap();
        registry
            .add_stage(StageCandidate::new("b", StageType::DataIngestion).depends_on("a"))
            .unwrap();

        let result = submit(&registry, "loop", None, &service).await;
        assert!(matches!(
            result,
            Err(StageGraphError::Validation(ValidationError::CyclicDependency(_)))
        ));
        assert_eq!(service.pipeline_count().await, 0);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_through_trait_object() {
        let service: Box<dyn PipelineService> = Box::new(MemoryPipelineService::new());
        let mut registry = StageRegistry::new();
        registry
            .add_stage(StageCandidate::new("ingest", StageType::DataIngestion))
            .unwrap();

        let pipeline = submit(&registry, "solo", Some("one stage"), service.as_ref())
            .await
            .unwrap();
        assert_eq!(pipeline.description.as_deref(), Some("one stage"));
        assert_eq!(pipeline.stages.len(), 1);
    }
}

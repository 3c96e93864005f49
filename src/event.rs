//! Pipeline service events.
//!
//! [`MemoryPipelineService`](crate::MemoryPipelineService) broadcasts a
//! [`PipelineEvent`] after every write, so a presentation layer can refresh
//! its listings without polling.

use crate::pipeline::{PipelineId, RunId, RunStatus};
use crate::stage::StageId;

/// An event emitted by the pipeline service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PipelineEvent {
    /// A pipeline was created.
    PipelineCreated {
        /// The new pipeline's identifier.
        pipeline_id: PipelineId,
        /// The pipeline name.
        name: String,
        /// Number of stages persisted.
        stage_count: usize,
    },

    /// A pipeline and its runs were deleted.
    PipelineDeleted {
        /// The deleted pipeline's identifier.
        pipeline_id: PipelineId,
    },

    /// A run was triggered.
    RunTriggered {
        /// The pipeline being run.
        pipeline_id: PipelineId,
        /// The new run's identifier.
        run_id: RunId,
    },

    /// A pending run started executing.
    RunStarted {
        /// The pipeline the run belongs to.
        pipeline_id: PipelineId,
        /// The started run.
        run_id: RunId,
    },

    /// A stage started executing within a run.
    StageStarted {
        /// The pipeline the run belongs to.
        pipeline_id: PipelineId,
        /// The run executing the stage.
        run_id: RunId,
        /// The started stage.
        stage_id: StageId,
    },

    /// A stage finished executing within a run.
    StageFinished {
        /// The pipeline the run belongs to.
        pipeline_id: PipelineId,
        /// The run executing the stage.
        run_id: RunId,
        /// The finished stage.
        stage_id: StageId,
        /// Completed or failed.
        status: RunStatus,
    },

    /// A run completed or failed.
    RunFinished {
        /// The pipeline the run belongs to.
        pipeline_id: PipelineId,
        /// The finished run.
        run_id: RunId,
        /// Completed or failed.
        status: RunStatus,
    },

    /// A run was cancelled.
    RunCancelled {
        /// The pipeline the run belongs to.
        pipeline_id: PipelineId,
        /// The cancelled run.
        run_id: RunId,
    },
}

impl PipelineEvent {
    /// Returns the pipeline this event concerns.
    pub fn pipeline_id(&self) -> &PipelineId {
        match self {
            Self::PipelineCreated { pipeline_id, .. }
            | Self::PipelineDeleted { pipeline_id }
            | Self::RunTriggered { pipeline_id, .. }
            | Self::RunStarted { pipeline_id, .. }
            | Self::StageStarted { pipeline_id, .. }
            | Self::StageFinished { pipeline_id, .. }
            | Self::RunFinished { pipeline_id, .. }
            | Self::RunCancelled { pipeline_id, .. } => pipeline_id,
        }
    }

    /// Returns the run this event concerns, if any.
    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            Self::RunTriggered { run_id, .. }
            | Self::RunStarted { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::StageFinished { run_id, .. }
            | Self::RunFinished { run_id, .. }
            | Self::RunCancelled { run_id, .. } => Some(run_id),
            Self::PipelineCreated { .. } | Self::PipelineDeleted { .. } => None,
        }
    }

    /// Returns the stage this event concerns, if any.
    pub fn stage_id(&self) -> Option<&StageId> {
        match self {
            Self::StageStarted { stage_id, .. } | Self::StageFinished { stage_id, .. } => {
                Some(stage_id)
            }
            _ => None,
        }
    }

    /// Returns true if the event changes a run's state.
    pub fn is_run_event(&self) -> bool {
        self.run_id().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_pipeline_id() {
        let event = PipelineEvent::PipelineCreated {
            pipeline_id: PipelineId::new("p-1"),
            name: "churn".to_string(),
            stage_count: 3,
        };
        assert_eq!(event.pipeline_id().as_str(), "p-1");
        assert_eq!(event.run_id(), None);
        assert!(!event.is_run_event());
    }

    #[test]
    fn test_event_run_id() {
        let event = PipelineEvent::RunCancelled {
            pipeline_id: PipelineId::new("p-1"),
            run_id: RunId::new("r-9"),
        };
        assert_eq!(event.run_id().map(RunId::as_str), Some("r-9"));
        assert!(event.is_run_event());
    }

    #[test]
    fn test_event_stage_id() {
        let event = PipelineEvent::StageFinished {
            pipeline_id: PipelineId::new("p-1"),
            run_id: RunId::new("r-9"),
            stage_id: StageId::new("s-2"),
            status: RunStatus::Failed,
        };
        assert_eq!(event.stage_id().map(StageId::as_str), Some("s-2"));
        assert!(event.is_run_event());

        let deleted = PipelineEvent::PipelineDeleted {
            pipeline_id: PipelineId::new("p-1"),
        };
        assert_eq!(deleted.stage_id(), None);
        assert!(!deleted.is_run_event());
    }
}

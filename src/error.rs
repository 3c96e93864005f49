//! Error types for stagegraph.
//!
//! Two layers of errors live here. [`ValidationError`] describes why a stage
//! registry cannot be submitted; it is returned as a value so callers can show
//! every violation to the user. [`StageGraphError`] is the crate-wide error,
//! covering rejected mutations and failures at the pipeline service seam.

use thiserror::Error;

use crate::stage::StageName;

/// A reason a stage registry is not submittable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// A stage name is empty or used by more than one stage.
    #[error("Duplicate stage name: {0}")]
    DuplicateStageName(StageName),

    /// A custom stage has no custom name.
    #[error("Custom stage {0} must have a custom name")]
    MissingCustomName(StageName),

    /// A dependency names a stage that is not in the registry.
    #[error("Stage {stage} depends on unknown stage {dependency}")]
    UnknownDependency {
        /// The stage declaring the dependency.
        stage: StageName,
        /// The dependency that did not resolve.
        dependency: StageName,
    },

    /// The registry holds no stages.
    #[error("Pipeline must contain at least one stage")]
    EmptyPipeline,

    /// The dependency relation contains a cycle through this stage.
    #[error("Cyclic dependency involving stage {0}")]
    CyclicDependency(StageName),

    /// The pipeline itself has no name.
    #[error("Pipeline name must not be empty")]
    MissingPipelineName,
}

/// The main error type for stagegraph operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StageGraphError {
    /// A stage candidate had an empty name.
    #[error("Stage name must not be empty")]
    EmptyStageName,

    /// A stage candidate had no stage type.
    #[error("Stage type must be selected")]
    EmptyStageType,

    /// A custom stage candidate had an empty custom name.
    #[error("Custom stage {0} must have a custom name")]
    MissingCustomName(String),

    /// A stage type string did not match any known type.
    #[error("Unknown stage type: {0}")]
    UnknownStageType(String),

    /// The registry failed submit-time validation.
    #[error("Invalid pipeline: {0}")]
    Validation(#[from] ValidationError),

    /// No pipeline with this id exists in the service.
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    /// No run with this id exists for the pipeline.
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// No stage with this id exists in the pipeline or run.
    #[error("Stage not found: {0}")]
    StageNotFound(String),

    /// A run or stage run is not in a status that allows the requested step.
    #[error("Invalid run transition: {0}")]
    InvalidTransition(String),

    /// Page number or page size was zero.
    #[error("Invalid page request: page {page}, size {size}")]
    InvalidPage {
        /// Requested page (1-based).
        page: usize,
        /// Requested page size.
        size: usize,
    },

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized `Result` type for stagegraph operations.
pub type Result<T> = std::result::Result<T, StageGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_duplicate() {
        let error = ValidationError::DuplicateStageName(StageName::new("train"));
        assert_eq!(error.to_string(), "Duplicate stage name: train");
    }

    #[test]
    fn test_validation_display_unknown_dependency() {
        let error = ValidationError::UnknownDependency {
            stage: StageName::new("train"),
            dependency: StageName::new("ingest"),
        };
        assert_eq!(
            error.to_string(),
            "Stage train depends on unknown stage ingest"
        );
    }

    #[test]
    fn test_validation_display_cycle() {
        let error = ValidationError::CyclicDependency(StageName::new("a"));
        assert_eq!(error.to_string(), "Cyclic dependency involving stage a");
    }

    #[test]
    fn test_error_display_empty_stage_type() {
        assert_eq!(
            StageGraphError::EmptyStageType.to_string(),
            "Stage type must be selected"
        );
    }

    #[test]
    fn test_error_from_validation() {
        let error: StageGraphError = ValidationError::EmptyPipeline.into();
        assert!(matches!(
            error,
            StageGraphError::Validation(ValidationError::EmptyPipeline)
        ));
        assert_eq!(
            error.to_string(),
            "Invalid pipeline: Pipeline must contain at least one stage"
        );
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: StageGraphError = json_error.into();
        assert!(error.to_string().contains("Serialization error"));
    }

    #[test]
    fn test_error_display_not_found() {
        assert_eq!(
            StageGraphError::PipelineNotFound("p-1".to_string()).to_string(),
            "Pipeline not found: p-1"
        );
        assert_eq!(
            StageGraphError::RunNotFound("r-1".to_string()).to_string(),
            "Run not found: r-1"
        );
        assert_eq!(
            StageGraphError::StageNotFound("s-1".to_string()).to_string(),
            "Stage not found: s-1"
        );
    }

    #[test]
    fn test_error_display_invalid_transition() {
        let error = StageGraphError::InvalidTransition("run r-1 is COMPLETED".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid run transition: run r-1 is COMPLETED"
        );
    }

    #[test]
    fn test_error_display_invalid_page() {
        let error = StageGraphError::InvalidPage { page: 0, size: 10 };
        assert_eq!(error.to_string(), "Invalid page request: page 0, size 10");
    }
}

//! The stage registry for a pipeline-creation session.
//!
//! [`StageRegistry`] holds the stages proposed for a pipeline before it is
//! submitted. It owns stage identity (the name) and metadata, and is the only
//! place drafts are created. Mutations that edit the dependency relation live
//! in the [`editor`](crate::editor) module; submit-time checks live in
//! [`validate`](crate::validate).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{DependencyGraph, DependencySet};
use crate::pipeline::{PipelineCreate, StageCreate};
use crate::stage::{StageCandidate, StageDraft, StageName, StageType};
use crate::{validate, Result, StageGraphError, ValidationError};

/// The name-keyed stage graph of a pipeline being assembled.
///
/// # Example
///
/// ```
/// use stagegraph::{StageCandidate, StageRegistry, StageType};
///
/// let mut registry = StageRegistry::new();
/// registry.add_stage(StageCandidate::new("ingest", StageType::DataIngestion))?;
/// registry.add_stage(
///     StageCandidate::new("train", StageType::ModelTraining).depends_on("ingest"),
/// )?;
///
/// assert_eq!(registry.len(), 2);
/// assert_eq!(registry.dependency_candidates("train"), vec!["ingest"]);
/// # Ok::<(), stagegraph::StageGraphError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageRegistry {
    pub(crate) graph: DependencyGraph<StageDraft>,
}

impl StageRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a registry from previously built drafts, unchecked.
    pub fn from_drafts(drafts: Vec<StageDraft>) -> Self {
        Self {
            graph: DependencyGraph::from(drafts),
        }
    }

    /// Adds a stage built from user input.
    ///
    /// The name and custom name are trimmed, the custom name is dropped for
    /// built-in types, duplicate dependency names collapse, and the new
    /// stage's `order` is the number of stages already present. Orders are
    /// not renumbered on removal, so they can repeat; use registry position,
    /// not `order`, to identify a stage.
    ///
    /// # Errors
    ///
    /// The registry is left untouched and one of these is returned:
    ///
    /// - [`StageGraphError::EmptyStageName`] if the name is blank
    /// - [`StageGraphError::EmptyStageType`] if no type was selected
    /// - [`StageGraphError::MissingCustomName`] if the type is custom and
    ///   the custom name is blank
    pub fn add_stage(&mut self, candidate: StageCandidate) -> Result<&StageDraft> {
        let name = candidate.name.trim();
        if name.is_empty() {
            return Err(StageGraphError::EmptyStageName);
        }

        let stage_type = candidate.stage_type.ok_or(StageGraphError::EmptyStageType)?;

        let custom_name = match stage_type {
            StageType::Custom => {
                let custom = candidate
                    .custom_name
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or_default();
                if custom.is_empty() {
                    return Err(StageGraphError::MissingCustomName(name.to_string()));
                }
                Some(custom.to_string())
            }
            _ => None,
        };

        let dependencies: DependencySet<StageName> = candidate
            .dependencies
            .into_iter()
            .map(StageName::from)
            .collect();

        let draft = StageDraft {
            name: StageName::new(name),
            stage_type,
            custom_name,
            order: self.graph.len(),
            dependencies,
        };

        debug!(stage = %draft.name, order = draft.order, "stage added");
        Ok(self.graph.push(draft))
    }

    /// Returns every stage except the named one, in registry order.
    pub fn list_other_stages<'a>(&'a self, name: &'a str) -> Vec<&'a StageDraft> {
        self.graph.others(name).collect()
    }

    /// Returns the names a stage may be toggled to depend on.
    ///
    /// Never contains `name` itself.
    pub fn dependency_candidates<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        self.graph
            .others(name)
            .map(|stage| stage.name.as_str())
            .collect()
    }

    /// Returns the stage with the given name.
    pub fn get(&self, name: &str) -> Option<&StageDraft> {
        self.graph.get(name)
    }

    /// Returns true if a stage with the given name exists.
    pub fn has_stage(&self, name: &str) -> bool {
        self.graph.contains(name)
    }

    /// Returns the stages in registry order.
    pub fn stages(&self) -> &[StageDraft] {
        self.graph.nodes()
    }

    /// Returns the underlying name-keyed graph.
    pub fn graph(&self) -> &DependencyGraph<StageDraft> {
        &self.graph
    }

    /// Returns the number of stages.
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Returns true if the registry holds no stages.
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Discards every stage, as when the creation session is cancelled.
    pub fn clear(&mut self) {
        self.graph.clear();
    }

    /// Validates the registry and converts it into a create request.
    ///
    /// A blank description becomes `None`; the pipeline name is trimmed.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`], or
    /// [`ValidationError::MissingPipelineName`] if `name` is blank.
    pub fn to_create_request(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> std::result::Result<PipelineCreate, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingPipelineName);
        }
        validate::validate(self)?;

        Ok(PipelineCreate {
            name: name.to_string(),
            description: description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            stages: self.stages().iter().map(StageCreate::from).collect(),
        })
    }
}

//! # Stagegraph
//!
//! An editable dependency graph of pipeline stages, backed by a
//! [petgraph](https://docs.rs/petgraph) cycle check.
//!
//! A pipeline is authored one stage at a time. Each stage names the stages it
//! depends on, and the collection is edited freely until it is submitted.
//! Stagegraph covers the whole authoring loop:
//!
//! - [`StageRegistry`] collects stage drafts and offers the stages a new
//!   dependency may point at
//! - [`StageRegistry::remove_stage`] and [`StageRegistry::toggle_dependency`]
//!   keep the dependency relation consistent while editing
//! - [`validate()`] rejects duplicate names, dangling dependencies, missing
//!   custom names, empty pipelines, and cycles before submission
//! - [`compute_levels`] ranks stages by longest dependency path, so every
//!   stage sits strictly after its dependencies; [`Layout`] turns the ranks
//!   into drawing coordinates
//! - [`PipelineService`] is the seam to the backend that persists pipelines
//!   and runs them; [`MemoryPipelineService`] implements it in memory and
//!   steps runs through their lifecycle level by level
//!
//! ## Quick Example
//!
//! ```
//! use stagegraph::{compute_levels, validate, StageCandidate, StageRegistry, StageType};
//!
//! let mut registry = StageRegistry::new();
//! registry.add_stage(StageCandidate::new("ingest", StageType::DataIngestion))?;
//! registry.add_stage(StageCandidate::new("clean", StageType::DataPreprocessing).depends_on("ingest"))?;
//! registry.add_stage(StageCandidate::new("train", StageType::ModelTraining).depends_on("clean"))?;
//!
//! validate(&registry)?;
//!
//! let levels = compute_levels(registry.graph());
//! assert_eq!(levels.level_of("train"), Some(2));
//!
//! // Removing a stage also drops every reference to it
//! registry.remove_stage("clean");
//! assert!(registry.get("train").unwrap().dependencies.is_empty());
//! # Ok::<(), stagegraph::StageGraphError>(())
//! ```
//!
//! ## Validation and leveling
//!
//! The validator is strict and the leveler is forgiving. [`validate()`] is the
//! gate in front of the service; [`compute_levels`] renders whatever graph it
//! is given, including cyclic or dangling ones returned by older backends, and
//! never fails.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![forbid(unsafe_code)]

pub mod editor;
pub mod error;
pub mod event;
pub mod graph;
pub mod layout;
pub mod levels;
pub mod pipeline;
pub mod registry;
pub mod service;
pub mod stage;
pub mod status;
pub mod validate;

pub use error::{Result, StageGraphError, ValidationError};
pub use event::PipelineEvent;
pub use graph::{DependencyGraph, DependencyNode, DependencySet};
pub use layout::{Edge, Layout, LayoutConfig, NodePosition};
pub use levels::{compute_levels, Levels};
pub use pipeline::{
    Environment, Page, Pipeline, PipelineCreate, PipelineId, PipelineRun, RunId, RunStatus,
    StageCreate, StageOutcome, StageRun, StageRunId, TriggerRun, TriggerType,
};
pub use registry::StageRegistry;
pub use service::{submit, MemoryPipelineService, PipelineService};
pub use stage::{
    PersistedStage, StageCandidate, StageCategory, StageDraft, StageId, StageName, StageStatus,
    StageType,
};
pub use status::{RunReport, StageReport};
pub use validate::{validate, violations};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

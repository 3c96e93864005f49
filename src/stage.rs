//! Stage types for stagegraph.
//!
//! A stage exists in two phases. Before submission it is a [`StageDraft`],
//! keyed by its human-chosen [`StageName`]. After the pipeline service has
//! persisted it, it is a [`PersistedStage`], keyed by a server-issued
//! [`StageId`]. Both implement [`DependencyNode`] so the same graph code
//! serves either phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::graph::{DependencyNode, DependencySet};
use crate::StageGraphError;

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a string as a key.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_key!(
    /// The working identifier of a stage before it is persisted.
    StageName
);

string_key!(
    /// The server-issued identifier of a persisted stage.
    StageId
);

pub(crate) use string_key;

/// The pipeline-phase category of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageType {
    /// Pull raw data into the pipeline.
    DataIngestion,
    /// Check data against expectations.
    DataValidation,
    /// Clean and normalize data.
    DataPreprocessing,
    /// Derive model features.
    FeatureEngineering,
    /// Split data into train/validation/test sets.
    DataSplitting,
    /// Fit a model.
    ModelTraining,
    /// Validate a trained model.
    ModelValidation,
    /// Score a model against metrics.
    ModelEvaluation,
    /// Run model tests.
    ModelTesting,
    /// Register a model artifact.
    ModelRegistration,
    /// Deploy a model.
    ModelDeployment,
    /// Monitor a deployed model.
    ModelMonitoring,
    /// Exploratory data analysis.
    ExploratoryDataAnalysis,
    /// Search hyperparameters.
    HyperparameterTuning,
    /// Compare candidate models.
    ModelComparison,
    /// Prepare the execution environment.
    EnvironmentSetup,
    /// Allocate compute or storage.
    ResourceProvisioning,
    /// Release resources after a run.
    Cleanup,
    /// A user-defined stage; requires a custom name.
    Custom,
}

/// Coarse grouping of [`StageType`]s, used to organize type pickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageCategory {
    /// Data pipeline stages.
    Data,
    /// Model pipeline stages.
    Model,
    /// Deployment pipeline stages.
    Deployment,
    /// Analysis stages.
    Analysis,
    /// Infrastructure stages.
    Infrastructure,
    /// User-defined stages.
    Custom,
}

impl StageType {
    /// Every stage type, in picker order.
    pub const ALL: [StageType; 19] = [
        StageType::DataIngestion,
        StageType::DataValidation,
        StageType::DataPreprocessing,
        StageType::FeatureEngineering,
        StageType::DataSplitting,
        StageType::ModelTraining,
        StageType::ModelValidation,
        StageType::ModelEvaluation,
        StageType::ModelTesting,
        StageType::ModelRegistration,
        StageType::ModelDeployment,
        StageType::ModelMonitoring,
        StageType::ExploratoryDataAnalysis,
        StageType::HyperparameterTuning,
        StageType::ModelComparison,
        StageType::EnvironmentSetup,
        StageType::ResourceProvisioning,
        StageType::Cleanup,
        StageType::Custom,
    ];

    /// Returns the wire form, e.g. `MODEL_TRAINING`.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::DataIngestion => "DATA_INGESTION",
            StageType::DataValidation => "DATA_VALIDATION",
            StageType::DataPreprocessing => "DATA_PREPROCESSING",
            StageType::FeatureEngineering => "FEATURE_ENGINEERING",
            StageType::DataSplitting => "DATA_SPLITTING",
            StageType::ModelTraining => "MODEL_TRAINING",
            StageType::ModelValidation => "MODEL_VALIDATION",
            StageType::ModelEvaluation => "MODEL_EVALUATION",
            StageType::ModelTesting => "MODEL_TESTING",
            StageType::ModelRegistration => "MODEL_REGISTRATION",
            StageType::ModelDeployment => "MODEL_DEPLOYMENT",
            StageType::ModelMonitoring => "MODEL_MONITORING",
            StageType::ExploratoryDataAnalysis => "EXPLORATORY_DATA_ANALYSIS",
            StageType::HyperparameterTuning => "HYPERPARAMETER_TUNING",
            StageType::ModelComparison => "MODEL_COMPARISON",
            StageType::EnvironmentSetup => "ENVIRONMENT_SETUP",
            StageType::ResourceProvisioning => "RESOURCE_PROVISIONING",
            StageType::Cleanup => "CLEANUP",
            StageType::Custom => "CUSTOM",
        }
    }

    /// Returns a human-readable label, e.g. `Model Training`.
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns true for the sentinel custom type.
    pub fn is_custom(&self) -> bool {
        matches!(self, StageType::Custom)
    }

    /// Returns the category this type is listed under.
    pub fn category(&self) -> StageCategory {
        match self {
            StageType::DataIngestion
            | StageType::DataValidation
            | StageType::DataPreprocessing
            | StageType::FeatureEngineering
            | StageType::DataSplitting => StageCategory::Data,
            StageType::ModelTraining
            | StageType::ModelValidation
            | StageType::ModelEvaluation
            | StageType::ModelTesting => StageCategory::Model,
            StageType::ModelRegistration
            | StageType::ModelDeployment
            | StageType::ModelMonitoring => StageCategory::Deployment,
            StageType::ExploratoryDataAnalysis
            | StageType::HyperparameterTuning
            | StageType::ModelComparison => StageCategory::Analysis,
            StageType::EnvironmentSetup
            | StageType::ResourceProvisioning
            | StageType::Cleanup => StageCategory::Infrastructure,
            StageType::Custom => StageCategory::Custom,
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageType {
    type Err = StageGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StageGraphError::EmptyStageType);
        }
        StageType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StageGraphError::UnknownStageType(s.to_string()))
    }
}

/// Execution status of a persisted stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    /// Not yet started.
    #[default]
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Not executed.
    Skipped,
}

/// User input for a new stage, as collected by a creation form.
///
/// Nothing is checked until the candidate is handed to
/// [`StageRegistry::add_stage`](crate::StageRegistry::add_stage).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageCandidate {
    /// Proposed stage name.
    pub name: String,
    /// Selected stage type, if any.
    pub stage_type: Option<StageType>,
    /// Custom label; only meaningful for [`StageType::Custom`].
    pub custom_name: Option<String>,
    /// Names of the stages this one depends on.
    pub dependencies: Vec<String>,
}

impl StageCandidate {
    /// Creates a candidate of a built-in type.
    pub fn new(name: impl Into<String>, stage_type: StageType) -> Self {
        Self {
            name: name.into(),
            stage_type: Some(stage_type),
            ..Self::default()
        }
    }

    /// Creates a custom-typed candidate.
    pub fn custom(name: impl Into<String>, custom_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage_type: Some(StageType::Custom),
            custom_name: Some(custom_name.into()),
            dependencies: Vec::new(),
        }
    }

    /// Adds a dependency on the stage with the given name.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }
}

/// A stage in the registry, before the pipeline is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDraft {
    /// Unique working identifier.
    pub name: StageName,
    /// Phase category.
    pub stage_type: StageType,
    /// Present iff `stage_type` is custom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    /// Stage count at insertion time. Not unique once stages are removed.
    pub order: usize,
    /// Names of the stages this one depends on.
    #[serde(default)]
    pub dependencies: DependencySet<StageName>,
}

impl StageDraft {
    /// Returns the label to show for this stage's type.
    pub fn type_label(&self) -> String {
        match (&self.stage_type, &self.custom_name) {
            (StageType::Custom, Some(custom)) => custom.clone(),
            (stage_type, _) => stage_type.label(),
        }
    }
}

impl DependencyNode for StageDraft {
    type Key = StageName;

    fn key(&self) -> &StageName {
        &self.name
    }

    fn dependencies(&self) -> &DependencySet<StageName> {
        &self.dependencies
    }

    fn dependencies_mut(&mut self) -> &mut DependencySet<StageName> {
        &mut self.dependencies
    }
}

/// A stage as returned by the pipeline service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedStage {
    /// Server-issued identifier.
    pub id: StageId,
    /// The name the stage was created under.
    pub name: StageName,
    /// Phase category.
    pub stage_type: StageType,
    /// Present iff `stage_type` is custom.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
    /// Execution status.
    #[serde(default)]
    pub status: StageStatus,
    /// Sequence number within the pipeline.
    pub order: usize,
    /// Free-form stage configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// Identifiers of the stages this one depends on.
    #[serde(default)]
    pub dependencies: DependencySet<StageId>,
    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Execution duration in seconds.
    pub execution_time: Option<f64>,
    /// Where the stage wrote its output.
    pub output_path: Option<String>,
    /// Metrics reported by the stage.
    pub metrics: Option<serde_json::Value>,
    /// When the stage was persisted.
    pub created_at: DateTime<Utc>,
    /// When the stage was last updated.
    pub updated_at: DateTime<Utc>,
}

impl DependencyNode for PersistedStage {
    type Key = StageId;

    fn key(&self) -> &StageId {
        &self.id
    }

    fn dependencies(&self) -> &DependencySet<StageId> {
        &self.dependencies
    }

    fn dependencies_mut(&mut self) -> &mut DependencySet<StageId> {
        &mut self.dependencies
    }
}

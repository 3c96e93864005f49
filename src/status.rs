//! Run status reporting.
//!
//! This module provides [`RunReport`] for inspecting how far a pipeline run
//! has progressed, stage by stage.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::pipeline::{Pipeline, PipelineId, PipelineRun, RunId, RunStatus};
use crate::stage::StageName;

/// Report line for a single stage within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    /// The stage name.
    pub name: StageName,
    /// The stage's level in the pipeline graph.
    pub level: usize,
    /// Status of the stage's execution.
    pub status: RunStatus,
    /// Attempt number, 0 if the run has no entry for this stage.
    pub attempt: u32,
    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When execution finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message if the stage failed.
    pub error: Option<String>,
}

impl StageReport {
    /// Returns a status indicator character.
    pub fn status_char(&self) -> char {
        match self.status {
            RunStatus::Pending => '⏳',
            RunStatus::Running => '🔄',
            RunStatus::Completed => '✅',
            RunStatus::Failed => '❌',
            RunStatus::Cancelled => '⛔',
        }
    }
}

/// A snapshot of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// The pipeline name.
    pub pipeline: String,
    /// The pipeline's identifier.
    pub pipeline_id: PipelineId,
    /// The run's identifier.
    pub run_id: RunId,
    /// Overall run status.
    pub status: RunStatus,
    /// One line per stage, in pipeline order.
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Builds a report by matching each pipeline stage with its stage run.
    ///
    /// Stages the run has no entry for are reported as pending.
    pub fn from_run(pipeline: &Pipeline, run: &PipelineRun) -> Self {
        let levels = pipeline.levels();
        let stages = pipeline
            .stages
            .iter()
            .map(|stage| {
                let level = levels.level_of(&stage.id).unwrap_or(0);
                match run.stage_run(&stage.id) {
                    Some(stage_run) => StageReport {
                        name: stage.name.clone(),
                        level,
                        status: stage_run.status,
                        attempt: stage_run.attempt_number,
                        started_at: stage_run.started_at,
                        completed_at: stage_run.completed_at,
                        error: stage_run.error_message.clone(),
                    },
                    None => StageReport {
                        name: stage.name.clone(),
                        level,
                        status: RunStatus::Pending,
                        attempt: 0,
                        started_at: None,
                        completed_at: None,
                        error: None,
                    },
                }
            })
            .collect();

        Self {
            pipeline: pipeline.name.clone(),
            pipeline_id: pipeline.id.clone(),
            run_id: run.id.clone(),
            status: run.status,
            stages,
        }
    }

    /// Returns true if all stages completed.
    pub fn is_complete(&self) -> bool {
        self.stages.iter().all(|s| s.status == RunStatus::Completed)
    }

    /// Returns true if any stage failed.
    pub fn has_failures(&self) -> bool {
        self.stages.iter().any(|s| s.status == RunStatus::Failed)
    }

    /// Returns the names of stages that are currently running.
    pub fn running_stages(&self) -> Vec<&str> {
        self.stages_with(RunStatus::Running)
    }

    /// Returns the names of stages that have failed.
    pub fn failed_stages(&self) -> Vec<&str> {
        self.stages_with(RunStatus::Failed)
    }

    fn stages_with(&self, status: RunStatus) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Returns the overall progress as a percentage.
    pub fn progress_percent(&self) -> f32 {
        if self.stages.is_empty() {
            return 100.0;
        }

        let completed = self
            .stages
            .iter()
            .filter(|s| s.status == RunStatus::Completed)
            .count();

        (completed as f32 / self.stages.len() as f32) * 100.0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} of pipeline \"{}\":", self.run_id, self.pipeline)?;
        writeln!(f)?;

        for stage in &self.stages {
            let status_str = format!("{:?}", stage.status);
            let time_str = stage
                .completed_at
                .or(stage.started_at)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());

            write!(
                f,
                "  {} L{:<2} {:<20} {:<10} {}",
                stage.status_char(),
                stage.level,
                stage.name.as_str(),
                status_str,
                time_str
            )?;

            if let Some(ref error) = stage.error {
                write!(f, "  Error: {}", error)?;
            }
            if stage.attempt > 1 {
                write!(f, "  (attempt {})", stage.attempt)?;
            }

            writeln!(f)?;
        }

        writeln!(f)?;
        writeln!(f, "Progress: {:.0}%", self.progress_percent())?;

        match self.status {
            RunStatus::Cancelled => writeln!(f, "Status: Cancelled")?,
            _ if self.is_complete() => writeln!(f, "Status: Complete")?,
            _ if self.has_failures() => writeln!(
                f,
                "Status: Failed ({} stage(s))",
                self.failed_stages().len()
            )?,
            RunStatus::Pending => writeln!(f, "Status: Pending")?,
            _ => writeln!(f, "Status: In progress")?,
        }

        Ok(())
    }
}

//! Authoring and submitting a pipeline.
//!
//! This example demonstrates:
//! - Building a stage registry and editing its dependencies
//! - Validating before submission
//! - Submitting to the in-memory pipeline service
//! - Leveling and laying out the persisted graph
//! - Triggering, cancelling and executing runs, printing their reports
//!
//! Run with: `cargo run --example create_pipeline`
//! Set `RUST_LOG=stagegraph=debug` to see every edit logged.

use stagegraph::{
    compute_levels, submit, violations, Layout, LayoutConfig, MemoryPipelineService,
    PipelineEvent, PipelineService, Result, RunReport, StageCandidate, StageOutcome, StageRegistry,
    StageType, TriggerRun,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stagegraph=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Stagegraph Example ===\n");

    let mut registry = StageRegistry::new();
    registry.add_stage(StageCandidate::new("ingest", StageType::DataIngestion))?;
    registry.add_stage(StageCandidate::new("profile", StageType::ExploratoryDataAnalysis))?;
    registry.add_stage(StageCandidate::new("clean", StageType::DataPreprocessing))?;
    registry.add_stage(StageCandidate::new("split", StageType::DataSplitting).depends_on("clean"))?;
    registry.add_stage(
        StageCandidate::custom("tune", "Bayesian search")
            .depends_on("split")
            .depends_on("profile"),
    )?;
    registry.add_stage(StageCandidate::new("train", StageType::ModelTraining).depends_on("tune"))?;

    // Wire up the edges the form left out
    registry.toggle_dependency("clean", "ingest");
    registry.toggle_dependency("profile", "ingest");

    println!("Stages clean may depend on: {:?}", registry.dependency_candidates("clean"));

    // A mistaken back edge is caught before submission
    registry.toggle_dependency("ingest", "train");
    for violation in violations(&registry) {
        println!("Rejected: {violation}");
    }
    registry.toggle_dependency("ingest", "train");

    println!("\nLevels:");
    for (level, group) in compute_levels(registry.graph()).groups().iter().enumerate() {
        let names: Vec<_> = group.iter().map(|name| name.as_str()).collect();
        println!("  {level}: {}", names.join(", "));
    }

    let service = MemoryPipelineService::new();
    let mut events = service.subscribe();

    let pipeline = submit(&registry, "churn model", Some("weekly retrain"), &service).await?;
    println!("\nSubmitted pipeline {} ({} stages)", pipeline.id, pipeline.stages.len());

    let levels = pipeline.levels();
    let layout = Layout::from_levels(&pipeline.stages, &levels, &LayoutConfig::default());
    for node in &layout.nodes {
        if let Some(stage) = pipeline.stage(node.key.as_str()) {
            println!("  {:<8} at ({:>5.0}, {:>5.0})", stage.name.as_str(), node.x, node.y);
        }
    }
    println!("  {} edges", layout.edges.len());

    let run = service
        .trigger_run(&pipeline.id, TriggerRun::default())
        .await?;
    println!("\n{}", RunReport::from_run(&pipeline, &run));

    let cancelled = service.cancel_run(&pipeline.id, &run.id).await?;
    println!("{}", RunReport::from_run(&pipeline, &cancelled));

    let run = service
        .trigger_run(&pipeline.id, TriggerRun::default())
        .await?;
    let executed = service
        .execute_run(&pipeline.id, &run.id, |stage| {
            StageOutcome::completed(Some(serde_json::json!({
                "result": format!("Stage {} completed successfully", stage.name),
            })))
        })
        .await?;
    println!("{}", RunReport::from_run(&pipeline, &executed));

    println!("Events:");
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::PipelineCreated {
                name, stage_count, ..
            } => println!("  created {name} with {stage_count} stages"),
            PipelineEvent::RunTriggered { run_id, .. } => println!("  triggered {run_id}"),
            PipelineEvent::RunCancelled { run_id, .. } => println!("  cancelled {run_id}"),
            PipelineEvent::RunFinished { run_id, status, .. } => {
                println!("  finished {run_id} as {status:?}")
            }
            _ => {}
        }
    }

    Ok(())
}

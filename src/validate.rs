//! Submit-time validation of a [`StageRegistry`].
//!
//! Validation is strict and pure: it never edits the registry. The checks,
//! in the order violations are reported:
//!
//! 1. the registry is not empty
//! 2. every name is non-empty and unique
//! 3. every custom stage has a custom name
//! 4. every dependency names a stage in the registry
//! 5. the dependency relation has no cycle (self-dependencies included)

use petgraph::algo::toposort;
use std::collections::HashSet;
use tracing::debug;

use crate::{StageName, StageRegistry, ValidationError};

/// Checks that the registry can be submitted.
///
/// # Errors
///
/// Returns the first violation found; see the module docs for the order.
pub fn validate(registry: &StageRegistry) -> Result<(), ValidationError> {
    match violations(registry).into_iter().next() {
        Some(violation) => Err(violation),
        None => Ok(()),
    }
}

/// Collects every violation in the registry.
///
/// An empty vector means the registry is valid. A cycle is reported once,
/// naming one stage on it. A dependency on a repeated name counts as a
/// dependency on every stage with that name, so a cycle through any of them
/// is found.
pub fn violations(registry: &StageRegistry) -> Vec<ValidationError> {
    let mut found = Vec::new();

    if registry.is_empty() {
        found.push(ValidationError::EmptyPipeline);
        return found;
    }

    let mut seen: HashSet<&StageName> = HashSet::with_capacity(registry.len());
    for stage in registry.stages() {
        let first = seen.insert(&stage.name);
        if stage.name.as_str().trim().is_empty() || !first {
            found.push(ValidationError::DuplicateStageName(stage.name.clone()));
        }
    }

    for stage in registry.stages() {
        let has_custom_name = stage
            .custom_name
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        if stage.stage_type.is_custom() && !has_custom_name {
            found.push(ValidationError::MissingCustomName(stage.name.clone()));
        }
    }

    for stage in registry.stages() {
        for dependency in &stage.dependencies {
            if !seen.contains(dependency) {
                found.push(ValidationError::UnknownDependency {
                    stage: stage.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    let digraph = registry.graph().to_digraph();
    if let Err(cycle) = toposort(&digraph, None) {
        found.push(ValidationError::CyclicDependency(
            digraph[cycle.node_id()].clone(),
        ));
    }

    if !found.is_empty() {
        debug!(count = found.len(), "registry failed validation");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencySet;
    use crate::{StageCandidate, StageDraft, StageName, StageType};

    fn draft(name: &str, deps: &[&str]) -> StageDraft {
        StageDraft {
            name: StageName::new(name),
            stage_type: StageType::DataIngestion,
            custom_name: None,
            order: 0,
            dependencies: deps.iter().map(|d| StageName::new(*d)).collect::<DependencySet<_>>(),
        }
    }

    fn registry(drafts: Vec<StageDraft>) -> StageRegistry {
        StageRegistry::from_drafts(drafts)
    }

    #[test]
    fn test_valid_diamond() {
        let registry = registry(vec![
            draft("a", &[]),
            draft("b", &["a"]),
            draft("c", &["a"]),
            draft("d", &["b", "c"]),
        ]);
        assert_eq!(validate(&registry), Ok(()));
        assert!(violations(&registry).is_empty());
    }

    #[test]
    fn test_valid_through_add_stage() {
        let mut registry = StageRegistry::new();
        registry
            .add_stage(StageCandidate::new("ingest", StageType::DataIngestion))
            .unwrap();
        registry
            .add_stage(StageCandidate::custom("audit", "Bias audit").depends_on("ingest"))
            .unwrap();
        assert!(validate(&registry).is_ok());
    }

    #[test]
    fn test_empty_pipeline() {
        assert_eq!(
            validate(&StageRegistry::new()),
            Err(ValidationError::EmptyPipeline)
        );
    }

    #[test]
    fn test_duplicate_stage_name() {
        let registry = registry(vec![draft("a", &[]), draft("a", &[])]);
        assert_eq!(
            validate(&registry),
            Err(ValidationError::DuplicateStageName(StageName::new("a")))
        );
    }

    #[test]
    fn test_empty_stage_name_is_rejected() {
        let registry = registry(vec![draft("", &[])]);
        assert!(matches!(
            validate(&registry),
            Err(ValidationError::DuplicateStageName(_))
        ));
    }

    #[test]
    fn test_missing_custom_name() {
        let mut stage = draft("x", &[]);
        stage.stage_type = StageType::Custom;
        let registry = registry(vec![stage]);
        assert_eq!(
            validate(&registry),
            Err(ValidationError::MissingCustomName(StageName::new("x")))
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let registry = registry(vec![draft("a", &[]), draft("b", &["ghost"])]);
        assert_eq!(
            validate(&registry),
            Err(ValidationError::UnknownDependency {
                stage: StageName::new("b"),
                dependency: StageName::new("ghost"),
            })
        );
    }

    #[test]
    fn test_direct_cycle() {
        // a -> b -> a
        let registry = registry(vec![draft("a", &["b"]), draft("b", &["a"])]);
        assert!(matches!(
            validate(&registry),
            Err(ValidationError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_indirect_cycle() {
        // a -> b -> c -> a
        let registry = registry(vec![
            draft("a", &["c"]),
            draft("b", &["a"]),
            draft("c", &["b"]),
            draft("d", &[]),
        ]);
        match validate(&registry) {
            Err(ValidationError::CyclicDependency(name)) => {
                assert!(["a", "b", "c"].contains(&name.as_str()));
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let registry = registry(vec![draft("a", &["a"])]);
        assert_eq!(
            validate(&registry),
            Err(ValidationError::CyclicDependency(StageName::new("a")))
        );
    }

    #[test]
    fn test_violations_reports_everything_in_order() {
        let mut custom = draft("x", &["ghost"]);
        custom.stage_type = StageType::Custom;
        let registry = registry(vec![
            draft("a", &["b"]),
            draft("b", &["a"]),
            draft("a", &[]),
            custom,
        ]);

        let found = violations(&registry);
        assert_eq!(found.len(), 4);
        assert!(matches!(found[0], ValidationError::DuplicateStageName(_)));
        assert!(matches!(found[1], ValidationError::MissingCustomName(_)));
        assert!(matches!(found[2], ValidationError::UnknownDependency { .. }));
        assert!(matches!(found[3], ValidationError::CyclicDependency(_)));
    }

    #[test]
    fn test_cycle_through_second_stage_with_repeated_name() {
        // The first "a" is acyclic; the second closes a -> b -> a
        let registry = registry(vec![draft("a", &[]), draft("a", &["b"]), draft("b", &["a"])]);

        let found = violations(&registry);
        assert!(found.contains(&ValidationError::DuplicateStageName(StageName::new("a"))));
        assert!(found
            .iter()
            .any(|v| matches!(v, ValidationError::CyclicDependency(_))));
    }

    #[test]
    fn test_long_valid_chain() {
        let drafts = (0..20_000)
            .map(|i| {
                if i == 0 {
                    draft("s0", &[])
                } else {
                    draft(&format!("s{i}"), &[format!("s{}", i - 1).as_str()])
                }
            })
            .collect();
        assert_eq!(validate(&registry(drafts)), Ok(()));
    }

    #[test]
    fn test_validation_does_not_mutate() {
        let registry = registry(vec![draft("a", &["b"]), draft("b", &["a"])]);
        let before = registry.clone();
        let _ = violations(&registry);
        assert_eq!(registry, before);
    }
}

//! Dependency editing operations on a [`StageRegistry`].
//!
//! Each operation is a single `&mut self` call, so a caller can never
//! observe a registry where a stage has been removed but references to it
//! survive.

use tracing::debug;

use crate::stage::StageName;
use crate::StageRegistry;

impl StageRegistry {
    /// Removes the named stage and scrubs it from every other stage's
    /// dependencies.
    ///
    /// Removing a name that is not present is a no-op. Remaining stages keep
    /// their `order` values and are not renumbered, so after a removal a
    /// later [`add_stage`](StageRegistry::add_stage) can hand out an `order`
    /// that an existing stage already has. Returns true if a stage was removed.
    ///
    /// # Example
    ///
    /// ```
    /// use stagegraph::{StageCandidate, StageRegistry, StageType};
    ///
    /// let mut registry = StageRegistry::new();
    /// registry.add_stage(StageCandidate::new("a", StageType::DataIngestion))?;
    /// registry.add_stage(StageCandidate::new("b", StageType::ModelTraining).depends_on("a"))?;
    ///
    /// assert!(registry.remove_stage("a"));
    /// assert!(registry.get("b").unwrap().dependencies.is_empty());
    /// # Ok::<(), stagegraph::StageGraphError>(())
    /// ```
    pub fn remove_stage(&mut self, name: &str) -> bool {
        let removed = self.graph.remove_cascade(name);
        if removed > 0 {
            debug!(stage = name, remaining = self.graph.len(), "stage removed");
        }
        removed > 0
    }

    /// Adds `dependency` to `stage`'s dependencies, or removes it if present.
    ///
    /// Returns `Some(true)` if the dependency was added, `Some(false)` if it
    /// was removed, and `None` if `stage` does not exist (nothing changes).
    ///
    /// Self-dependencies are not checked here; offer only names from
    /// [`dependency_candidates`](StageRegistry::dependency_candidates).
    pub fn toggle_dependency(&mut self, stage: &str, dependency: &str) -> Option<bool> {
        let present = self.graph.toggle(stage, StageName::new(dependency));
        if let Some(present) = present {
            debug!(stage, dependency, present, "dependency toggled");
        }
        present
    }
}

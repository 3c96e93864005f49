//! Longest-path leveling of a dependency graph.
//!
//! Every stage is assigned the level `0` if it has no dependencies and
//! `1 + max(level(dependency))` otherwise. This is the smallest level that
//! keeps every stage strictly to the right of all of its dependencies, so
//! the assignment is unique and deterministic. Levels double as render
//! columns and as an execution order: all stages at level `n` may run once
//! every stage below `n` has finished.
//!
//! Unlike [`validate`](crate::validate()), leveling never fails. It is meant to
//! render whatever the service returns, including legacy or corrupted
//! graphs:
//!
//! - a dependency on a key that is on the current resolution path (a cycle)
//!   contributes level 0 to its dependent;
//! - a dependency on a key that names no stage contributes level 0 and
//!   receives no level of its own.
//!
//! On such input the levels are still finite but carry no particular meaning.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::{debug, warn};

use crate::graph::{DependencyGraph, DependencyNode};

/// The level of every stage in a graph, plus the stages grouped by level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Levels<K: Eq + Hash> {
    level_of: HashMap<K, usize>,
    groups: Vec<Vec<K>>,
}

impl<K: Eq + Hash> Levels<K> {
    /// Returns the level of the given stage.
    pub fn level_of<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.level_of.get(key).copied()
    }

    /// Returns the stages at each level, lowest level first.
    ///
    /// Within a level, stages appear in graph storage order. A level can be
    /// empty only when the graph has dangling or cyclic dependencies.
    pub fn groups(&self) -> &[Vec<K>] {
        &self.groups
    }

    /// Returns the stages at one level.
    pub fn group(&self, level: usize) -> Option<&[K]> {
        self.groups.get(level).map(Vec::as_slice)
    }

    /// Returns the `(level, row)` position of a stage.
    pub fn position<Q>(&self, key: &Q) -> Option<(usize, usize)>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let level = self.level_of(key)?;
        let row = self.groups[level].iter().position(|k| k.borrow() == key)?;
        Some((level, row))
    }

    /// Returns the number of levels.
    pub fn depth(&self) -> usize {
        self.groups.len()
    }

    /// Returns the number of leveled stages.
    pub fn len(&self) -> usize {
        self.level_of.len()
    }

    /// Returns true if no stage was leveled.
    pub fn is_empty(&self) -> bool {
        self.level_of.is_empty()
    }

    /// Iterates `(stage, level)` pairs, level by level.
    pub fn iter(&self) -> impl Iterator<Item = (&K, usize)> + '_ {
        self.groups
            .iter()
            .enumerate()
            .flat_map(|(level, group)| group.iter().map(move |key| (key, level)))
    }
}

/// Computes the level of every stage in the graph.
///
/// # Example
///
/// ```
/// use stagegraph::{compute_levels, StageCandidate, StageRegistry, StageType};
///
/// let mut registry = StageRegistry::new();
/// registry.add_stage(StageCandidate::new("a", StageType::DataIngestion))?;
/// registry.add_stage(StageCandidate::new("b", StageType::DataValidation).depends_on("a"))?;
/// registry.add_stage(StageCandidate::new("c", StageType::FeatureEngineering).depends_on("a"))?;
/// registry.add_stage(
///     StageCandidate::new("d", StageType::ModelTraining).depends_on("b").depends_on("c"),
/// )?;
///
/// let levels = compute_levels(registry.graph());
/// assert_eq!(levels.level_of("d"), Some(2));
/// assert_eq!(levels.group(1).unwrap(), ["b", "c"]);
/// # Ok::<(), stagegraph::StageGraphError>(())
/// ```
pub fn compute_levels<N: DependencyNode>(graph: &DependencyGraph<N>) -> Levels<N::Key> {
    let mut leveler = Leveler::new(graph);
    for node in graph {
        leveler.level(node.key());
    }

    let mut level_of = HashMap::with_capacity(graph.len());
    let mut groups: Vec<Vec<N::Key>> = Vec::new();

    for node in graph {
        let key = node.key();
        if level_of.contains_key(key) {
            continue;
        }
        let level = leveler.memo.get(key).copied().unwrap_or(0);
        if groups.len() <= level {
            groups.resize_with(level + 1, Vec::new);
        }
        groups[level].push(key.clone());
        level_of.insert(key.clone(), level);
    }

    debug!(stages = level_of.len(), depth = groups.len(), "levels computed");
    Levels { level_of, groups }
}

/// Memoized depth-first resolver.
///
/// The walk keeps its own stack of frames, so graph depth is bounded by
/// memory rather than by the thread's call stack.
struct Leveler<'g, N: DependencyNode> {
    /// First node for each key.
    nodes: HashMap<&'g N::Key, &'g N>,
    /// Resolved levels.
    memo: HashMap<&'g N::Key, usize>,
    /// Keys on the active resolution path.
    on_path: HashSet<&'g N::Key>,
}

/// A stage whose dependencies are still being resolved.
struct Frame<'g, K> {
    key: &'g K,
    /// Dependencies not yet visited.
    pending: std::slice::Iter<'g, K>,
    /// Highest level implied by the dependencies visited so far.
    level: usize,
}

impl<'g, N: DependencyNode> Leveler<'g, N> {
    fn new(graph: &'g DependencyGraph<N>) -> Self {
        let mut nodes = HashMap::with_capacity(graph.len());
        for node in graph {
            nodes.entry(node.key()).or_insert(node);
        }
        Self {
            nodes,
            memo: HashMap::with_capacity(graph.len()),
            on_path: HashSet::new(),
        }
    }

    fn level(&mut self, root: &'g N::Key) -> usize {
        if let Some(&level) = self.memo.get(root) {
            return level;
        }
        let Some(node) = self.nodes.get(root).copied() else {
            // Dangling reference
            return 0;
        };

        self.on_path.insert(root);
        let mut stack = vec![Frame {
            key: root,
            pending: node.dependencies().iter(),
            level: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(dependency) = frame.pending.next() else {
                // All dependencies visited; settle this frame into its parent
                let Some(done) = stack.pop() else { break };
                self.on_path.remove(done.key);
                self.memo.insert(done.key, done.level);
                if let Some(parent) = stack.last_mut() {
                    parent.level = parent.level.max(done.level + 1);
                }
                continue;
            };

            if self.on_path.contains(dependency) {
                warn!(stage = ?dependency, "dependency cycle reached while leveling");
                frame.level = frame.level.max(1);
            } else if let Some(&level) = self.memo.get(dependency) {
                frame.level = frame.level.max(level + 1);
            } else if let Some(node) = self.nodes.get(dependency).copied() {
                self.on_path.insert(dependency);
                stack.push(Frame {
                    key: dependency,
                    pending: node.dependencies().iter(),
                    level: 0,
                });
            } else {
                // Dangling reference
                frame.level = frame.level.max(1);
            }
        }

        self.memo.get(root).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{graph, node};

    #[test]
    fn test_empty_graph() {
        let levels = compute_levels(&graph(vec![]));
        assert!(levels.is_empty());
        assert_eq!(levels.depth(), 0);
    }

    #[test]
    fn test_diamond_levels() {
        let g = graph(vec![
            node("A", &[]),
            node("B", &["A"]),
            node("C", &["A"]),
            node("D", &["B", "C"]),
        ]);
        let levels = compute_levels(&g);

        assert_eq!(levels.level_of("A"), Some(0));
        assert_eq!(levels.level_of("B"), Some(1));
        assert_eq!(levels.level_of("C"), Some(1));
        assert_eq!(levels.level_of("D"), Some(2));
        assert_eq!(
            levels.groups(),
            &[vec!["A".to_string()], vec!["B".into(), "C".into()], vec!["D".into()]]
        );
    }

    #[test]
    fn test_longest_path_wins() {
        // a -> b -> c, and a -> c directly: c sits after b, not at level 1
        let g = graph(vec![node("a", &[]), node("b", &["a"]), node("c", &["a", "b"])]);
        let levels = compute_levels(&g);
        assert_eq!(levels.level_of("c"), Some(2));
    }

    #[test]
    fn test_dependents_listed_before_dependencies() {
        let g = graph(vec![node("d", &["b"]), node("b", &["a"]), node("a", &[])]);
        let levels = compute_levels(&g);
        assert_eq!(levels.level_of("d"), Some(2));
        assert_eq!(levels.level_of("b"), Some(1));
        assert_eq!(levels.level_of("a"), Some(0));
    }

    #[test]
    fn test_group_order_follows_storage_order() {
        let g = graph(vec![
            node("root", &[]),
            node("zeta", &["root"]),
            node("alpha", &["root"]),
            node("mid", &["root"]),
        ]);
        let levels = compute_levels(&g);
        assert_eq!(levels.group(1).unwrap(), ["zeta", "alpha", "mid"]);
        assert_eq!(levels.position("alpha"), Some((1, 1)));
    }

    #[test]
    fn test_isolated_stages_get_level_zero() {
        let g = graph(vec![node("a", &[]), node("b", &[]), node("c", &["a"])]);
        let levels = compute_levels(&g);
        assert_eq!(levels.group(0).unwrap(), ["a", "b"]);
        assert_eq!(levels.len(), 3);
    }

    #[test]
    fn test_leveling_is_idempotent() {
        let g = graph(vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["b"]),
            node("d", &["a", "c"]),
        ]);
        assert_eq!(compute_levels(&g), compute_levels(&g));
    }

    #[test]
    fn test_cycle_terminates_and_levels_everything() {
        let g = graph(vec![node("a", &["b"]), node("b", &["a"]), node("c", &["a"])]);
        let levels = compute_levels(&g);

        assert_eq!(levels.len(), 3);
        // Resolution starts at a: b sees a on the path and counts it as 0
        assert_eq!(levels.level_of("b"), Some(1));
        assert_eq!(levels.level_of("a"), Some(2));
        assert_eq!(levels.level_of("c"), Some(3));
    }

    #[test]
    fn test_self_dependency_terminates() {
        let g = graph(vec![node("a", &["a"])]);
        let levels = compute_levels(&g);
        assert_eq!(levels.level_of("a"), Some(1));
        assert_eq!(levels.group(0).unwrap().len(), 0);
    }

    #[test]
    fn test_dangling_dependency_counts_as_level_zero() {
        let g = graph(vec![node("a", &["ghost"]), node("b", &["a"])]);
        let levels = compute_levels(&g);

        assert_eq!(levels.level_of("a"), Some(1));
        assert_eq!(levels.level_of("b"), Some(2));
        assert_eq!(levels.level_of("ghost"), None);
    }

    #[test]
    fn test_iter_walks_levels_in_order() {
        let g = graph(vec![node("b", &["a"]), node("a", &[])]);
        let levels = compute_levels(&g);
        let pairs: Vec<_> = levels.iter().map(|(k, l)| (k.as_str(), l)).collect();
        assert_eq!(pairs, vec![("a", 0), ("b", 1)]);
    }

    #[test]
    fn test_deep_chain() {
        let names: Vec<String> = (0..200).map(|i| format!("s{i}")).collect();
        let nodes = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if i == 0 {
                    node(name, &[])
                } else {
                    node(name, &[names[i - 1].as_str()])
                }
            })
            .collect();
        let levels = compute_levels(&graph(nodes));
        assert_eq!(levels.level_of("s199"), Some(199));
        assert_eq!(levels.depth(), 200);
    }

    #[test]
    fn test_very_deep_chain_stored_deepest_first() {
        const DEPTH: usize = 100_000;
        let nodes = (0..DEPTH)
            .rev()
            .map(|i| {
                let key = format!("s{i}");
                if i == 0 {
                    node(&key, &[])
                } else {
                    node(&key, &[format!("s{}", i - 1).as_str()])
                }
            })
            .collect();
        let levels = compute_levels(&graph(nodes));

        assert_eq!(levels.len(), DEPTH);
        assert_eq!(levels.depth(), DEPTH);
        assert_eq!(levels.level_of("s0"), Some(0));
        assert_eq!(levels.level_of(format!("s{}", DEPTH - 1).as_str()), Some(DEPTH - 1));
    }

    #[test]
    fn test_deep_cycle_terminates() {
        // s0 -> s1 -> ... -> s4999 -> s0
        const LEN: usize = 5_000;
        let nodes = (0..LEN)
            .map(|i| {
                let dep = format!("s{}", (i + 1) % LEN);
                node(&format!("s{i}"), &[dep.as_str()])
            })
            .collect();
        let levels = compute_levels(&graph(nodes));
        assert_eq!(levels.len(), LEN);
        assert_eq!(levels.level_of("s0"), Some(LEN));
    }
}

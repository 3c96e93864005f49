//! Node positions and edges for drawing a leveled stage graph.
//!
//! Levels become columns, left to right. Within a column stages are stacked
//! in group order, and odd columns are shifted down by a stagger so that
//! edges between neighbouring columns do not run perfectly horizontal.

use serde::{Deserialize, Serialize};
use std::hash::Hash;

use crate::graph::{DependencyGraph, DependencyNode};
use crate::levels::Levels;

/// Spacing used when placing stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    /// Horizontal distance between levels.
    pub column_spacing: f64,
    /// Vertical distance between stages of one level.
    pub row_spacing: f64,
    /// Extra vertical offset applied to odd levels.
    pub stagger: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            column_spacing: 250.0,
            row_spacing: 120.0,
            stagger: 60.0,
        }
    }
}

/// A placed stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodePosition<K> {
    /// The stage.
    pub key: K,
    /// Column index.
    pub level: usize,
    /// Index within the column.
    pub row: usize,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

/// A drawn dependency, pointing from the dependency to its dependent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Edge<K> {
    /// The stage depended upon.
    pub source: K,
    /// The stage declaring the dependency.
    pub target: K,
}

/// Positioned nodes and edges ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout<K> {
    /// One entry per leveled stage, level by level.
    pub nodes: Vec<NodePosition<K>>,
    /// One entry per resolvable dependency, in stage order.
    pub edges: Vec<Edge<K>>,
}

impl<K: Clone + Eq + Hash> Layout<K> {
    /// Places every leveled stage and collects the edges between them.
    ///
    /// Dependencies on keys that are not in `graph` produce no edge.
    ///
    /// # Example
    ///
    /// ```
    /// use stagegraph::{compute_levels, Layout, LayoutConfig, StageCandidate, StageRegistry, StageType};
    ///
    /// let mut registry = StageRegistry::new();
    /// registry.add_stage(StageCandidate::new("ingest", StageType::DataIngestion))?;
    /// registry.add_stage(StageCandidate::new("clean", StageType::DataPreprocessing).depends_on("ingest"))?;
    ///
    /// let levels = compute_levels(registry.graph());
    /// let layout = Layout::from_levels(registry.graph(), &levels, &LayoutConfig::default());
    ///
    /// let clean = layout.node("clean").unwrap();
    /// assert_eq!((clean.x, clean.y), (250.0, 60.0));
    /// assert_eq!(layout.edges.len(), 1);
    /// # Ok::<(), stagegraph::StageGraphError>(())
    /// ```
    pub fn from_levels<N>(
        graph: &DependencyGraph<N>,
        levels: &Levels<K>,
        config: &LayoutConfig,
    ) -> Self
    where
        N: DependencyNode<Key = K>,
    {
        let nodes = levels
            .groups()
            .iter()
            .enumerate()
            .flat_map(|(level, group)| {
                group.iter().enumerate().map(move |(row, key)| NodePosition {
                    key: key.clone(),
                    level,
                    row,
                    x: level as f64 * config.column_spacing,
                    y: row as f64 * config.row_spacing + (level % 2) as f64 * config.stagger,
                })
            })
            .collect();

        let edges = graph
            .iter()
            .flat_map(|node| {
                node.dependencies()
                    .iter()
                    .filter(move |dependency| graph.contains(*dependency))
                    .map(move |dependency| Edge {
                        source: dependency.clone(),
                        target: node.key().clone(),
                    })
            })
            .collect();

        Self { nodes, edges }
    }

    /// Returns the position of a stage.
    pub fn node<Q>(&self, key: &Q) -> Option<&NodePosition<K>>
    where
        K: PartialEq<Q>,
        Q: ?Sized,
    {
        self.nodes.iter().find(|node| node.key == *key)
    }

    /// Returns the width and height spanned by the node positions.
    pub fn extent(&self) -> (f64, f64) {
        self.nodes
            .iter()
            .fold((0.0, 0.0), |(w, h), node| (w.max(node.x), h.max(node.y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{graph, node};
    use crate::levels::compute_levels;

    #[test]
    fn test_default_config() {
        let config = LayoutConfig::default();
        assert_eq!(config.column_spacing, 250.0);
        assert_eq!(config.row_spacing, 120.0);
        assert_eq!(config.stagger, 60.0);
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: LayoutConfig = serde_json::from_str(r#"{"stagger": 0.0}"#).unwrap();
        assert_eq!(config.stagger, 0.0);
        assert_eq!(config.column_spacing, 250.0);
    }

    #[test]
    fn test_diamond_positions() {
        let g = graph(vec![
            node("A", &[]),
            node("B", &["A"]),
            node("C", &["A"]),
            node("D", &["B", "C"]),
        ]);
        let layout = Layout::from_levels(&g, &compute_levels(&g), &LayoutConfig::default());

        let at = |key: &str| {
            let n = layout.node(key).unwrap();
            (n.x, n.y)
        };
        assert_eq!(at("A"), (0.0, 0.0));
        assert_eq!(at("B"), (250.0, 60.0));
        assert_eq!(at("C"), (250.0, 180.0));
        assert_eq!(at("D"), (500.0, 0.0));
        assert_eq!(layout.extent(), (500.0, 180.0));
    }

    #[test]
    fn test_edges_point_from_dependency_to_dependent() {
        let g = graph(vec![node("A", &[]), node("B", &["A"]), node("C", &["A", "B"])]);
        let layout = Layout::from_levels(&g, &compute_levels(&g), &LayoutConfig::default());

        let edges: Vec<_> = layout
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert_eq!(edges, vec![("A", "B"), ("A", "C"), ("B", "C")]);
    }

    #[test]
    fn test_dangling_dependency_has_no_edge() {
        let g = graph(vec![node("A", &["ghost"])]);
        let layout = Layout::from_levels(&g, &compute_levels(&g), &LayoutConfig::default());
        assert!(layout.edges.is_empty());
        assert_eq!(layout.nodes.len(), 1);
        assert_eq!(layout.node("A").unwrap().level, 1);
    }

    #[test]
    fn test_custom_spacing() {
        let g = graph(vec![node("A", &[]), node("B", &[]), node("C", &["A"])]);
        let config = LayoutConfig {
            column_spacing: 10.0,
            row_spacing: 5.0,
            stagger: 0.0,
        };
        let layout = Layout::from_levels(&g, &compute_levels(&g), &config);
        let b = layout.node("B").unwrap();
        assert_eq!((b.level, b.row, b.x, b.y), (0, 1, 0.0, 5.0));
        let c = layout.node("C").unwrap();
        assert_eq!((c.x, c.y), (10.0, 0.0));
    }
}

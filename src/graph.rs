//! Generic dependency graph storage.
//!
//! This module provides [`DependencyGraph`], an ordered arena of nodes that
//! each carry a key and a [`DependencySet`] of other nodes' keys. The same
//! type backs the name-keyed registry used before submission and the
//! id-keyed graph of a persisted pipeline.
//!
//! Storage order is significant: it is the order stages were added (or
//! returned by the service), and every query that yields several nodes
//! yields them in that order.

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// A node that can live in a [`DependencyGraph`].
pub trait DependencyNode {
    /// The key other nodes use to refer to this one.
    type Key: Clone + Eq + Hash + Debug;

    /// Returns this node's key.
    fn key(&self) -> &Self::Key;

    /// Returns the keys of the nodes this one depends on.
    fn dependencies(&self) -> &DependencySet<Self::Key>;

    /// Returns the dependency set for in-place edits.
    fn dependencies_mut(&mut self) -> &mut DependencySet<Self::Key>;
}

/// An insertion-ordered set of dependency keys.
///
/// Equality ignores order: two sets are equal when they hold the same keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<K>", into = "Vec<K>")]
#[serde(bound(serialize = "K: Clone + Serialize", deserialize = "K: Eq + Deserialize<'de>"))]
pub struct DependencySet<K> {
    keys: Vec<K>,
}

impl<K> DependencySet<K> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates keys in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, K> {
        self.keys.iter()
    }
}

impl<K: Eq> DependencySet<K> {
    /// Returns true if `key` is in the set.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.keys.iter().any(|k| k.borrow() == key)
    }

    /// Adds `key`, returning false if it was already present.
    pub fn insert(&mut self, key: K) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Removes `key`, returning true if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let before = self.keys.len();
        self.keys.retain(|k| k.borrow() != key);
        self.keys.len() != before
    }

    /// Adds `key` if absent, removes it if present.
    ///
    /// Returns true if `key` is in the set afterwards.
    pub fn toggle(&mut self, key: K) -> bool {
        if self.remove(&key) {
            false
        } else {
            self.keys.push(key);
            true
        }
    }
}

impl<K> Default for DependencySet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq> PartialEq for DependencySet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.keys.iter().all(|k| other.contains(k))
    }
}

impl<K: Eq> Eq for DependencySet<K> {}

impl<K: Eq> From<Vec<K>> for DependencySet<K> {
    fn from(keys: Vec<K>) -> Self {
        keys.into_iter().collect()
    }
}

impl<K> From<DependencySet<K>> for Vec<K> {
    fn from(set: DependencySet<K>) -> Self {
        set.keys
    }
}

impl<K: Eq> FromIterator<K> for DependencySet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = Self::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

impl<'a, K> IntoIterator for &'a DependencySet<K> {
    type Item = &'a K;
    type IntoIter = std::slice::Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// An ordered arena of [`DependencyNode`]s.
///
/// The graph does not enforce key uniqueness or referential integrity; that
/// is the validator's job. Lookups by key return the first matching node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph<N> {
    nodes: Vec<N>,
}

impl<N> DependencyGraph<N> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the nodes in storage order.
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Iterates the nodes in storage order.
    pub fn iter(&self) -> std::slice::Iter<'_, N> {
        self.nodes.iter()
    }

    /// Consumes the graph, returning its nodes.
    pub fn into_nodes(self) -> Vec<N> {
        self.nodes
    }

    /// Removes every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

impl<N: DependencyNode> DependencyGraph<N> {
    /// Appends a node and returns a reference to it.
    pub fn push(&mut self, node: N) -> &N {
        self.nodes.push(node);
        &self.nodes[self.nodes.len() - 1]
    }

    /// Returns the first node with the given key.
    pub fn get<Q>(&self, key: &Q) -> Option<&N>
    where
        N::Key: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.nodes.iter().find(|n| n.key().borrow() == key)
    }

    /// Returns true if some node has the given key.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        N::Key: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns the dependency set of the node with the given key.
    pub fn dependencies<Q>(&self, key: &Q) -> Option<&DependencySet<N::Key>>
    where
        N::Key: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.get(key).map(|n| n.dependencies())
    }

    /// Returns the keys of nodes that depend on the given key.
    pub fn dependents<Q>(&self, key: &Q) -> Vec<&N::Key>
    where
        N::Key: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.nodes
            .iter()
            .filter(|n| n.dependencies().contains(key))
            .map(|n| n.key())
            .collect()
    }

    /// Iterates every node except those with the given key.
    pub fn others<'a, Q>(&'a self, key: &'a Q) -> impl Iterator<Item = &'a N> + 'a
    where
        N::Key: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.nodes.iter().filter(move |n| n.key().borrow() != key)
    }

    /// Returns nodes with no dependencies.
    pub fn roots(&self) -> Vec<&N> {
        self.nodes
            .iter()
            .filter(|n| n.dependencies().is_empty())
            .collect()
    }

    /// Returns nodes that nothing depends on.
    pub fn leaves(&self) -> Vec<&N> {
        self.nodes
            .iter()
            .filter(|n| self.dependents(n.key()).is_empty())
            .collect()
    }

    /// Removes every node with the given key and scrubs the key from all
    /// remaining dependency sets.
    ///
    /// Returns the number of nodes removed. Unknown keys are a no-op.
    pub fn remove_cascade<Q>(&mut self, key: &Q) -> usize
    where
        N::Key: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.key().borrow() != key);
        for node in &mut self.nodes {
            node.dependencies_mut().remove(key);
        }
        before - self.nodes.len()
    }

    /// Toggles `dependency` in the dependency set of every node keyed `key`.
    ///
    /// Returns whether `dependency` is present afterwards, or `None` if no
    /// node has the key.
    pub fn toggle<Q>(&mut self, key: &Q, dependency: N::Key) -> Option<bool>
    where
        N::Key: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut result = None;
        for node in self.nodes.iter_mut().filter(|n| n.key().borrow() == key) {
            result = Some(node.dependencies_mut().toggle(dependency.clone()));
        }
        result
    }

    /// Builds a petgraph view of the relation.
    ///
    /// Each stored node becomes one graph node weighted by its key. Edges
    /// run from a dependency to its dependent. Dependencies that name no
    /// node are left out. When keys repeat, a dependency on that key gets an
    /// edge from every node carrying it.
    pub fn to_digraph(&self) -> DiGraph<N::Key, ()> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), 0);
        let mut key_to_indices: HashMap<&N::Key, Vec<NodeIndex>> = HashMap::new();
        let mut indices = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let index = graph.add_node(node.key().clone());
            key_to_indices.entry(node.key()).or_default().push(index);
            indices.push(index);
        }

        for (node, &index) in self.nodes.iter().zip(&indices) {
            for dependency in node.dependencies() {
                for &dep_index in key_to_indices.get(dependency).into_iter().flatten() {
                    graph.add_edge(dep_index, index, ());
                }
            }
        }

        graph
    }
}

impl<N> Default for DependencyGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> From<Vec<N>> for DependencyGraph<N> {
    fn from(nodes: Vec<N>) -> Self {
        Self { nodes }
    }
}

impl<N> FromIterator<N> for DependencyGraph<N> {
    fn from_iter<I: IntoIterator<Item = N>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl<'a, N> IntoIterator for &'a DependencyGraph<N> {
    type Item = &'a N;
    type IntoIter = std::slice::Iter<'a, N>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

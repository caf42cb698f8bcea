//! Package dependency graph of one transitive resolution.

use std::collections::{HashMap, HashSet};
use std::fmt;

use dexec_core::version::{NuGetVersion, VersionRange};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

/// A package at its final, merged version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNode {
    pub id: String,
    pub version: NuGetVersion,
}

impl fmt::Display for PackageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Edge label: the range the parent declared.
#[derive(Debug, Clone)]
pub struct DepEdge {
    pub range: VersionRange,
}

/// One node per package id, keyed case-insensitively.
#[derive(Debug, Default)]
pub struct PackageGraph {
    graph: DiGraph<PackageNode, DepEdge>,
    index: HashMap<String, NodeIndex>,
    pub root: Option<NodeIndex>,
}

impl PackageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package, or raise the version of an existing node to `version`
    /// when it is higher.
    pub fn upsert(&mut self, id: &str, version: &NuGetVersion) -> NodeIndex {
        let key = id.to_ascii_lowercase();
        if let Some(&idx) = self.index.get(&key) {
            if self.graph[idx].version < *version {
                self.graph[idx].version = version.clone();
            }
            return idx;
        }
        let idx = self.graph.add_node(PackageNode {
            id: id.to_string(),
            version: version.clone(),
        });
        self.index.insert(key, idx);
        idx
    }

    pub fn set_root(&mut self, idx: NodeIndex) {
        self.root = Some(idx);
    }

    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DepEdge) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, edge);
        }
    }

    pub fn find(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(&id.to_ascii_lowercase()).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &PackageNode {
        &self.graph[idx]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Every package including the root, ordered by id.
    pub fn packages(&self) -> Vec<&PackageNode> {
        let mut nodes: Vec<&PackageNode> = self.graph.node_weights().collect();
        nodes.sort_by_key(|n| n.id.to_ascii_lowercase());
        nodes
    }

    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DepEdge)> {
        let mut deps: Vec<(NodeIndex, &DepEdge)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect();
        deps.sort_by_key(|(i, _)| self.graph[*i].id.to_ascii_lowercase());
        deps
    }

    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.source())
            .collect()
    }

    /// Render the graph as a tree from the root.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = String::new();
        let Some(root) = self.root else {
            return output;
        };
        output.push_str(&format!("{}\n", self.graph[root]));

        let mut visited = HashSet::new();
        visited.insert(root);
        let deps = self.dependencies_of(root);
        let count = deps.len();
        for (i, (idx, edge)) in deps.iter().enumerate() {
            self.print_subtree(&mut output, *idx, edge, "", i == count - 1, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        edge: &DepEdge,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let node = &self.graph[idx];
        output.push_str(&format!("{prefix}{connector}{node} (requested {})\n", edge.range));

        if max_depth.is_some_and(|max| depth >= max) || !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, (child, child_edge)) in deps.iter().enumerate() {
            self.print_subtree(
                output,
                *child,
                child_edge,
                &child_prefix,
                i == count - 1,
                depth + 1,
                max_depth,
                visited,
            );
        }
        visited.remove(&idx);
    }

    /// Path of packages from the root to `id`, explaining why it is present.
    pub fn find_path(&self, id: &str) -> Option<Vec<&PackageNode>> {
        let root = self.root?;
        let target = self.find(id)?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(root, target, &mut path, &mut visited) {
            Some(path.iter().map(|&idx| &self.graph[idx]).collect())
        } else {
            None
        }
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for edge in self.graph.edges(current) {
            if self.dfs_path(edge.target(), target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }
}

//! Dependency graph of memory bank documents.
//!
//! An edge `source -> target` means "source depends on target": the target
//! must be loaded before the source. Edges come from markdown links,
//! transclusion directives and static declarations.
//!
//! ## Layout
//!
//! ```text
//! index: name -> NodeId
//! slots: [Option<Node>]            (arena, insertion ordered, tombstoned on removal)
//!   Node.outgoing: [(NodeId, kind)]  dependencies
//!   Node.incoming: [(NodeId, kind)]  dependents (mirror of outgoing)
//! ```
//!
//! The graph is not synchronised. Mutations must be serialised by the caller;
//! concurrent read-only queries are fine.

mod cycles;
pub mod export;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{require_name, MemoryBankError, Result};
use crate::links::{LinkKind, ParsedLinks};

pub use export::{EdgeRecord, GraphDict};

pub type NodeId = usize;

/// Default cap on enumerated simple cycles.
pub const DEFAULT_MAX_CYCLES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    MarkdownLink,
    Transclusion,
    /// Declared in configuration or front matter
    Static,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::MarkdownLink => "markdown_link",
            EdgeKind::Transclusion => "transclusion",
            EdgeKind::Static => "static",
        }
    }
}

impl From<LinkKind> for EdgeKind {
    fn from(kind: LinkKind) -> Self {
        match kind {
            LinkKind::MarkdownLink => EdgeKind::MarkdownLink,
            LinkKind::Transclusion => EdgeKind::Transclusion,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    outgoing: Vec<(NodeId, EdgeKind)>,
    incoming: Vec<(NodeId, EdgeKind)>,
}

/// Summary numbers for a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    /// Documents with neither dependencies nor dependents
    pub orphans: Vec<String>,
    /// Documents nothing depends on but which depend on something
    pub entry_points: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    slots: Vec<Option<Node>>,
    index: HashMap<String, NodeId>,
    /// Live edges in global insertion order
    edge_log: Vec<(NodeId, NodeId, EdgeKind)>,
    max_cycles: usize,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            edge_log: Vec::new(),
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles.max(1);
        self
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.edge_log.clear();
    }

    /// Adds a node if missing and returns its id.
    pub fn add_node(&mut self, name: &str) -> Result<NodeId> {
        require_name(name, "node name")?;
        if let Some(&id) = self.index.get(name) {
            return Ok(id);
        }
        let id = self.slots.len();
        self.slots.push(Some(Node {
            name: name.to_string(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }));
        self.index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Adds `source -> target`. Returns `false` when an edge of the same kind
    /// between the two already exists.
    pub fn add_edge(&mut self, source: &str, target: &str, kind: EdgeKind) -> Result<bool> {
        require_name(source, "edge source")?;
        require_name(target, "edge target")?;
        let s = self.add_node(source)?;
        let t = self.add_node(target)?;

        let exists = self.node(s).outgoing.contains(&(t, kind));
        if exists {
            return Ok(false);
        }

        self.node_mut(s).outgoing.push((t, kind));
        self.node_mut(t).incoming.push((s, kind));
        self.edge_log.push((s, t, kind));
        Ok(true)
    }

    /// Removes a node and every edge touching it.
    pub fn remove_node(&mut self, name: &str) -> bool {
        let Some(id) = self.index.remove(name) else {
            return false;
        };
        let Some(node) = self.slots[id].take() else {
            return false;
        };

        for &(t, _) in &node.outgoing {
            if t == id {
                continue;
            }
            if let Some(target) = self.slots[t].as_mut() {
                target.incoming.retain(|&(s, _)| s != id);
            }
        }
        for &(s, _) in &node.incoming {
            if s == id {
                continue;
            }
            if let Some(source) = self.slots[s].as_mut() {
                source.outgoing.retain(|&(t, _)| t != id);
            }
        }
        self.edge_log.retain(|&(s, t, _)| s != id && t != id);
        true
    }

    /// Clears the graph and rebuilds it from parsed documents. Every parsed
    /// document becomes a node, in iteration order, even without links.
    pub fn build_from_links<'a, I>(&mut self, links: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a ParsedLinks)>,
    {
        self.clear();
        let links: Vec<(&str, &ParsedLinks)> = links.into_iter().collect();
        for (name, _) in &links {
            self.add_node(name)?;
        }
        for (name, parsed) in &links {
            for link in parsed.all() {
                self.add_edge(name, &link.target, link.kind.into())?;
            }
        }
        tracing::debug!(
            "Built dependency graph: {} nodes, {} edges",
            self.node_count(),
            self.edge_log.len()
        );
        Ok(())
    }

    /// Adds static edges `document -> dependency` for each declaration.
    pub fn add_static_dependencies(&mut self, declared: &BTreeMap<String, Vec<String>>) -> Result<()> {
        for (document, dependencies) in declared {
            for dependency in dependencies {
                self.add_edge(document, dependency, EdgeKind::Static)?;
            }
        }
        Ok(())
    }

    /// Full rebuild from parsed links plus static declarations.
    pub fn rebuild<'a, I>(&mut self, links: I, declared: &BTreeMap<String, Vec<String>>) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a ParsedLinks)>,
    {
        self.build_from_links(links)?;
        self.add_static_dependencies(declared)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_log.len()
    }

    /// Node names in insertion order.
    pub fn node_names(&self) -> Vec<&str> {
        self.live_nodes().map(|(_, n)| n.name.as_str()).collect()
    }

    /// Insertion rank of a node, used as a stable tie-breaker.
    pub fn insertion_rank(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Every edge as `(source, target, kind)` in insertion order.
    ///
    /// Re-adding edges in this order rebuilds identical outgoing and
    /// incoming lists.
    pub fn edges(&self) -> Vec<(&str, &str, EdgeKind)> {
        self.edge_log
            .iter()
            .map(|&(s, t, kind)| (self.node(s).name.as_str(), self.node(t).name.as_str(), kind))
            .collect()
    }

    /// Direct dependencies of a document, deduplicated, in edge order.
    pub fn get_dependencies(&self, name: &str) -> Vec<&str> {
        match self.index.get(name) {
            Some(&id) => self.unique(&self.node(id).outgoing),
            None => Vec::new(),
        }
    }

    /// Direct dependents of a document, deduplicated, in edge order.
    pub fn get_dependents(&self, name: &str) -> Vec<&str> {
        match self.index.get(name) {
            Some(&id) => self.unique(&self.node(id).incoming),
            None => Vec::new(),
        }
    }

    /// Transitive dependencies of `name` up to `max_depth` hops, in
    /// post-order: every document appears after its own dependencies where
    /// the graph allows it. The document itself is not included.
    ///
    /// A node is within the limit when its shortest path from `name` is at
    /// most `max_depth` hops, whichever path the traversal reaches it by.
    pub fn dependency_closure(&self, name: &str, max_depth: usize) -> Vec<String> {
        let Some(&root) = self.index.get(name) else {
            return Vec::new();
        };

        // Shortest hop count from the root
        let mut distance: Vec<Option<usize>> = vec![None; self.slots.len()];
        distance[root] = Some(0);
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            let depth = distance[id].unwrap_or(0);
            if depth >= max_depth {
                continue;
            }
            for dep in self.unique_ids(&self.node(id).outgoing) {
                if distance[dep].is_none() {
                    distance[dep] = Some(depth + 1);
                    queue.push_back(dep);
                }
            }
        }

        let expands = |id: NodeId| distance[id].is_some_and(|d| d < max_depth);
        let mut visited = vec![false; self.slots.len()];
        let mut order = Vec::new();
        visited[root] = true;

        // (node, next neighbour index)
        let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
        while let Some(frame) = stack.last_mut() {
            let (id, next) = *frame;
            let deps = self.unique_ids(&self.node(id).outgoing);
            if expands(id) && next < deps.len() {
                frame.1 += 1;
                let dep = deps[next];
                if !visited[dep] {
                    visited[dep] = true;
                    stack.push((dep, 0));
                }
            } else {
                stack.pop();
                if id != root {
                    order.push(self.node(id).name.clone());
                }
            }
        }

        order
    }

    /// All simple cycles, each starting at its earliest-inserted node. A
    /// single-element cycle is a self-reference. Enumeration stops after the
    /// configured cycle cap.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let active: Vec<bool> = self.slots.iter().map(|s| s.is_some()).collect();
        self.cycles_within(&active, self.max_cycles)
    }

    pub fn has_cycles(&self) -> bool {
        let active: Vec<bool> = self.slots.iter().map(|s| s.is_some()).collect();
        !self.cycles_within(&active, 1).is_empty()
    }

    fn cycles_within(&self, active: &[bool], limit: usize) -> Vec<Vec<String>> {
        let adj: Vec<Vec<NodeId>> = self
            .slots
            .iter()
            .map(|slot| match slot {
                Some(node) => self.unique_ids(&node.outgoing),
                None => Vec::new(),
            })
            .collect();

        cycles::simple_cycles(&adj, active, limit)
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|id| self.node(id).name.clone()).collect())
            .collect()
    }

    /// Topological loading order: every document comes after all of its
    /// dependencies. Restricted to what `roots` reach, or the whole graph when
    /// `roots` is `None`. Ties are broken by insertion order.
    ///
    /// Fails with [`MemoryBankError::CycleDetected`] when a cycle blocks the
    /// order; no partial order is returned.
    pub fn compute_loading_order(&self, roots: Option<&[&str]>) -> Result<Vec<String>> {
        let included = match roots {
            Some(roots) => self.reachable_from(roots)?,
            None => self.slots.iter().map(|s| s.is_some()).collect(),
        };

        let mut pending = vec![0usize; self.slots.len()];
        let mut ready = BTreeSet::new();
        let mut total = 0;
        for (id, &inside) in included.iter().enumerate() {
            if !inside {
                continue;
            }
            total += 1;
            pending[id] = self
                .unique_ids(&self.node(id).outgoing)
                .into_iter()
                .filter(|&d| included[d])
                .count();
            if pending[id] == 0 {
                ready.insert(id);
            }
        }

        let mut order = Vec::with_capacity(total);
        while let Some(id) = ready.pop_first() {
            order.push(self.node(id).name.clone());
            for dependent in self.unique_ids(&self.node(id).incoming) {
                if !included[dependent] || dependent == id {
                    continue;
                }
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < total {
            let done: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
            let blocked: Vec<bool> = included
                .iter()
                .enumerate()
                .map(|(id, &inside)| inside && !done.contains(self.node(id).name.as_str()))
                .collect();
            let cycle = self
                .cycles_within(&blocked, 1)
                .into_iter()
                .next()
                .unwrap_or_else(|| {
                    blocked
                        .iter()
                        .enumerate()
                        .filter(|(_, b)| **b)
                        .map(|(id, _)| self.node(id).name.clone())
                        .collect()
                });
            tracing::debug!("Loading order blocked by cycle: {}", cycle.join(" -> "));
            return Err(MemoryBankError::CycleDetected { cycle });
        }

        Ok(order)
    }

    pub fn stats(&self) -> GraphStats {
        let mut orphans = Vec::new();
        let mut entry_points = Vec::new();
        for (_, node) in self.live_nodes() {
            match (node.outgoing.is_empty(), node.incoming.is_empty()) {
                (true, true) => orphans.push(node.name.clone()),
                (false, true) => entry_points.push(node.name.clone()),
                _ => {}
            }
        }
        GraphStats {
            nodes: self.node_count(),
            edges: self.edge_log.len(),
            orphans,
            entry_points,
        }
    }

    fn reachable_from(&self, roots: &[&str]) -> Result<Vec<bool>> {
        let mut included = vec![false; self.slots.len()];
        let mut stack = Vec::new();
        for root in roots {
            require_name(root, "root document")?;
            let &id = self
                .index
                .get(*root)
                .ok_or_else(|| MemoryBankError::UnknownDocument(root.to_string()))?;
            if !included[id] {
                included[id] = true;
                stack.push(id);
            }
        }
        while let Some(id) = stack.pop() {
            for &(dep, _) in &self.node(id).outgoing {
                if !included[dep] {
                    included[dep] = true;
                    stack.push(dep);
                }
            }
        }
        Ok(included)
    }

    fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|n| (id, n)))
    }

    fn node(&self, id: NodeId) -> &Node {
        self.slots[id]
            .as_ref()
            .expect("adjacency only references live nodes")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id]
            .as_mut()
            .expect("adjacency only references live nodes")
    }

    fn unique_ids(&self, edges: &[(NodeId, EdgeKind)]) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        edges
            .iter()
            .filter(|(id, _)| seen.insert(*id))
            .map(|&(id, _)| id)
            .collect()
    }

    fn unique(&self, edges: &[(NodeId, EdgeKind)]) -> Vec<&str> {
        self.unique_ids(edges)
            .into_iter()
            .map(|id| self.node(id).name.as_str())
            .collect()
    }
}

//! Graph export: Mermaid flowchart text and a serialisable dict form.
//!
//! Both follow node and edge insertion order so output is stable across runs.

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::{DependencyGraph, EdgeKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

/// Plain data form of a [`DependencyGraph`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDict {
    pub nodes: Vec<String>,
    pub edges: Vec<EdgeRecord>,
}

fn mermaid_label(name: &str) -> String {
    name.replace('"', "#quot;")
}

impl DependencyGraph {
    pub fn to_dict(&self) -> GraphDict {
        GraphDict {
            nodes: self.node_names().into_iter().map(String::from).collect(),
            edges: self
                .edges()
                .into_iter()
                .map(|(source, target, kind)| EdgeRecord {
                    source: source.to_string(),
                    target: target.to_string(),
                    kind,
                })
                .collect(),
        }
    }

    /// Rebuild a graph from its dict form.
    pub fn from_dict(dict: &GraphDict) -> Result<Self> {
        let mut graph = DependencyGraph::new();
        for node in &dict.nodes {
            graph.add_node(node)?;
        }
        for edge in &dict.edges {
            graph.add_edge(&edge.source, &edge.target, edge.kind)?;
        }
        Ok(graph)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.to_dict())?)
    }

    /// Mermaid flowchart. Links render as solid arrows, transclusions as
    /// dotted `includes` arrows and static declarations as thick `requires`
    /// arrows.
    pub fn to_mermaid(&self) -> String {
        let names = self.node_names();
        let mut out = String::from("graph TD\n");

        for (i, name) in names.iter().enumerate() {
            out.push_str(&format!("    n{}[\"{}\"]\n", i, mermaid_label(name)));
        }

        let position = |name: &str| names.iter().position(|n| *n == name).unwrap_or(0);
        for (source, target, kind) in self.edges() {
            let arrow = match kind {
                EdgeKind::MarkdownLink => "-->",
                EdgeKind::Transclusion => "-.->|includes|",
                EdgeKind::Static => "==>|requires|",
            };
            out.push_str(&format!(
                "    n{} {} n{}\n",
                position(source),
                arrow,
                position(target)
            ));
        }

        out
    }
}

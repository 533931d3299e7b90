//! A named collection of nodes plus its control catalogue.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::node::Node;

/// A remote operation a probe can run against a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Control {
    pub id: String,
    pub human: String,
    pub icon: String,
}

impl Control {
    pub fn new(id: impl Into<String>, human: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            human: human.into(),
            icon: icon.into(),
        }
    }
}

/// Control catalogue keyed by control ID.
pub type Controls = BTreeMap<String, Control>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub nodes: BTreeMap<String, Node>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub controls: Controls,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `node` under its ID, merging with any node already there.
    pub fn add_node(&mut self, node: Node) {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => *existing = existing.merge(&node),
            None => {
                self.nodes.insert(node.id.clone(), node);
            }
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.add_node(node);
        self
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.add_control(control);
        self
    }

    pub fn add_control(&mut self, control: Control) {
        match self.controls.get_mut(&control.id) {
            Some(existing) if *existing >= control => {}
            _ => {
                self.controls.insert(control.id.clone(), control);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn merge(&self, other: &Topology) -> Topology {
        let mut out = self.clone();
        for (key, node) in &other.nodes {
            out.nodes
                .entry(key.clone())
                .and_modify(|n| *n = n.merge(node))
                .or_insert_with(|| node.clone());
        }
        for control in other.controls.values() {
            out.add_control(control.clone());
        }
        out
    }
}

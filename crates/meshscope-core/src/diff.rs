//! Minimal deltas between two rendered snapshots.

use serde::{Deserialize, Serialize};

use crate::render::{RenderableNode, RenderableNodes};

/// Nodes added, updated and removed between two snapshots, each sorted by ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default)]
    pub add: Vec<RenderableNode>,
    #[serde(default)]
    pub update: Vec<RenderableNode>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl Diff {
    /// Compare two pruned snapshots. Against an empty `prev` every node is
    /// an addition.
    pub fn between(prev: &RenderableNodes, next: &RenderableNodes) -> Diff {
        let mut diff = Diff::default();
        for (id, node) in next.iter() {
            match prev.get(id) {
                None => diff.add.push(node.clone()),
                Some(old) if old != node => diff.update.push(node.clone()),
                Some(_) => {}
            }
        }
        diff.remove = prev
            .iter()
            .filter(|(id, _)| !next.contains(id))
            .map(|(id, _)| id.clone())
            .collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.update.len() + self.remove.len()
    }
}

impl RenderableNodes {
    /// Replay `diff` on top of `self`.
    pub fn apply(&self, diff: &Diff) -> RenderableNodes {
        let mut out = self.clone();
        for id in &diff.remove {
            out.remove(id);
        }
        for node in diff.add.iter().chain(diff.update.iter()) {
            out.insert(node.clone());
        }
        out
    }
}

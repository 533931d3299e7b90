//! Projecting a merged report into a renderable graph.
//!
//! A [`Renderer`] is a pure function from a [`Report`] to
//! [`RenderableNodes`]. Views are assembled from three combinators:
//!
//! - [`TopologySelector`] turns every origin node of one topology into a
//!   renderable node of the same ID.
//! - [`Map`] runs a [`MapFunc`] over another renderer's output, folding
//!   outputs that share an ID and re-pointing adjacency at the new IDs.
//! - [`Reduce`] unions the outputs of several renderers.
//!
//! The fixed set of views lives in [`view`].

use std::cmp;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::report::{
    EdgeMetadata, EdgeMetadatas, IdSet, Networks, Node, Report, TopologyKind, id as origin_id, keys,
};

pub mod detail;
pub mod id;
pub mod mapping;
pub mod view;

pub use detail::{ControlInstance, DetailedNode, MetadataRow, MetricRow, NodeSummary, NodeSummaryGroup, Parent};
pub use view::View;

// ---------------------------------------------------------------------------
// RenderableNode
// ---------------------------------------------------------------------------

/// The origin node a renderable node summarises in the detail view.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OriginRef {
    pub topology: TopologyKind,
    pub id: String,
}

/// A display-oriented aggregate of one or more origin nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderableNode {
    pub id: String,
    #[serde(default)]
    pub label_major: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label_minor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rank: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub pseudo: bool,
    /// Fold of every origin node behind this one. Adjacency and edges are in
    /// render-ID space.
    #[serde(default, skip_serializing_if = "is_default_node")]
    pub node: Node,
    /// Origin IDs folded into this node.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub children: IdSet,
    /// Render IDs of the nodes this one belongs to.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub parents: IdSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<OriginRef>,
    #[serde(default, skip_serializing_if = "EdgeMetadata::is_empty")]
    pub edge_metadata: EdgeMetadata,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_default_node(n: &Node) -> bool {
    *n == Node::default()
}

impl RenderableNode {
    /// A renderable standing for exactly one origin node.
    pub fn from_origin(kind: TopologyKind, id: &str, node: &Node) -> Self {
        Self {
            id: id.to_string(),
            node: node.clone(),
            children: IdSet::from([id.to_string()]),
            origin: Some(OriginRef {
                topology: kind,
                id: id.to_string(),
            }),
            ..Default::default()
        }
    }

    /// Relabel `input` under a new ID, keeping everything it aggregates.
    pub fn with_labels(
        id: impl Into<String>,
        major: impl Into<String>,
        minor: impl Into<String>,
        rank: impl Into<String>,
        input: &RenderableNode,
    ) -> Self {
        Self {
            id: id.into(),
            label_major: major.into(),
            label_minor: minor.into(),
            rank: rank.into(),
            node: input.node.clone(),
            children: input.children.clone(),
            origin: input.origin.clone(),
            edge_metadata: input.edge_metadata,
            ..Default::default()
        }
    }

    /// An unlabelled node carrying `input`'s aggregate, to be joined with an
    /// identity-mapped node of the same ID.
    pub fn derived(id: impl Into<String>, input: &RenderableNode) -> Self {
        Self {
            id: id.into(),
            node: input.node.clone(),
            children: input.children.clone(),
            edge_metadata: input.edge_metadata,
            ..Default::default()
        }
    }

    pub fn derived_pseudo(id: impl Into<String>, major: impl Into<String>, input: &RenderableNode) -> Self {
        Self {
            label_major: major.into(),
            pseudo: true,
            ..Self::derived(id, input)
        }
    }

    pub fn with_control_node(mut self, origin_id: impl Into<String>) -> Self {
        self.control_node = Some(origin_id.into());
        self
    }

    pub fn with_counter(mut self, key: &str, value: u64) -> Self {
        self.node = self.node.with_counter(key, value);
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.node.metadata.get(key)
    }

    pub fn adjacency(&self) -> &IdSet {
        &self.node.adjacency
    }

    /// Fold two renderable nodes that share an ID.
    ///
    /// Labels keep the greater non-empty value, a node stays pseudo only if
    /// both sides are, and all counters are summed.
    pub fn merge(&self, other: &RenderableNode) -> RenderableNode {
        RenderableNode {
            id: cmp::max(&self.id, &other.id).clone(),
            label_major: cmp::max(&self.label_major, &other.label_major).clone(),
            label_minor: cmp::max(&self.label_minor, &other.label_minor).clone(),
            rank: cmp::max(&self.rank, &other.rank).clone(),
            pseudo: self.pseudo && other.pseudo,
            node: self.node.fold(&other.node),
            children: self.children.union(&other.children).cloned().collect(),
            parents: self.parents.union(&other.parents).cloned().collect(),
            control_node: cmp::max(&self.control_node, &other.control_node).clone(),
            origin: cmp::max(&self.origin, &other.origin).clone(),
            edge_metadata: self.edge_metadata.flatten(&other.edge_metadata),
        }
    }

    /// Canonical form for comparison and transmission.
    ///
    /// Keeps identity, labels, adjacency, edges, children and parents. The
    /// folded attribute bags only feed rendering and are dropped, as are
    /// zero counters and empty edges.
    pub fn prune(&self) -> RenderableNode {
        let edges: EdgeMetadatas = self
            .node
            .edges
            .iter()
            .map(|(dst, em)| (dst.clone(), em.pruned()))
            .filter(|(_, em)| !em.is_empty())
            .collect();
        RenderableNode {
            node: Node {
                adjacency: self.node.adjacency.clone(),
                edges,
                ..Default::default()
            },
            edge_metadata: self.edge_metadata.pruned(),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// RenderableNodes
// ---------------------------------------------------------------------------

/// A rendered graph keyed by render ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderableNodes(BTreeMap<String, RenderableNode>);

impl RenderableNodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `node`, folding it into any node already under its ID.
    pub fn add(&mut self, node: RenderableNode) {
        match self.0.get_mut(&node.id) {
            Some(existing) => *existing = existing.merge(&node),
            None => {
                self.0.insert(node.id.clone(), node);
            }
        }
    }

    /// Insert `node` as is, replacing any node under its ID.
    pub fn insert(&mut self, node: RenderableNode) -> Option<RenderableNode> {
        self.0.insert(node.id.clone(), node)
    }

    pub fn remove(&mut self, id: &str) -> Option<RenderableNode> {
        self.0.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&RenderableNode> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RenderableNode)> {
        self.0.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &RenderableNode> {
        self.0.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut RenderableNode> {
        self.0.values_mut()
    }

    pub fn merge(&self, other: &RenderableNodes) -> RenderableNodes {
        let mut out = self.clone();
        for node in other.values() {
            out.add(node.clone());
        }
        out
    }

    pub fn prune(&self) -> RenderableNodes {
        RenderableNodes(self.0.iter().map(|(id, n)| (id.clone(), n.prune())).collect())
    }
}

impl FromIterator<RenderableNode> for RenderableNodes {
    fn from_iter<T: IntoIterator<Item = RenderableNode>>(iter: T) -> Self {
        let mut nodes = RenderableNodes::new();
        for node in iter {
            nodes.add(node);
        }
        nodes
    }
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

pub trait Renderer: Send + Sync {
    fn render(&self, rpt: &Report) -> RenderableNodes;
}

/// One renderable node per origin node of a topology.
///
/// Edge metadata is credited to both ends, reversed at the destination. In
/// the endpoint and address topologies an adjacency target that no probe
/// reported is synthesised from its ID with no host, so the mapping stage
/// turns it into a pseudo node rather than losing the edge.
#[derive(Debug, Clone, Copy)]
pub struct TopologySelector(pub TopologyKind);

impl Renderer for TopologySelector {
    fn render(&self, rpt: &Report) -> RenderableNodes {
        let kind = self.0;
        let topology = rpt.topology(kind);

        let mut nodes: BTreeMap<String, RenderableNode> = topology
            .nodes
            .iter()
            .map(|(id, node)| (id.clone(), RenderableNode::from_origin(kind, id, node)))
            .collect();

        if matches!(kind, TopologyKind::Endpoint | TopologyKind::Address) {
            for node in topology.nodes.values() {
                for dst in &node.adjacency {
                    if nodes.contains_key(dst) {
                        continue;
                    }
                    if let Some(synthesised) = synthesise(kind, dst) {
                        log::trace!("synthesised {kind} node {dst}");
                        nodes.insert(
                            dst.clone(),
                            RenderableNode {
                                id: dst.clone(),
                                node: synthesised,
                                ..Default::default()
                            },
                        );
                    }
                }
            }
        }

        for (src, node) in &topology.nodes {
            for (dst, em) in &node.edges {
                if let Some(n) = nodes.get_mut(src) {
                    n.edge_metadata = n.edge_metadata.flatten(em);
                }
                if let Some(n) = nodes.get_mut(dst) {
                    n.edge_metadata = n.edge_metadata.flatten(&em.reversed());
                }
            }
        }

        RenderableNodes(nodes)
    }
}

fn synthesise(kind: TopologyKind, id: &str) -> Option<Node> {
    match kind {
        TopologyKind::Endpoint => {
            let (_, addr, port) = origin_id::parse_endpoint_node_id(id)?;
            Some(Node::new(id).with_metadata([(keys::ADDR, addr), (keys::PORT, port)]))
        }
        TopologyKind::Address => {
            let (_, addr) = origin_id::parse_address_node_id(id)?;
            Some(Node::new(id).with_metadata([(keys::ADDR, addr)]))
        }
        _ => None,
    }
}

/// Maps one renderable node to zero or more output nodes.
pub type MapFunc = fn(&RenderableNode, &Networks) -> Vec<RenderableNode>;

/// Apply a [`MapFunc`] to every node of another renderer's output.
///
/// Outputs sharing an ID are folded together. Afterwards adjacency and
/// per-destination edges of every output are rewritten through the
/// input-to-output ID mapping; targets that mapped to nothing are dropped.
pub struct Map {
    pub map_func: MapFunc,
    pub renderer: Box<dyn Renderer>,
}

impl Map {
    pub fn new(map_func: MapFunc, renderer: impl Renderer + 'static) -> Self {
        Self {
            map_func,
            renderer: Box::new(renderer),
        }
    }
}

impl Renderer for Map {
    fn render(&self, rpt: &Report) -> RenderableNodes {
        let input = self.renderer.render(rpt);
        let local = rpt.local_networks();

        let mut output = RenderableNodes::new();
        // input ID -> output IDs
        let mut mapped: BTreeMap<&str, IdSet> = BTreeMap::new();
        // output ID -> input IDs
        let mut sources: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();

        for (in_id, in_node) in input.iter() {
            for out in (self.map_func)(in_node, &local) {
                mapped.entry(in_id.as_str()).or_default().insert(out.id.clone());
                sources.entry(out.id.clone()).or_default().insert(in_id.as_str());
                output.add(out);
            }
        }

        for out in output.values_mut() {
            let mut adjacency = IdSet::new();
            let mut edges = EdgeMetadatas::new();
            for in_id in sources.get(&out.id).into_iter().flatten() {
                let Some(in_node) = input.get(in_id) else {
                    continue;
                };
                for in_adj in in_node.adjacency() {
                    if let Some(targets) = mapped.get(in_adj.as_str()) {
                        adjacency.extend(targets.iter().cloned());
                    }
                }
                for (in_dst, em) in &in_node.node.edges {
                    for target in mapped.get(in_dst.as_str()).into_iter().flatten() {
                        edges
                            .entry(target.clone())
                            .and_modify(|e| *e = e.flatten(em))
                            .or_insert(*em);
                    }
                }
            }
            out.node.adjacency = adjacency;
            out.node.edges = edges;
        }

        output
    }
}

/// Union of several renderers' outputs.
pub struct Reduce(pub Vec<Box<dyn Renderer>>);

impl Renderer for Reduce {
    fn render(&self, rpt: &Report) -> RenderableNodes {
        self.0
            .iter()
            .fold(RenderableNodes::new(), |acc, r| acc.merge(&r.render(rpt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Topology;

    fn endpoints() -> Report {
        let em = EdgeMetadata {
            egress_packet_count: Some(10),
            egress_byte_count: Some(100),
            ..Default::default()
        };
        let mut rpt = Report::new();
        rpt.endpoint = Topology::new()
            .with_node(
                Node::new("a;10.0.0.1;50000")
                    .with_adjacent("b;10.0.0.2;80")
                    .with_edge("b;10.0.0.2;80", em),
            )
            .with_node(Node::new("b;10.0.0.2;80"))
            .with_node(Node::new("a;10.0.0.1;50001").with_adjacent(";1.2.3.4;443"));
        rpt
    }

    // -----------------------------------------------------------------------
    // TopologySelector
    // -----------------------------------------------------------------------

    #[test]
    fn selector_pushes_edges_to_both_ends() {
        let out = TopologySelector(TopologyKind::Endpoint).render(&endpoints());
        let src = out.get("a;10.0.0.1;50000").unwrap();
        let dst = out.get("b;10.0.0.2;80").unwrap();
        assert_eq!(src.edge_metadata.egress_packet_count, Some(10));
        assert_eq!(dst.edge_metadata.ingress_byte_count, Some(100));
        assert_eq!(src.children, IdSet::from(["a;10.0.0.1;50000".to_string()]));
        assert_eq!(src.origin.as_ref().map(|o| o.topology), Some(TopologyKind::Endpoint));
    }

    #[test]
    fn selector_synthesises_missing_targets() {
        let out = TopologySelector(TopologyKind::Endpoint).render(&endpoints());
        let remote = out.get(";1.2.3.4;443").unwrap();
        assert!(remote.children.is_empty());
        assert_eq!(remote.metadata(keys::ADDR), Some("1.2.3.4"));
        assert_eq!(remote.metadata(keys::HOST_NODE_ID), None);
    }

    #[test]
    fn selector_does_not_synthesise_for_other_topologies() {
        let mut rpt = Report::new();
        rpt.process.add_node(Node::new("h;1").with_adjacent("h;2"));
        let out = TopologySelector(TopologyKind::Process).render(&rpt);
        assert_eq!(out.len(), 1);
    }

    // -----------------------------------------------------------------------
    // Map and Reduce
    // -----------------------------------------------------------------------

    fn by_host(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
        let host = n.id.split(';').next().unwrap_or_default();
        vec![RenderableNode::derived(format!("h:{host}"), n)]
    }

    #[test]
    fn map_folds_and_rewrites_adjacency() {
        let out = Map::new(by_host, TopologySelector(TopologyKind::Endpoint)).render(&endpoints());
        let a = out.get("h:a").unwrap();
        assert_eq!(a.children.len(), 2);
        assert_eq!(a.adjacency(), &IdSet::from(["h:b".to_string(), "h:".to_string()]));
        assert_eq!(a.node.edges["h:b"].egress_packet_count, Some(10));
        assert_eq!(out.get("h:b").unwrap().edge_metadata.ingress_packet_count, Some(10));
    }

    #[test]
    fn reduce_unions_outputs() {
        let rpt = endpoints();
        let r = Reduce(vec![
            Box::new(TopologySelector(TopologyKind::Endpoint)),
            Box::new(TopologySelector(TopologyKind::Process)),
        ]);
        assert_eq!(r.render(&rpt).len(), 4);
    }

    // -----------------------------------------------------------------------
    // RenderableNode
    // -----------------------------------------------------------------------

    #[test]
    fn merge_prefers_labels_and_real_nodes() {
        let input = RenderableNode::from_origin(TopologyKind::Process, "h;1", &Node::new("h;1"));
        let labelled = RenderableNode::with_labels("p", "curl", "h (1)", "curl", &input);
        let pseudo = RenderableNode::derived_pseudo("p", "", &input);
        let merged = labelled.merge(&pseudo);
        assert_eq!(merged.label_major, "curl");
        assert!(!merged.pseudo);
        assert_eq!(merged, pseudo.merge(&labelled));
    }

    #[test]
    fn prune_keeps_structure_and_drops_bags() {
        let node = Node::new("x")
            .with_metadata([(keys::COMM, "curl")])
            .with_adjacent("y")
            .with_edge("y", EdgeMetadata::default())
            .with_edge(
                "z",
                EdgeMetadata {
                    egress_packet_count: Some(0),
                    egress_byte_count: Some(5),
                    ..Default::default()
                },
            );
        let rn = RenderableNode::from_origin(TopologyKind::Process, "x", &node);
        let pruned = rn.prune();
        assert!(pruned.node.metadata.is_empty());
        assert_eq!(pruned.node.adjacency.len(), 1);
        assert_eq!(pruned.node.edges.len(), 1);
        assert_eq!(pruned.node.edges["z"].egress_packet_count, None);
        assert_eq!(pruned.children.len(), 1);
        assert_eq!(pruned.prune(), pruned);
    }
}

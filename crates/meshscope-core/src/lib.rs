//! # meshscope-core
//!
//! Merge engine, renderer and diffing for live infrastructure topology maps.
//!
//! Probes on every host periodically produce a [`Report`] describing the
//! processes, containers, hosts and network endpoints they can see. Reports
//! are merged into one shared [`Store`]; views render the merged report into
//! a graph for a UI, and streaming clients receive [`Diff`]s between
//! successive renders.
//!
//! ## Quick Start
//!
//! ```
//! use meshscope_core::{Diff, Node, Report, RenderableNodes, Store, View};
//!
//! let mut rpt = Report::new();
//! rpt.process.add_node(
//!     Node::new("host1;42").with_metadata([("pid", "42"), ("comm", "nginx")]),
//! );
//!
//! let store = Store::new();
//! store.submit(&rpt);
//!
//! let graph = View::Applications.render(&store.report()).prune();
//! let diff = Diff::between(&RenderableNodes::new(), &graph);
//! assert_eq!(diff.add.len(), 1);
//! ```
//!
//! ## Architecture
//!
//! Report → merge into Store → View render → prune → diff → client
//!
//! Merging is commutative, associative and idempotent at every level, so
//! probes never need to coordinate and duplicate delivery is harmless.
//! Rendering, pruning and diffing are pure and infallible.

pub mod diff;
pub mod render;
pub mod report;
pub mod store;

pub use diff::Diff;
pub use render::{DetailedNode, RenderableNode, RenderableNodes, Renderer, View};
pub use report::{
    Control, EdgeMetadata, Metric, Networks, Node, NodeControls, Report, ReportError, Topology,
    TopologyKind,
};
pub use store::{Store, Subscription};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

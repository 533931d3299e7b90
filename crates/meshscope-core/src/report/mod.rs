//! Reports: one full topology snapshot from one probe.
//!
//! A [`Report`] holds a fixed set of [`Topology`] values, one per domain.
//! Reports from independent probes are combined with [`Report::merge`],
//! which is commutative, associative and idempotent all the way down to
//! individual [`Node`] fields, so out-of-order and duplicated delivery never
//! changes the result.
//!
//! # Wire format
//!
//! Reports travel as JSON, optionally gzip compressed. Decoding sniffs the
//! gzip magic bytes so callers do not need to know which they received.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

pub mod edge;
pub mod id;
pub mod keys;
pub mod metric;
pub mod networks;
pub mod node;
pub mod topology;

pub use edge::{EdgeMetadata, EdgeMetadatas};
pub use metric::{MAX_SAMPLES, Metric, Sample};
pub use networks::Networks;
pub use node::{Counters, Entry, IdSet, Metadata, Node, NodeControls};
pub use topology::{Control, Controls, Topology};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("malformed report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read report: {0}")]
    Io(#[from] std::io::Error),
    #[error("report exceeds {0} bytes")]
    TooLarge(usize),
}

// ---------------------------------------------------------------------------
// Topology kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    Endpoint,
    Address,
    Process,
    Container,
    ContainerImage,
    Pod,
    Service,
    Host,
    Overlay,
}

impl TopologyKind {
    /// Every kind, in lookup order.
    pub const ALL: [TopologyKind; 9] = [
        TopologyKind::Endpoint,
        TopologyKind::Address,
        TopologyKind::Process,
        TopologyKind::Container,
        TopologyKind::ContainerImage,
        TopologyKind::Pod,
        TopologyKind::Service,
        TopologyKind::Host,
        TopologyKind::Overlay,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TopologyKind::Endpoint => "endpoint",
            TopologyKind::Address => "address",
            TopologyKind::Process => "process",
            TopologyKind::Container => "container",
            TopologyKind::ContainerImage => "container_image",
            TopologyKind::Pod => "pod",
            TopologyKind::Service => "service",
            TopologyKind::Host => "host",
            TopologyKind::Overlay => "overlay",
        }
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TopologyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TopologyKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown topology: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub endpoint: Topology,
    #[serde(default)]
    pub address: Topology,
    #[serde(default)]
    pub process: Topology,
    #[serde(default)]
    pub container: Topology,
    #[serde(default)]
    pub container_image: Topology,
    #[serde(default)]
    pub pod: Topology,
    #[serde(default)]
    pub service: Topology,
    #[serde(default)]
    pub host: Topology,
    #[serde(default)]
    pub overlay: Topology,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topology(&self, kind: TopologyKind) -> &Topology {
        match kind {
            TopologyKind::Endpoint => &self.endpoint,
            TopologyKind::Address => &self.address,
            TopologyKind::Process => &self.process,
            TopologyKind::Container => &self.container,
            TopologyKind::ContainerImage => &self.container_image,
            TopologyKind::Pod => &self.pod,
            TopologyKind::Service => &self.service,
            TopologyKind::Host => &self.host,
            TopologyKind::Overlay => &self.overlay,
        }
    }

    pub fn topology_mut(&mut self, kind: TopologyKind) -> &mut Topology {
        match kind {
            TopologyKind::Endpoint => &mut self.endpoint,
            TopologyKind::Address => &mut self.address,
            TopologyKind::Process => &mut self.process,
            TopologyKind::Container => &mut self.container,
            TopologyKind::ContainerImage => &mut self.container_image,
            TopologyKind::Pod => &mut self.pod,
            TopologyKind::Service => &mut self.service,
            TopologyKind::Host => &mut self.host,
            TopologyKind::Overlay => &mut self.overlay,
        }
    }

    pub fn topologies(&self) -> impl Iterator<Item = (TopologyKind, &Topology)> {
        TopologyKind::ALL.into_iter().map(move |k| (k, self.topology(k)))
    }

    pub fn merge(&self, other: &Report) -> Report {
        let mut out = Report::default();
        for kind in TopologyKind::ALL {
            *out.topology_mut(kind) = self.topology(kind).merge(other.topology(kind));
        }
        out
    }

    /// First topology, in [`TopologyKind::ALL`] order, holding `id`.
    pub fn locate(&self, id: &str) -> Option<(TopologyKind, &Node)> {
        self.topologies()
            .find_map(|(kind, topo)| topo.get(id).map(|node| (kind, node)))
    }

    /// CIDRs advertised by host nodes.
    pub fn local_networks(&self) -> Networks {
        let mut nets = Networks::default();
        for node in self.host.nodes.values() {
            if let Some(list) = node.metadata.get(keys::LOCAL_NETWORKS) {
                nets.extend_from(list);
            }
        }
        nets
    }

    pub fn node_count(&self) -> usize {
        self.topologies().map(|(_, t)| t.len()).sum()
    }

    /// Decode a JSON report, gzip compressed or not.
    pub fn from_slice(bytes: &[u8]) -> Result<Report, ReportError> {
        if bytes.starts_with(&GZIP_MAGIC) {
            return Self::from_reader(GzDecoder::new(bytes));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Like [`from_slice`](Self::from_slice), but rejects reports larger
    /// than `limit` bytes after decompression. Decompression stops as soon
    /// as the limit is crossed.
    pub fn from_slice_limited(bytes: &[u8], limit: usize) -> Result<Report, ReportError> {
        if !bytes.starts_with(&GZIP_MAGIC) {
            if bytes.len() > limit {
                return Err(ReportError::TooLarge(limit));
            }
            return Ok(serde_json::from_slice(bytes)?);
        }
        let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
        let mut plain = Vec::new();
        GzDecoder::new(bytes).take(cap).read_to_end(&mut plain)?;
        if plain.len() > limit {
            return Err(ReportError::TooLarge(limit));
        }
        Ok(serde_json::from_slice(&plain)?)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Report, ReportError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        if buf.starts_with(&GZIP_MAGIC) {
            let mut plain = Vec::new();
            GzDecoder::new(buf.as_slice()).read_to_end(&mut plain)?;
            return Ok(serde_json::from_slice(&plain)?);
        }
        Ok(serde_json::from_slice(&buf)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ReportError> {
        Ok(serde_json::to_vec(self)?)
    }
}

//! Per-destination connection counters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Edge metadata keyed by destination node ID.
pub type EdgeMetadatas = BTreeMap<String, EdgeMetadata>;

/// Counters describing traffic from a node towards one destination.
///
/// Every counter is optional: a probe that cannot observe packet counts
/// leaves them out rather than reporting zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_packet_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_byte_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_packet_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_byte_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_conn_count_tcp: Option<u64>,
}

impl EdgeMetadata {
    /// Join two observations of the same edge.
    ///
    /// Counters are cumulative over a probe's reporting window, so the larger
    /// value is the more complete observation. Taking the maximum keeps
    /// duplicate delivery a no-op.
    pub fn merge(&self, other: &EdgeMetadata) -> EdgeMetadata {
        self.combine(other, |a, b| a.max(b))
    }

    /// Sum counters of edges originating from distinct nodes.
    pub fn flatten(&self, other: &EdgeMetadata) -> EdgeMetadata {
        self.combine(other, u64::saturating_add)
    }

    /// The same edge seen from the destination.
    pub fn reversed(&self) -> EdgeMetadata {
        EdgeMetadata {
            egress_packet_count: self.ingress_packet_count,
            egress_byte_count: self.ingress_byte_count,
            ingress_packet_count: self.egress_packet_count,
            ingress_byte_count: self.egress_byte_count,
            max_conn_count_tcp: self.max_conn_count_tcp,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == EdgeMetadata::default()
    }

    /// Zero counters carry no information once rendered.
    pub fn pruned(&self) -> EdgeMetadata {
        let nonzero = |c: Option<u64>| c.filter(|v| *v != 0);
        EdgeMetadata {
            egress_packet_count: nonzero(self.egress_packet_count),
            egress_byte_count: nonzero(self.egress_byte_count),
            ingress_packet_count: nonzero(self.ingress_packet_count),
            ingress_byte_count: nonzero(self.ingress_byte_count),
            max_conn_count_tcp: nonzero(self.max_conn_count_tcp),
        }
    }

    fn combine(&self, other: &EdgeMetadata, f: impl Fn(u64, u64) -> u64) -> EdgeMetadata {
        let pick = |a: Option<u64>, b: Option<u64>| match (a, b) {
            (Some(a), Some(b)) => Some(f(a, b)),
            (a, None) => a,
            (None, b) => b,
        };
        EdgeMetadata {
            egress_packet_count: pick(self.egress_packet_count, other.egress_packet_count),
            egress_byte_count: pick(self.egress_byte_count, other.egress_byte_count),
            ingress_packet_count: pick(self.ingress_packet_count, other.ingress_packet_count),
            ingress_byte_count: pick(self.ingress_byte_count, other.ingress_byte_count),
            max_conn_count_tcp: pick(self.max_conn_count_tcp, other.max_conn_count_tcp),
        }
    }
}

/// Key-wise join of two edge maps using `f` for destinations present in both.
pub(crate) fn combine_edges(
    a: &EdgeMetadatas,
    b: &EdgeMetadatas,
    f: impl Fn(&EdgeMetadata, &EdgeMetadata) -> EdgeMetadata,
) -> EdgeMetadatas {
    let mut out = a.clone();
    for (dst, em) in b {
        out.entry(dst.clone())
            .and_modify(|existing| *existing = f(existing, em))
            .or_insert(*em);
    }
    out
}

//! The atomic unit of topology data.

use std::cmp;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::edge::{EdgeMetadata, EdgeMetadatas, combine_edges};
use super::metric::Metric;

/// Set of node IDs.
pub type IdSet = BTreeSet<String>;

/// Named non-negative counters.
pub type Counters = BTreeMap<String, u64>;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// A metadata value and the time it was sampled.
///
/// Ordered by timestamp first so `max` picks the latest write, with the
/// value breaking ties.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "WireEntry")]
pub struct Entry {
    pub timestamp: DateTime<Utc>,
    pub value: String,
}

/// Probes may send a bare string when they do not stamp values.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireEntry {
    Plain(String),
    Stamped {
        #[serde(default)]
        timestamp: DateTime<Utc>,
        value: String,
    },
}

impl From<WireEntry> for Entry {
    fn from(wire: WireEntry) -> Self {
        match wire {
            WireEntry::Plain(value) => Entry {
                timestamp: DateTime::<Utc>::default(),
                value,
            },
            WireEntry::Stamped { timestamp, value } => Entry { timestamp, value },
        }
    }
}

/// String attributes, last write wins per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Entry>);

impl Metadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|e| e.value.as_str())
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>, timestamp: DateTime<Utc>) {
        let incoming = Entry {
            timestamp,
            value: value.into(),
        };
        self.0
            .entry(key.into())
            .and_modify(|e| {
                if incoming > *e {
                    *e = incoming.clone();
                }
            })
            .or_insert(incoming);
    }

    pub fn merge(&self, other: &Metadata) -> Metadata {
        let mut out = self.0.clone();
        for (key, entry) in &other.0 {
            out.entry(key.clone())
                .and_modify(|e| {
                    if entry > e {
                        *e = entry.clone();
                    }
                })
                .or_insert_with(|| entry.clone());
        }
        Metadata(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, e)| (k.as_str(), e.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

/// Control IDs valid for a node at a point in time.
///
/// The set is a snapshot from one probe: a strictly newer snapshot replaces
/// it wholesale. Equal timestamps keep the greater set so merge stays a
/// total order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeControls {
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub controls: IdSet,
}

impl NodeControls {
    pub fn new<I, S>(timestamp: DateTime<Utc>, controls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            timestamp,
            controls: controls.into_iter().map(Into::into).collect(),
        }
    }

    pub fn merge(&self, other: &NodeControls) -> NodeControls {
        cmp::max(self, other).clone()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty() && self.timestamp == DateTime::<Utc>::default()
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One observed entity: a process, container, host, endpoint and so on.
///
/// Nodes are values. Builders consume `self`; `merge` and `fold` return a
/// new node and leave both inputs untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, Metric>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub adjacency: IdSet,
    #[serde(default, skip_serializing_if = "NodeControls::is_empty")]
    pub controls: NodeControls,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub edges: EdgeMetadatas,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub counters: Counters,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Add unstamped metadata. Stamped values always win over these.
    pub fn with_metadata<I, K, V>(self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.with_metadata_at(DateTime::<Utc>::default(), entries)
    }

    pub fn with_metadata_at<I, K, V>(mut self, timestamp: DateTime<Utc>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in entries {
            self.metadata.insert(k, v, timestamp);
        }
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, metric: Metric) -> Self {
        let key = key.into();
        let merged = match self.metrics.get(&key) {
            Some(existing) => existing.merge(&metric),
            None => metric,
        };
        self.metrics.insert(key, merged);
        self
    }

    pub fn with_adjacent(mut self, id: impl Into<String>) -> Self {
        self.adjacency.insert(id.into());
        self
    }

    pub fn with_adjacency<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.adjacency.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_edge(mut self, dst: impl Into<String>, em: EdgeMetadata) -> Self {
        let dst = dst.into();
        let merged = match self.edges.get(&dst) {
            Some(existing) => existing.merge(&em),
            None => em,
        };
        self.edges.insert(dst, merged);
        self
    }

    pub fn with_controls(mut self, controls: NodeControls) -> Self {
        self.controls = self.controls.merge(&controls);
        self
    }

    pub fn with_counter(mut self, key: impl Into<String>, value: u64) -> Self {
        self.counters.insert(key.into(), value);
        self
    }

    pub fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    /// Join two observations of the same entity.
    pub fn merge(&self, other: &Node) -> Node {
        Node {
            id: cmp::max(&self.id, &other.id).clone(),
            metadata: self.metadata.merge(&other.metadata),
            metrics: merge_metrics(&self.metrics, &other.metrics),
            adjacency: self.adjacency.union(&other.adjacency).cloned().collect(),
            controls: self.controls.merge(&other.controls),
            edges: combine_edges(&self.edges, &other.edges, EdgeMetadata::merge),
            counters: combine_counters(&self.counters, &other.counters, cmp::max),
        }
    }

    /// Combine two distinct entities into one aggregate.
    ///
    /// Same as [`merge`](Self::merge) except edge metadata and counters are
    /// summed, since the inputs describe disjoint traffic.
    pub fn fold(&self, other: &Node) -> Node {
        Node {
            edges: combine_edges(&self.edges, &other.edges, EdgeMetadata::flatten),
            counters: combine_counters(&self.counters, &other.counters, u64::saturating_add),
            ..self.merge(other)
        }
    }
}

fn merge_metrics(
    a: &BTreeMap<String, Metric>,
    b: &BTreeMap<String, Metric>,
) -> BTreeMap<String, Metric> {
    let mut out = a.clone();
    for (key, metric) in b {
        out.entry(key.clone())
            .and_modify(|m| *m = m.merge(metric))
            .or_insert_with(|| metric.clone());
    }
    out
}

fn combine_counters(a: &Counters, b: &Counters, f: impl Fn(u64, u64) -> u64) -> Counters {
    let mut out = a.clone();
    for (key, value) in b {
        out.entry(key.clone())
            .and_modify(|v| *v = f(*v, *value))
            .or_insert(*value);
    }
    out
}

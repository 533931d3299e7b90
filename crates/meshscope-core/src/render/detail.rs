//! Deep view of a single renderable node.
//!
//! A [`DetailedNode`] is derived from a [`RenderableNode`] plus the report
//! it was rendered from. Every lookup into the report is optional: an
//! unresolvable reference drops the one row or link that needed it.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::report::{Control, Metric, Node, Report, Sample, TopologyKind, id as origin_id, keys};

use super::RenderableNode;
use super::id::{make_container_id, make_container_image_id, make_host_id, make_pod_id, make_process_id, make_service_id};
use super::mapping::container_name;
use super::view::View;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedNode {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rank: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub pseudo: bool,
    pub controls: Vec<ControlInstance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSummaryGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<Parent>,
}

/// A control plus what is needed to route an invocation of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlInstance {
    pub probe_id: String,
    pub node_id: String,
    #[serde(flatten)]
    pub control: Control,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRow {
    pub id: String,
    pub label: String,
    pub value: String,
}

/// A metric with display hints.
///
/// Serialises its samples oldest first along with the window bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub id: String,
    pub label: String,
    pub format: &'static str,
    pub group: &'static str,
    /// Latest sample, truncated to two decimals.
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub metric: Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummaryGroup {
    pub label: String,
    pub topology_id: View,
    pub nodes: Vec<NodeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parent {
    pub id: String,
    pub label: String,
    pub topology_id: View,
}

const PERCENT: &str = "percent";
const FILESIZE: &str = "filesize";

impl DetailedNode {
    pub fn make(rpt: &Report, n: &RenderableNode) -> DetailedNode {
        let origin = n.origin.as_ref().and_then(|o| {
            rpt.topology(o.topology)
                .get(&o.id)
                .map(|node| (o.topology, node))
        });
        let (metadata, metrics) = match origin {
            Some((kind, node)) => (node_metadata(kind, node), node_metrics(kind, node)),
            None => (vec![], vec![]),
        };

        DetailedNode {
            id: n.id.clone(),
            label: n.label_major.clone(),
            rank: n.rank.clone(),
            pseudo: n.pseudo,
            controls: controls(rpt, n),
            metadata,
            metrics,
            children: children(rpt, n),
            parents: parents(rpt, n),
        }
    }
}

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

const CONTROL_PRECEDENCE: [TopologyKind; 4] = [
    TopologyKind::Process,
    TopologyKind::Container,
    TopologyKind::ContainerImage,
    TopologyKind::Host,
];

/// Controls of the node's control node, from the first topology holding
/// it. IDs missing from that topology's catalogue are dropped.
pub fn controls(rpt: &Report, n: &RenderableNode) -> Vec<ControlInstance> {
    let Some(node_id) = n.control_node.as_deref() else {
        return vec![];
    };
    let Some((topology, node)) = CONTROL_PRECEDENCE.iter().find_map(|kind| {
        let topology = rpt.topology(*kind);
        topology.get(node_id).map(|node| (topology, node))
    }) else {
        return vec![];
    };
    let probe_id = node.metadata.get(keys::PROBE_ID).unwrap_or_default();
    node.controls
        .controls
        .iter()
        .filter_map(|id| topology.controls.get(id))
        .map(|control| ControlInstance {
            probe_id: probe_id.to_string(),
            node_id: node_id.to_string(),
            control: control.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

const PROCESS_METADATA: &[(&str, &str)] = &[
    (keys::PPID, "Parent PID"),
    (keys::CMDLINE, "Command"),
    (keys::THREADS, "# Threads"),
];

const CONTAINER_METADATA: &[(&str, &str)] = &[
    (keys::CONTAINER_ID, "ID"),
    (keys::IMAGE_ID, "Image ID"),
    (keys::CONTAINER_STATE, "State"),
    (keys::CONTAINER_PORTS, "Ports"),
    (keys::CONTAINER_CREATED, "Created"),
    (keys::CONTAINER_COMMAND, "Command"),
    (keys::WEAVE_MAC_ADDRESS, "Weave MAC"),
    (keys::WEAVE_DNS_HOSTNAME, "Weave DNS Hostname"),
];

const CONTAINER_IMAGE_METADATA: &[(&str, &str)] = &[(keys::IMAGE_ID, "Image ID")];

const POD_METADATA: &[(&str, &str)] = &[
    (keys::POD_ID, "ID"),
    (keys::NAMESPACE, "Namespace"),
    (keys::POD_CREATED, "Created"),
];

const HOST_METADATA: &[(&str, &str)] = &[
    (keys::HOST_NAME, "Hostname"),
    (keys::OS, "Operating system"),
    (keys::KERNEL_VERSION, "Kernel version"),
    (keys::UPTIME, "Uptime"),
];

fn metadata_rows(node: &Node, templates: &[(&str, &str)]) -> Vec<MetadataRow> {
    templates
        .iter()
        .filter_map(|(id, label)| {
            node.metadata.get(id).map(|value| MetadataRow {
                id: id.to_string(),
                label: label.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

/// Docker labels, sorted by label key.
fn docker_label_rows(node: &Node) -> Vec<MetadataRow> {
    node.metadata
        .iter()
        .filter_map(|(key, value)| {
            let label = key.strip_prefix(keys::LABEL_PREFIX)?;
            Some(MetadataRow {
                id: format!("label_{label}"),
                label: format!("Label {label:?}"),
                value: value.to_string(),
            })
        })
        .collect()
}

pub fn node_metadata(kind: TopologyKind, node: &Node) -> Vec<MetadataRow> {
    match kind {
        TopologyKind::Process => metadata_rows(node, PROCESS_METADATA),
        TopologyKind::Container => {
            let mut rows = metadata_rows(node, CONTAINER_METADATA);
            rows.extend(docker_label_rows(node));
            rows
        }
        TopologyKind::ContainerImage => {
            let mut rows = metadata_rows(node, CONTAINER_IMAGE_METADATA);
            rows.extend(docker_label_rows(node));
            rows
        }
        TopologyKind::Pod => metadata_rows(node, POD_METADATA),
        TopologyKind::Host => metadata_rows(node, HOST_METADATA),
        _ => vec![],
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

fn truncate2(v: f64) -> f64 {
    (v * 100.0).trunc() / 100.0
}

impl MetricRow {
    pub fn new(id: &str, label: &str, metric: &Metric, format: &'static str, group: &'static str) -> Self {
        MetricRow {
            id: id.to_string(),
            label: label.to_string(),
            format,
            group,
            value: truncate2(metric.last_sample().map(|s| s.value).unwrap_or(0.0)),
            min: metric.min(),
            max: metric.max(),
            metric: metric.clone(),
        }
    }
}

fn render_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_default()
}

impl Serialize for MetricRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            id: &'a str,
            label: &'a str,
            #[serde(skip_serializing_if = "str::is_empty")]
            format: &'a str,
            #[serde(skip_serializing_if = "str::is_empty")]
            group: &'a str,
            value: f64,
            samples: Vec<&'a Sample>,
            min: f64,
            max: f64,
            first: String,
            last: String,
        }

        Wire {
            id: &self.id,
            label: &self.label,
            format: self.format,
            group: self.group,
            value: self.value,
            samples: self.metric.samples().iter().rev().collect(),
            min: self.min,
            max: self.max,
            first: render_time(self.metric.first()),
            last: render_time(self.metric.last()),
        }
        .serialize(serializer)
    }
}

fn metric_rows(node: &Node, templates: &[(&str, &str, &'static str)]) -> Vec<MetricRow> {
    templates
        .iter()
        .filter_map(|(id, label, format)| {
            node.metrics
                .get(*id)
                .map(|m| MetricRow::new(id, label, m, format, ""))
        })
        .collect()
}

pub fn node_metrics(kind: TopologyKind, node: &Node) -> Vec<MetricRow> {
    match kind {
        TopologyKind::Process => metric_rows(
            node,
            &[
                (keys::CPU_USAGE, "CPU Usage", PERCENT),
                (keys::MEMORY_USAGE, "Memory Usage", FILESIZE),
            ],
        ),
        TopologyKind::Container => metric_rows(
            node,
            &[
                (keys::CPU_TOTAL_USAGE, "CPU Usage", PERCENT),
                (keys::CONTAINER_MEMORY_USAGE, "Memory Usage", FILESIZE),
            ],
        ),
        TopologyKind::Host => host_metrics(node),
        _ => vec![],
    }
}

/// Host rows; the three load rows share one max so they plot on one scale.
fn host_metrics(node: &Node) -> Vec<MetricRow> {
    let loads = [
        (keys::LOAD1, "Load (1m)"),
        (keys::LOAD5, "Load (5m)"),
        (keys::LOAD15, "Load (15m)"),
    ];
    let max_load = loads
        .iter()
        .filter_map(|(id, _)| node.metrics.get(*id))
        .filter(|m| !m.is_empty())
        .map(Metric::max)
        .fold(0.0, f64::max);

    let mut rows = metric_rows(
        node,
        &[
            (keys::HOST_CPU_USAGE, "CPU Usage", PERCENT),
            (keys::HOST_MEM_USAGE, "Memory Usage", PERCENT),
        ],
    );
    for (id, label) in loads {
        if let Some(m) = node.metrics.get(id) {
            let mut row = MetricRow::new(id, label, m, "", "load");
            row.max = max_load;
            rows.push(row);
        }
    }
    rows
}

// ---------------------------------------------------------------------------
// Children
// ---------------------------------------------------------------------------

fn children(rpt: &Report, n: &RenderableNode) -> Vec<NodeSummaryGroup> {
    let mut hosts = vec![];
    let mut pods = vec![];
    let mut images = vec![];
    let mut containers = vec![];
    let mut applications = vec![];

    let own = n.origin.as_ref().map(|o| o.id.as_str());
    for child_id in &n.children {
        if *child_id == n.id || own == Some(child_id.as_str()) {
            continue;
        }
        let Some((kind, child)) = rpt.locate(child_id) else {
            continue;
        };
        match kind {
            TopologyKind::Process => applications.push(process_summary(child_id, child)),
            TopologyKind::Container => containers.push(container_summary(child)),
            TopologyKind::ContainerImage => images.push(container_image_summary(child)),
            TopologyKind::Pod => pods.push(pod_summary(child)),
            TopologyKind::Host => hosts.push(host_summary(child_id, child)),
            _ => {}
        }
    }

    [
        ("Hosts", View::Hosts, hosts),
        ("Pods", View::Pods, pods),
        ("Container Images", View::ContainersByImage, images),
        ("Containers", View::Containers, containers),
        ("Applications", View::Applications, applications),
    ]
    .into_iter()
    .filter(|(_, _, nodes)| !nodes.is_empty())
    .map(|(label, topology_id, nodes)| NodeSummaryGroup {
        label: label.to_string(),
        topology_id,
        nodes,
    })
    .collect()
}

fn process_summary(origin: &str, node: &Node) -> NodeSummary {
    let pid = node.metadata.get(keys::PID);
    let id = match pid {
        Some(pid) => make_process_id(&origin_id::extract_host_id(node), pid),
        None => origin.to_string(),
    };
    let label = node
        .metadata
        .get(keys::COMM)
        .or(pid)
        .unwrap_or(origin)
        .to_string();
    NodeSummary {
        id,
        label,
        metadata: node_metadata(TopologyKind::Process, node),
        metrics: node_metrics(TopologyKind::Process, node),
    }
}

fn container_summary(node: &Node) -> NodeSummary {
    NodeSummary {
        id: make_container_id(node.metadata.get(keys::CONTAINER_ID).unwrap_or_default()),
        label: container_name(node).unwrap_or_default(),
        metadata: node_metadata(TopologyKind::Container, node),
        metrics: node_metrics(TopologyKind::Container, node),
    }
}

fn container_image_summary(node: &Node) -> NodeSummary {
    NodeSummary {
        id: make_container_image_id(node.metadata.get(keys::IMAGE_ID).unwrap_or_default()),
        label: node.metadata.get(keys::IMAGE_NAME).unwrap_or_default().to_string(),
        metadata: node_metadata(TopologyKind::ContainerImage, node),
        metrics: vec![],
    }
}

fn pod_summary(node: &Node) -> NodeSummary {
    NodeSummary {
        id: make_pod_id(node.metadata.get(keys::POD_ID).unwrap_or_default()),
        label: node.metadata.get(keys::POD_NAME).unwrap_or_default().to_string(),
        metadata: node_metadata(TopologyKind::Pod, node),
        metrics: vec![],
    }
}

fn host_summary(origin: &str, node: &Node) -> NodeSummary {
    let hostname = node.metadata.get(keys::HOST_NAME).unwrap_or_default();
    let host = origin_id::parse_host_node_id(origin).unwrap_or(hostname);
    NodeSummary {
        id: make_host_id(host),
        label: hostname.to_string(),
        metadata: node_metadata(TopologyKind::Host, node),
        metrics: node_metrics(TopologyKind::Host, node),
    }
}

// ---------------------------------------------------------------------------
// Parents
// ---------------------------------------------------------------------------

/// The chain of entities `n` belongs to: host, services, pod, container and
/// container image, each resolved against the report. Links that do not
/// resolve, and links back to `n` itself, are dropped.
pub fn parents(rpt: &Report, n: &RenderableNode) -> Vec<Parent> {
    let md = |key| n.metadata(key);
    let mut result = vec![];

    if let Some(host_node_id) = md(keys::HOST_NODE_ID) {
        if let Some(host) = rpt.host.get(host_node_id) {
            let host_id = origin_id::parse_host_node_id(host_node_id).unwrap_or(host_node_id);
            result.push(Parent {
                id: make_host_id(host_id),
                label: host.metadata.get(keys::HOST_NAME).unwrap_or(host_id).to_string(),
                topology_id: View::Hosts,
            });
        }
    }

    if let Some(service_ids) = md(keys::SERVICE_IDS) {
        for service_id in service_ids.split_whitespace() {
            if let Some(service) = rpt.service.get(&origin_id::make_service_node_id(service_id)) {
                result.push(Parent {
                    id: make_service_id(service_id),
                    label: service
                        .metadata
                        .get(keys::SERVICE_NAME)
                        .unwrap_or(service_id)
                        .to_string(),
                    topology_id: View::PodsByService,
                });
            }
        }
    }

    if let Some(pod_id) = md(keys::POD_ID) {
        if let Some(pod) = rpt.pod.get(&origin_id::make_pod_node_id(pod_id)) {
            result.push(Parent {
                id: make_pod_id(pod_id),
                label: pod.metadata.get(keys::POD_NAME).unwrap_or(pod_id).to_string(),
                topology_id: View::Pods,
            });
        }
    }

    if let Some(container_id) = md(keys::CONTAINER_ID) {
        if let Some(container) = rpt.container.get(&origin_id::make_container_node_id(container_id)) {
            result.push(Parent {
                id: make_container_id(container_id),
                label: container_name(container).unwrap_or_default(),
                topology_id: View::Containers,
            });
        }
    }

    if let Some(image_id) = md(keys::IMAGE_ID) {
        if let Some(image) = rpt
            .container_image
            .get(&origin_id::make_container_image_node_id(image_id))
        {
            result.push(Parent {
                id: make_container_image_id(image_id),
                label: image.metadata.get(keys::IMAGE_NAME).unwrap_or(image_id).to_string(),
                topology_id: View::ContainersByImage,
            });
        }
    }

    result.retain(|p| p.id != n.id);
    result.dedup_by(|a, b| a.id == b.id);
    result
}

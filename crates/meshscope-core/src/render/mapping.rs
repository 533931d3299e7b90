//! Map functions used to assemble the views.
//!
//! Identity maps relabel an origin node into render space. The `x_to_y`
//! maps lift a node into the entity that contains it, producing an
//! unlabelled node that is joined with the identity-mapped container of the
//! same ID. `count_*` maps only rewrite the minor label from a counter.

use std::collections::BTreeSet;

use crate::report::{Networks, id as origin_id, keys};

use super::RenderableNode;
use super::id::{
    THE_INTERNET_ID, THE_INTERNET_MAJOR, UNCONTAINED_ID, UNCONTAINED_MAJOR, make_address_id,
    make_container_id, make_container_image_id, make_endpoint_id, make_host_id, make_pod_id,
    make_process_id, make_process_name_id, make_pseudo_node_id, make_service_id,
};

/// Ports in this range are treated as the client side of a connection.
const EPHEMERAL_PORTS: std::ops::Range<u16> = 32768..65535;

fn host_id(n: &RenderableNode) -> String {
    origin_id::extract_host_id(&n.node)
}

fn has_host(n: &RenderableNode) -> bool {
    n.metadata(keys::HOST_NODE_ID).is_some()
}

fn the_internet(n: &RenderableNode) -> RenderableNode {
    RenderableNode::derived_pseudo(THE_INTERNET_ID, THE_INTERNET_MAJOR, n)
}

// ---------------------------------------------------------------------------
// Endpoints and processes
// ---------------------------------------------------------------------------

/// Endpoints with a host become `endpoint:` nodes. Host-less endpoints are
/// remote traffic and become pseudo nodes: the internet if outside every
/// local network, a per-connection client node on an ephemeral port, or a
/// per-server node otherwise.
pub fn map_endpoint_identity(n: &RenderableNode, local: &Networks) -> Vec<RenderableNode> {
    let (Some(addr), Some(port)) = (n.metadata(keys::ADDR), n.metadata(keys::PORT)) else {
        return vec![];
    };

    if !has_host(n) {
        if local.is_external(addr) {
            return vec![the_internet(n)];
        }
        let ephemeral = port.parse::<u16>().is_ok_and(|p| EPHEMERAL_PORTS.contains(&p));
        if ephemeral {
            if let Some(dst) = n.adjacency().iter().next() {
                let (dst_addr, dst_port) = match origin_id::parse_endpoint_node_id(dst) {
                    Some((_, a, p)) => (a, p),
                    None => (dst.as_str(), ""),
                };
                let id = make_pseudo_node_id(&[addr, dst_addr, dst_port]);
                return vec![RenderableNode::derived_pseudo(id, addr, n)];
            }
        }
        let id = make_pseudo_node_id(&[addr, port]);
        let major = if port.is_empty() {
            addr.to_string()
        } else {
            format!("{addr}:{port}")
        };
        return vec![RenderableNode::derived_pseudo(id, major, n)];
    }

    let host = host_id(n);
    let major = format!("{addr}:{port}");
    let minor = match n.metadata(keys::PID) {
        Some(pid) => format!("{host} ({pid})"),
        None => host.clone(),
    };
    vec![RenderableNode::with_labels(
        make_endpoint_id(&host, addr, port),
        major.clone(),
        minor,
        major,
        n,
    )]
}

/// Endpoints fold into the process owning them. Endpoints with no `pid`
/// are dropped; pseudo nodes pass through.
pub fn map_endpoint_to_process(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    if n.pseudo {
        return vec![n.clone()];
    }
    match n.metadata(keys::PID) {
        Some(pid) => vec![RenderableNode::derived(make_process_id(&host_id(n), pid), n)],
        None => vec![],
    }
}

pub fn map_process_identity(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    let Some(pid) = n.metadata(keys::PID) else {
        return vec![];
    };
    let host = host_id(n);
    let comm = n.metadata(keys::COMM).unwrap_or_default();
    vec![
        RenderableNode::with_labels(make_process_id(&host, pid), comm, format!("{host} ({pid})"), comm, n)
            .with_control_node(n.id.clone()),
    ]
}

/// Processes grouped by command name. Processes without `comm` are dropped.
pub fn map_process_to_name(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    if n.pseudo {
        return vec![n.clone()];
    }
    let Some(name) = n.metadata(keys::COMM) else {
        return vec![];
    };
    let mut out = RenderableNode::derived(make_process_name_id(name), n).with_counter(keys::PROCESSES_COUNTER, 1);
    out.label_major = name.to_string();
    out.rank = name.to_string();
    vec![out]
}

pub fn map_count_processes(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    vec![with_count(n, keys::PROCESSES_COUNTER, "process", "processes")]
}

// ---------------------------------------------------------------------------
// Containers and images
// ---------------------------------------------------------------------------

/// Processes fold into their container. Uncontained processes are grouped
/// into one pseudo node per host. The internet node passes through; other
/// pseudo nodes are dropped.
pub fn map_process_to_container(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    if n.id == THE_INTERNET_ID {
        return vec![n.clone()];
    }
    if n.pseudo {
        return vec![];
    }
    match n.metadata(keys::CONTAINER_ID) {
        Some(container_id) => vec![RenderableNode::derived(make_container_id(container_id), n)],
        None => {
            let host = host_id(n);
            let mut out =
                RenderableNode::derived_pseudo(make_pseudo_node_id(&[UNCONTAINED_ID, host.as_str()]), UNCONTAINED_MAJOR, n);
            out.label_minor = host;
            vec![out]
        }
    }
}

/// Display name for a container: its name without the leading `/`, or a
/// short form of its ID.
pub fn container_name(n: &crate::report::Node) -> Option<String> {
    if let Some(name) = n.metadata.get(keys::CONTAINER_NAME) {
        let name = name.trim_start_matches('/');
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    n.metadata
        .get(keys::CONTAINER_ID)
        .map(|id| id.chars().take(12).collect())
}

pub fn map_container_identity(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    let Some(container_id) = n.metadata(keys::CONTAINER_ID) else {
        return vec![];
    };
    let rank = n
        .metadata(keys::IMAGE_NAME)
        .or_else(|| n.metadata(keys::IMAGE_ID))
        .unwrap_or_default();
    vec![
        RenderableNode::with_labels(
            make_container_id(container_id),
            container_name(&n.node).unwrap_or_default(),
            host_id(n),
            rank,
            n,
        )
        .with_control_node(n.id.clone()),
    ]
}

/// Containers fold into their image. Containers without an image ID are
/// dropped; the internet passes through.
pub fn map_container_to_image(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    if n.id == THE_INTERNET_ID {
        return vec![n.clone()];
    }
    if n.pseudo {
        return vec![];
    }
    match n.metadata(keys::IMAGE_ID) {
        Some(image_id) => vec![
            RenderableNode::derived(make_container_image_id(image_id), n)
                .with_counter(keys::CONTAINERS_COUNTER, 1),
        ],
        None => vec![],
    }
}

pub fn map_container_image_identity(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    let Some(image_id) = n.metadata(keys::IMAGE_ID) else {
        return vec![];
    };
    let name = n.metadata(keys::IMAGE_NAME).unwrap_or(image_id);
    vec![
        RenderableNode::with_labels(make_container_image_id(image_id), name, "", name, n)
            .with_control_node(n.id.clone()),
    ]
}

pub fn map_count_containers(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    vec![with_count(n, keys::CONTAINERS_COUNTER, "container", "containers")]
}

// ---------------------------------------------------------------------------
// Kubernetes
// ---------------------------------------------------------------------------

/// Containers fold into their pod. Containers outside any pod are dropped;
/// pseudo nodes pass through.
pub fn map_container_to_pod(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    if n.pseudo {
        return vec![n.clone()];
    }
    match n.metadata(keys::POD_ID) {
        Some(pod_id) => vec![
            RenderableNode::derived(make_pod_id(pod_id), n).with_counter(keys::CONTAINERS_COUNTER, 1),
        ],
        None => vec![],
    }
}

pub fn map_pod_identity(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    let Some(pod_id) = n.metadata(keys::POD_ID) else {
        return vec![];
    };
    let name = n.metadata(keys::POD_NAME).unwrap_or(pod_id);
    let namespace = n.metadata(keys::NAMESPACE).unwrap_or_default();
    vec![RenderableNode::with_labels(make_pod_id(pod_id), name, namespace, pod_id, n)]
}

/// A pod belongs to every service selecting it. Pods without services are
/// dropped; pseudo nodes pass through.
pub fn map_pod_to_service(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    if n.pseudo {
        return vec![n.clone()];
    }
    let services: BTreeSet<&str> = n
        .metadata(keys::SERVICE_IDS)
        .map(|ids| ids.split_whitespace().collect())
        .unwrap_or_default();
    services
        .into_iter()
        .map(|service_id| {
            RenderableNode::derived(make_service_id(service_id), n).with_counter(keys::PODS_COUNTER, 1)
        })
        .collect()
}

pub fn map_service_identity(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    let Some(service_id) = n.metadata(keys::SERVICE_ID) else {
        return vec![];
    };
    let name = n.metadata(keys::SERVICE_NAME).unwrap_or(service_id);
    let namespace = n.metadata(keys::NAMESPACE).unwrap_or_default();
    vec![RenderableNode::with_labels(
        make_service_id(service_id),
        name,
        namespace,
        service_id,
        n,
    )]
}

pub fn map_count_pods(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    vec![with_count(n, keys::PODS_COUNTER, "pod", "pods")]
}

// ---------------------------------------------------------------------------
// Addresses and hosts
// ---------------------------------------------------------------------------

/// Addresses with a host become `address:` nodes. Host-less addresses
/// become the internet or a pseudo node per (address, destination).
/// Conntracked-only addresses are dropped.
pub fn map_address_identity(n: &RenderableNode, local: &Networks) -> Vec<RenderableNode> {
    let Some(addr) = n.metadata(keys::ADDR) else {
        return vec![];
    };
    let hosted = has_host(n);
    if !hosted && n.metadata(keys::CONNTRACKED).is_some() {
        return vec![];
    }

    if !hosted {
        if local.is_external(addr) {
            return vec![the_internet(n)];
        }
        let id = match n.adjacency().iter().next() {
            Some(dst) => {
                let dst_addr = origin_id::parse_address_node_id(dst)
                    .map(|(_, a)| a)
                    .unwrap_or(dst.as_str());
                make_pseudo_node_id(&[addr, dst_addr])
            }
            None => make_pseudo_node_id(&[addr]),
        };
        return vec![RenderableNode::derived_pseudo(id, addr, n)];
    }

    let host = host_id(n);
    vec![RenderableNode::with_labels(make_address_id(&host, addr), addr, host.clone(), addr, n)]
}

pub fn map_address_to_host(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    if n.pseudo {
        return vec![n.clone()];
    }
    vec![RenderableNode::derived(make_host_id(&host_id(n)), n)]
}

/// Hosts are labelled by hostname split at the first `.`.
pub fn map_host_identity(n: &RenderableNode, _: &Networks) -> Vec<RenderableNode> {
    let host = origin_id::parse_host_node_id(&n.id)
        .map(str::to_string)
        .unwrap_or_else(|| host_id(n));
    let hostname = n.metadata(keys::HOST_NAME).unwrap_or_default();
    let (major, minor) = match hostname.split_once('.') {
        Some((major, minor)) => (major, minor),
        None => (hostname, ""),
    };
    vec![
        RenderableNode::with_labels(make_host_id(&host), major, minor, minor, n)
            .with_control_node(n.id.clone()),
    ]
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn with_count(n: &RenderableNode, key: &str, singular: &str, plural: &str) -> RenderableNode {
    let mut out = n.clone();
    if n.pseudo {
        return out;
    }
    let count = n.node.counter(key);
    out.label_minor = if count == 1 {
        format!("1 {singular}")
    } else {
        format!("{count} {plural}")
    };
    out
}

//! Origin node IDs.
//!
//! Probes key nodes with these IDs. Endpoint, address and process IDs are
//! scoped by the host they were observed on; the remaining kinds carry a
//! `<kind>` tag so IDs never collide across topologies.

use crate::report::Node;
use crate::report::keys;

const SCOPE_DELIM: char = ';';

/// `host;addr;port`
pub fn make_endpoint_node_id(host_id: &str, addr: &str, port: &str) -> String {
    format!("{host_id}{SCOPE_DELIM}{addr}{SCOPE_DELIM}{port}")
}

/// `host;addr`
pub fn make_address_node_id(host_id: &str, addr: &str) -> String {
    format!("{host_id}{SCOPE_DELIM}{addr}")
}

/// `host;pid`
pub fn make_process_node_id(host_id: &str, pid: &str) -> String {
    format!("{host_id}{SCOPE_DELIM}{pid}")
}

pub fn make_container_node_id(container_id: &str) -> String {
    tagged(container_id, "container")
}

pub fn make_container_image_node_id(image_id: &str) -> String {
    tagged(image_id, "container_image")
}

pub fn make_pod_node_id(pod_id: &str) -> String {
    tagged(pod_id, "pod")
}

pub fn make_service_node_id(service_id: &str) -> String {
    tagged(service_id, "service")
}

pub fn make_host_node_id(host_id: &str) -> String {
    tagged(host_id, "host")
}

fn tagged(id: &str, tag: &str) -> String {
    format!("{id}{SCOPE_DELIM}<{tag}>")
}

/// Split an endpoint node ID into `(host, addr, port)`.
pub fn parse_endpoint_node_id(id: &str) -> Option<(&str, &str, &str)> {
    let mut parts = id.splitn(3, SCOPE_DELIM);
    let host = parts.next()?;
    let addr = parts.next()?;
    let port = parts.next()?;
    if port.contains(SCOPE_DELIM) {
        return None;
    }
    Some((host, addr, port))
}

/// Split an address node ID into `(host, addr)`.
pub fn parse_address_node_id(id: &str) -> Option<(&str, &str)> {
    let (host, addr) = id.split_once(SCOPE_DELIM)?;
    if addr.contains(SCOPE_DELIM) {
        return None;
    }
    Some((host, addr))
}

/// Recover the host ID from a host node ID.
pub fn parse_host_node_id(id: &str) -> Option<&str> {
    id.strip_suffix(";<host>")
}

/// Host ID a node was observed on, or `""` if it carries none.
pub fn extract_host_id(node: &Node) -> String {
    node.metadata
        .get(keys::HOST_NODE_ID)
        .and_then(parse_host_node_id)
        .unwrap_or_default()
        .to_string()
}

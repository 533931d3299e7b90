//! Render-space IDs.
//!
//! Built deterministically from stable origin attributes so the same entity
//! lands on the same ID in every render, which diffing relies on.

pub const THE_INTERNET_ID: &str = "theinternet";
pub const THE_INTERNET_MAJOR: &str = "The Internet";
pub const UNCONTAINED_ID: &str = "uncontained";
pub const UNCONTAINED_MAJOR: &str = "Uncontained";

fn make_id(prefix: &str, parts: &[&str]) -> String {
    let mut id = String::from(prefix);
    for part in parts {
        id.push(':');
        id.push_str(part);
    }
    id
}

pub fn make_endpoint_id(host_id: &str, addr: &str, port: &str) -> String {
    make_id("endpoint", &[host_id, addr, port])
}

pub fn make_process_id(host_id: &str, pid: &str) -> String {
    make_id("process", &[host_id, pid])
}

pub fn make_process_name_id(name: &str) -> String {
    make_id("process_name", &[name])
}

pub fn make_address_id(host_id: &str, addr: &str) -> String {
    make_id("address", &[host_id, addr])
}

pub fn make_container_id(container_id: &str) -> String {
    make_id("container", &[container_id])
}

pub fn make_container_image_id(image_id: &str) -> String {
    make_id("container_image", &[image_id])
}

pub fn make_pod_id(pod_id: &str) -> String {
    make_id("pod", &[pod_id])
}

pub fn make_service_id(service_id: &str) -> String {
    make_id("service", &[service_id])
}

pub fn make_host_id(host_id: &str) -> String {
    make_id("host", &[host_id])
}

pub fn make_pseudo_node_id(parts: &[&str]) -> String {
    make_id("pseudo", parts)
}

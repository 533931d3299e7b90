//! Metadata and metric keys shared between probes and the renderer.
//!
//! Node attributes are untyped string maps on the wire. This module is the
//! schema contract: probes write these keys, the renderer and the detail view
//! read them. A key missing from a node is never an error, the field it feeds
//! is simply left out of the output.

// ---------------------------------------------------------------------------
// Common
// ---------------------------------------------------------------------------

/// Origin ID of the host node the entity lives on.
pub const HOST_NODE_ID: &str = "host_node_id";
/// Identifier of the probe that reported the node; used to route controls.
pub const PROBE_ID: &str = "probe_id";

// ---------------------------------------------------------------------------
// Endpoint and address topologies
// ---------------------------------------------------------------------------

pub const ADDR: &str = "addr";
pub const PORT: &str = "port";
/// Set on connections only seen through connection tracking.
pub const CONNTRACKED: &str = "conntracked";

// ---------------------------------------------------------------------------
// Process topology
// ---------------------------------------------------------------------------

pub const PID: &str = "pid";
pub const COMM: &str = "comm";
pub const PPID: &str = "ppid";
pub const CMDLINE: &str = "cmdline";
pub const THREADS: &str = "threads";
pub const CPU_USAGE: &str = "cpu_usage_percent";
pub const MEMORY_USAGE: &str = "memory_usage_bytes";

// ---------------------------------------------------------------------------
// Docker containers and images
// ---------------------------------------------------------------------------

pub const CONTAINER_ID: &str = "docker_container_id";
pub const CONTAINER_NAME: &str = "docker_container_name";
pub const CONTAINER_STATE: &str = "docker_container_state";
pub const CONTAINER_PORTS: &str = "docker_container_ports";
pub const CONTAINER_CREATED: &str = "docker_container_created";
pub const CONTAINER_COMMAND: &str = "docker_container_command";
pub const IMAGE_ID: &str = "docker_image_id";
pub const IMAGE_NAME: &str = "docker_image_name";
/// Prefix for docker labels, e.g. `docker_label_maintainer`.
pub const LABEL_PREFIX: &str = "docker_label_";
pub const CPU_TOTAL_USAGE: &str = "docker_cpu_total_usage";
pub const CONTAINER_MEMORY_USAGE: &str = "docker_memory_usage";

// ---------------------------------------------------------------------------
// Hosts
// ---------------------------------------------------------------------------

pub const HOST_NAME: &str = "host_name";
pub const OS: &str = "os";
pub const KERNEL_VERSION: &str = "kernel_version";
pub const UPTIME: &str = "uptime";
/// Whitespace separated CIDRs the host considers local, e.g. `10.0.0.0/8`.
pub const LOCAL_NETWORKS: &str = "local_networks";
pub const HOST_CPU_USAGE: &str = "host_cpu_usage_percent";
pub const HOST_MEM_USAGE: &str = "host_mem_usage_percent";
pub const LOAD1: &str = "load1";
pub const LOAD5: &str = "load5";
pub const LOAD15: &str = "load15";

// ---------------------------------------------------------------------------
// Kubernetes
// ---------------------------------------------------------------------------

/// Pod identifier, `namespace/name`. Also carried by containers in the pod.
pub const POD_ID: &str = "kubernetes_pod_id";
pub const POD_NAME: &str = "kubernetes_pod_name";
pub const NAMESPACE: &str = "kubernetes_namespace";
pub const POD_CREATED: &str = "kubernetes_pod_created";
/// Whitespace separated service IDs selecting a pod.
pub const SERVICE_IDS: &str = "kubernetes_service_ids";
pub const SERVICE_ID: &str = "kubernetes_service_id";
pub const SERVICE_NAME: &str = "kubernetes_service_name";

// ---------------------------------------------------------------------------
// Overlay network
// ---------------------------------------------------------------------------

pub const WEAVE_MAC_ADDRESS: &str = "weave_mac_address";
pub const WEAVE_DNS_HOSTNAME: &str = "weave_dns_hostname";

// ---------------------------------------------------------------------------
// Render-time counters
// ---------------------------------------------------------------------------

pub const PROCESSES_COUNTER: &str = "processes";
pub const CONTAINERS_COUNTER: &str = "containers";
pub const PODS_COUNTER: &str = "pods";

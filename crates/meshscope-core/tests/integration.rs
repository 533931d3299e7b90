//! Integration tests for meshscope-core.
//!
//! These tests drive the full pipeline on a small two-host deployment:
//! report → store → view render → prune → diff.

use meshscope_core::report::{Topology, id, keys};
use meshscope_core::{Diff, EdgeMetadata, Node, RenderableNodes, Report, Store, TopologyKind, View};

const CLIENT_IP: &str = "10.10.10.20";
const SERVER_IP: &str = "192.168.1.1";
const LOCAL_NETWORKS: &str = "10.10.10.0/24 192.168.1.0/24";

fn egress(packets: u64) -> EdgeMetadata {
    EdgeMetadata {
        egress_packet_count: Some(packets),
        egress_byte_count: Some(packets * 10),
        ..Default::default()
    }
}

fn server80() -> String {
    id::make_endpoint_node_id("server", SERVER_IP, "80")
}

fn client_endpoint(port: &str, pid: &str, packets: u64) -> Node {
    Node::new(id::make_endpoint_node_id("client", CLIENT_IP, port))
        .with_metadata([
            (keys::ADDR, CLIENT_IP.to_string()),
            (keys::PORT, port.to_string()),
            (keys::PID, pid.to_string()),
            (keys::HOST_NODE_ID, id::make_host_node_id("client")),
        ])
        .with_adjacent(server80())
        .with_edge(server80(), egress(packets))
}

fn remote_endpoint(addr: &str, port: &str, packets: u64) -> Node {
    Node::new(id::make_endpoint_node_id("", addr, port))
        .with_metadata([(keys::ADDR, addr), (keys::PORT, port)])
        .with_adjacent(server80())
        .with_edge(server80(), egress(packets))
}

fn process(host: &str, pid: &str, comm: &str) -> Node {
    Node::new(id::make_process_node_id(host, pid)).with_metadata([
        (keys::PID, pid.to_string()),
        (keys::COMM, comm.to_string()),
        (keys::HOST_NODE_ID, id::make_host_node_id(host)),
    ])
}

fn host(name: &str) -> Node {
    Node::new(id::make_host_node_id(name)).with_metadata([
        (keys::HOST_NAME, format!("{name}.example.com")),
        (keys::LOCAL_NETWORKS, LOCAL_NETWORKS.to_string()),
    ])
}

/// Two curl processes on `client` talk to apache on `server`. Two unknown
/// local clients and two internet clients also talk to apache.
fn fixture() -> Report {
    let mut rpt = Report::new();
    rpt.endpoint = Topology::new()
        .with_node(client_endpoint("54001", "10001", 10))
        .with_node(client_endpoint("54002", "10002", 20))
        .with_node(
            Node::new(server80()).with_metadata([
                (keys::ADDR, SERVER_IP.to_string()),
                (keys::PORT, "80".to_string()),
                (keys::PID, "215".to_string()),
                (keys::HOST_NODE_ID, id::make_host_node_id("server")),
            ]),
        )
        .with_node(remote_endpoint("10.10.10.10", "54010", 30))
        .with_node(remote_endpoint("10.10.10.10", "54020", 40))
        .with_node(remote_endpoint("51.52.53.54", "12345", 60))
        .with_node(remote_endpoint("8.8.8.8", "40000", 70));
    rpt.process = Topology::new()
        .with_node(
            process("client", "10001", "curl")
                .with_metadata([(keys::CONTAINER_ID, "c1")]),
        )
        .with_node(
            process("client", "10002", "curl")
                .with_metadata([(keys::CONTAINER_ID, "c1")]),
        )
        .with_node(process("server", "215", "apache"));
    rpt.container = Topology::new().with_node(
        Node::new(id::make_container_node_id("c1")).with_metadata([
            (keys::CONTAINER_ID, "c1".to_string()),
            (keys::CONTAINER_NAME, "/client".to_string()),
            (keys::IMAGE_ID, "curlimg".to_string()),
            (keys::HOST_NODE_ID, id::make_host_node_id("client")),
        ]),
    );
    rpt.container_image = Topology::new().with_node(
        Node::new(id::make_container_image_node_id("curlimg"))
            .with_metadata([(keys::IMAGE_ID, "curlimg"), (keys::IMAGE_NAME, "curlimages/curl")]),
    );
    rpt.host = Topology::new().with_node(host("client")).with_node(host("server"));
    rpt
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[test]
fn process_names_sum_counters_and_share_one_internet_node() {
    let graph = View::ApplicationsByName.render(&fixture()).prune();

    let curl = graph.get("process_name:curl").expect("curl node");
    assert_eq!(curl.label_major, "curl");
    assert_eq!(curl.label_minor, "2 processes");
    assert_eq!(curl.edge_metadata.egress_packet_count, Some(30));
    assert_eq!(curl.edge_metadata.egress_byte_count, Some(300));
    assert!(curl.node.adjacency.contains("process_name:apache"));

    let apache = graph.get("process_name:apache").expect("apache node");
    assert_eq!(apache.label_minor, "1 process");
    assert_eq!(apache.edge_metadata.ingress_packet_count, Some(230));
    assert!(apache.node.adjacency.is_empty());

    let internet: Vec<_> = graph.values().filter(|n| n.id == "theinternet").collect();
    assert_eq!(internet.len(), 1);
    assert!(internet[0].pseudo);
    assert_eq!(internet[0].children.len(), 2);
    assert_eq!(internet[0].edge_metadata.egress_packet_count, Some(130));
    assert!(internet[0].node.adjacency.contains("process_name:apache"));

    let unknown = graph
        .get("pseudo:10.10.10.10:192.168.1.1:80")
        .expect("unknown client node");
    assert_eq!(unknown.children.len(), 2);
    assert_eq!(unknown.edge_metadata.egress_packet_count, Some(70));

    assert_eq!(graph.len(), 4);
}

#[test]
fn applications_partition_every_process() {
    let rpt = fixture();
    let graph = View::Applications.render(&rpt);
    for origin in rpt.process.nodes.keys() {
        let holders = graph.values().filter(|n| n.children.contains(origin)).count();
        assert_eq!(holders, 1, "{origin} held by {holders} nodes");
    }
    let client = graph.get("process:client:10001").unwrap();
    assert_eq!(client.control_node.as_deref(), Some("client;10001"));
    assert!(client.parents.contains("host:client"));
    assert!(client.parents.contains("container:c1"));
}

#[test]
fn containers_group_uncontained_processes_per_host() {
    let graph = View::Containers.render(&fixture()).prune();
    let ids: Vec<_> = graph.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["container:c1", "pseudo:uncontained:server", "theinternet"]
    );

    let client = graph.get("container:c1").unwrap();
    assert_eq!(client.label_major, "client");
    assert_eq!(client.rank, "curlimg");
    assert!(client.node.adjacency.contains("pseudo:uncontained:server"));

    let uncontained = graph.get("pseudo:uncontained:server").unwrap();
    assert!(uncontained.pseudo);
    assert_eq!(uncontained.label_minor, "server");
}

#[test]
fn container_images_count_containers() {
    let graph = View::ContainersByImage.render(&fixture()).prune();
    let image = graph.get("container_image:curlimg").unwrap();
    assert_eq!(image.label_major, "curlimages/curl");
    assert_eq!(image.label_minor, "1 container");
    assert_eq!(image.edge_metadata.egress_packet_count, Some(30));
    assert!(graph.contains("theinternet"));
    assert!(!graph.contains("pseudo:uncontained:server"));
}

#[test]
fn containers_without_an_image_are_left_out_of_images() {
    let mut rpt = fixture();
    let bare = id::make_container_node_id("c2");
    rpt.container
        .add_node(Node::new(bare.clone()).with_metadata([(keys::CONTAINER_ID, "c2")]));

    let holders = |view: View| {
        let graph = view.render(&rpt);
        graph.values().filter(|n| n.children.contains(&bare)).count()
    };
    assert_eq!(holders(View::Containers), 1);
    assert_eq!(holders(View::ContainersByImage), 0);
}

#[test]
fn hosts_render_from_host_topology() {
    let graph = View::Hosts.render(&fixture());
    let server = graph.get("host:server").unwrap();
    assert_eq!(server.label_major, "server");
    assert_eq!(server.label_minor, "example.com");
    assert_eq!(
        server.origin.as_ref().map(|o| o.topology),
        Some(TopologyKind::Host)
    );
}

#[test]
fn detail_view_resolves_children_and_parents() {
    let rpt = fixture();
    let graph = View::Containers.render(&rpt);
    let detail = meshscope_core::DetailedNode::make(&rpt, graph.get("container:c1").unwrap());
    assert_eq!(detail.label, "client");
    let apps = detail
        .children
        .iter()
        .find(|g| g.label == "Applications")
        .expect("applications group");
    assert_eq!(apps.nodes.len(), 2);
    let parents: Vec<_> = detail.parents.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(parents, vec!["host:client", "container_image:curlimg"]);
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[test]
fn duplicate_submission_changes_nothing() {
    let store = Store::new();
    let bytes = fixture().to_vec().unwrap();

    store.submit(&Report::from_slice(&bytes).unwrap());
    let once = store.report();
    let rendered_once: Vec<RenderableNodes> = View::ALL.iter().map(|v| v.render(&once).prune()).collect();

    store.submit(&Report::from_slice(&bytes).unwrap());
    let twice = store.report();
    assert_eq!(*once, *twice);
    for (view, before) in View::ALL.iter().zip(rendered_once) {
        assert_eq!(view.render(&twice).prune(), before, "{view}");
    }
}

#[test]
fn second_submission_diffs_only_changed_nodes() {
    let store = Store::new();
    store.submit(&fixture());
    let first = View::ApplicationsByName.render(&store.report()).prune();
    let initial = Diff::between(&RenderableNodes::new(), &first);
    assert_eq!(initial.add.len(), first.len());

    let mut more = Report::new();
    more.endpoint.add_node(client_endpoint("54001", "10001", 15));
    store.submit(&more);
    let second = View::ApplicationsByName.render(&store.report()).prune();

    let diff = Diff::between(&first, &second);
    let updated: Vec<_> = diff.update.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(updated, vec!["process_name:apache", "process_name:curl"]);
    assert!(diff.add.is_empty() && diff.remove.is_empty());
    assert_eq!(first.apply(&diff), second);
}

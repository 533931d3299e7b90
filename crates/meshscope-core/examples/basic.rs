//! Merge two probes' reports and render the processes view.
//!
//! Run: `cargo run --example basic`

use meshscope_core::{EdgeMetadata, Node, Report, Store, View};

fn probe(host: &str, pid: &str, comm: &str, (addr, port): (&str, &str), (peer, peer_port): (&str, &str)) -> Report {
    let host_node_id = format!("{host};<host>");
    let mut rpt = Report::new();
    rpt.host.add_node(
        Node::new(host_node_id.clone()).with_metadata([("host_name", host), ("local_networks", "10.0.0.0/8")]),
    );
    rpt.process.add_node(Node::new(format!("{host};{pid}")).with_metadata([
        ("pid", pid),
        ("comm", comm),
        ("host_node_id", host_node_id.as_str()),
    ]));

    let src = format!(";{addr};{port}");
    let dst = format!(";{peer};{peer_port}");
    let em = EdgeMetadata {
        egress_packet_count: Some(12),
        egress_byte_count: Some(4096),
        ..Default::default()
    };
    rpt.endpoint.add_node(
        Node::new(src)
            .with_metadata([
                ("addr", addr),
                ("port", port),
                ("pid", pid),
                ("host_node_id", host_node_id.as_str()),
            ])
            .with_adjacent(dst.clone())
            .with_edge(dst, em),
    );
    rpt
}

fn main() {
    let store = Store::new();
    store.submit(&probe("web", "310", "nginx", ("10.0.0.1", "40312"), ("10.0.0.2", "5432")));
    store.submit(&probe("db", "77", "postgres", ("10.0.0.2", "5432"), ("10.0.0.1", "40312")));

    let rpt = store.report();
    println!("Merged report: {} nodes", rpt.node_count());

    for view in View::ALL {
        let nodes = view.render(&rpt).prune();
        println!("\n{} ({} nodes)", view.label(), nodes.len());
        for node in nodes.values() {
            let adjacent: Vec<&str> = node.adjacency().iter().map(String::as_str).collect();
            println!("  {:<36} {:<12} -> {}", node.id, node.label_major, adjacent.join(", "));
        }
    }
}

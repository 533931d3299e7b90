//! Algebraic laws of merging, pruning and diffing, checked on generated
//! reports.

use chrono::{DateTime, TimeZone, Utc};
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;
use proptest::sample::select;

use meshscope_core::report::{Sample, id, keys};
use std::collections::BTreeSet;

use meshscope_core::{Diff, EdgeMetadata, Metric, Node, NodeControls, Report, View};

const HOSTS: [&str; 2] = ["alpha", "beta"];
const ADDRS: [&str; 3] = ["10.0.0.1", "10.0.0.2", "8.8.8.8"];
const PORTS: [&str; 2] = ["80", "54001"];

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn host_name(i: Option<usize>) -> &'static str {
    i.map(|i| HOSTS[i]).unwrap_or("")
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_edge() -> impl Strategy<Value = EdgeMetadata> {
    (
        option::of(0u64..100),
        option::of(0u64..100),
        option::of(0u64..100),
    )
        .prop_map(|(egress, ingress, conns)| EdgeMetadata {
            egress_packet_count: egress,
            ingress_byte_count: ingress,
            max_conn_count_tcp: conns,
            ..Default::default()
        })
}

prop_compose! {
    /// An arbitrary node exercising every field.
    fn arb_node()(
        node_id in select(vec!["a", "b", "c"]),
        metadata in vec((select(vec!["k1", "k2"]), select(vec!["x", "y", "z"]), 0i64..4), 0..4),
        samples in vec((0i64..6, -5i32..5), 0..5),
        adjacency in vec(select(vec!["a", "b", "c"]), 0..3),
        controls in (0i64..3, vec(select(vec!["stop", "start"]), 0..2)),
        edges in vec((select(vec!["a", "b"]), arb_edge()), 0..3),
        counters in vec((select(vec!["pods", "containers"]), 0u64..5), 0..2),
    ) -> Node {
        let mut n = Node::new(node_id);
        for (k, v, t) in metadata {
            n = n.with_metadata_at(at(t), [(k, v)]);
        }
        if !samples.is_empty() {
            let samples = samples.into_iter().map(|(t, v)| Sample {
                timestamp: at(t),
                value: f64::from(v),
            });
            n = n.with_metric("cpu", Metric::from_samples(samples));
        }
        n = n
            .with_adjacency(adjacency)
            .with_controls(NodeControls::new(at(controls.0), controls.1));
        for (dst, em) in edges {
            n = n.with_edge(dst, em);
        }
        for (k, v) in counters {
            n = n.with_counter(k, v);
        }
        n
    }
}

prop_compose! {
    fn arb_endpoint()(
        host in option::of(0..2usize),
        addr in 0..3usize,
        port in 0..2usize,
        pid in option::of(0..3u8),
        dst in (option::of(0..2usize), 0..3usize, 0..2usize),
        egress in 0..50u64,
    ) -> Node {
        let mut n = Node::new(id::make_endpoint_node_id(host_name(host), ADDRS[addr], PORTS[port]))
            .with_metadata([(keys::ADDR, ADDRS[addr]), (keys::PORT, PORTS[port])]);
        if let Some(i) = host {
            n = n.with_metadata([(keys::HOST_NODE_ID, id::make_host_node_id(HOSTS[i]))]);
        }
        if let Some(pid) = pid {
            n = n.with_metadata([(keys::PID, pid.to_string())]);
        }
        let target = id::make_endpoint_node_id(host_name(dst.0), ADDRS[dst.1], PORTS[dst.2]);
        n.with_adjacent(target.clone()).with_edge(
            target,
            EdgeMetadata {
                egress_packet_count: Some(egress),
                ..Default::default()
            },
        )
    }
}

prop_compose! {
    fn arb_process()(
        host in 0..2usize,
        pid in 0..3u8,
        comm in select(vec!["curl", "nginx"]),
        container in option::of(0..2u8),
    ) -> Node {
        let mut n = Node::new(id::make_process_node_id(HOSTS[host], &pid.to_string())).with_metadata([
            (keys::PID, pid.to_string()),
            (keys::COMM, comm.to_string()),
            (keys::HOST_NODE_ID, id::make_host_node_id(HOSTS[host])),
        ]);
        if let Some(c) = container {
            n = n.with_metadata([(keys::CONTAINER_ID, format!("c{c}"))]);
        }
        n
    }
}

prop_compose! {
    fn arb_container()(
        c in 0..2u8,
        image in option::of(0..2u8),
        pod in option::of(0..2u8),
    ) -> Node {
        let cid = format!("c{c}");
        let mut n = Node::new(id::make_container_node_id(&cid))
            .with_metadata([(keys::CONTAINER_ID, cid.clone())]);
        if let Some(i) = image {
            n = n.with_metadata([(keys::IMAGE_ID, format!("img{i}"))]);
        }
        if let Some(p) = pod {
            n = n.with_metadata([(keys::POD_ID, format!("p{p}"))]);
        }
        n
    }
}

prop_compose! {
    fn arb_pod()(p in 0..2u8, services in vec(select(vec!["s0", "s1"]), 0..3)) -> Node {
        let pod_id = format!("p{p}");
        let mut n = Node::new(id::make_pod_node_id(&pod_id))
            .with_metadata([(keys::POD_ID, pod_id.clone())]);
        if !services.is_empty() {
            n = n.with_metadata([(keys::SERVICE_IDS, services.join(" "))]);
        }
        n
    }
}

prop_compose! {
    /// A report that renders into something non-trivial in every
    /// process-based view, plus arbitrary overlay nodes.
    fn arb_report()(
        endpoints in vec(arb_endpoint(), 0..6),
        processes in vec(arb_process(), 0..4),
        containers in vec(arb_container(), 0..3),
        pods in vec(arb_pod(), 0..3),
        overlay in vec(arb_node(), 0..3),
    ) -> Report {
        let mut rpt = Report::new();
        for n in endpoints {
            rpt.endpoint.add_node(n);
        }
        for n in processes {
            rpt.process.add_node(n);
        }
        for n in containers {
            rpt.container.add_node(n);
        }
        for n in pods {
            rpt.pod.add_node(n);
        }
        for s in ["s0", "s1"] {
            rpt.service.add_node(
                Node::new(id::make_service_node_id(s)).with_metadata([(keys::SERVICE_ID, s)]),
            );
        }
        for n in overlay {
            rpt.overlay.add_node(n);
        }
        for h in HOSTS {
            rpt.host.add_node(
                Node::new(id::make_host_node_id(h))
                    .with_metadata([(keys::HOST_NAME, h), (keys::LOCAL_NETWORKS, "10.0.0.0/8")]),
            );
        }
        rpt
    }
}

/// For every view, how many of its nodes must hold each origin node among
/// their children. Zero marks an excluded origin.
fn expected_memberships(rpt: &Report) -> Vec<(View, String, usize)> {
    let has = |n: &Node, key: &str| usize::from(n.metadata.get(key).is_some());
    let mut out = vec![];
    for origin in rpt.process.nodes.keys() {
        out.push((View::Applications, origin.clone(), 1));
        out.push((View::ApplicationsByName, origin.clone(), 1));
        out.push((View::Containers, origin.clone(), 1));
    }
    for (origin, n) in &rpt.container.nodes {
        out.push((View::Containers, origin.clone(), 1));
        out.push((View::ContainersByImage, origin.clone(), has(n, keys::IMAGE_ID)));
        out.push((View::Pods, origin.clone(), has(n, keys::POD_ID)));
    }
    for (origin, n) in &rpt.pod.nodes {
        let services: BTreeSet<&str> = n
            .metadata
            .get(keys::SERVICE_IDS)
            .map(|ids| ids.split_whitespace().collect())
            .unwrap_or_default();
        out.push((View::Pods, origin.clone(), 1));
        out.push((View::PodsByService, origin.clone(), services.len()));
    }
    for origin in rpt.service.nodes.keys() {
        out.push((View::PodsByService, origin.clone(), 1));
    }
    for origin in rpt.host.nodes.keys() {
        out.push((View::Hosts, origin.clone(), 1));
    }
    out
}

// ---------------------------------------------------------------------------
// Merge laws
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn node_merge_is_commutative(a in arb_node(), b in arb_node()) {
        prop_assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn node_merge_is_associative(a in arb_node(), b in arb_node(), c in arb_node()) {
        prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn node_merge_is_idempotent(a in arb_node(), b in arb_node()) {
        prop_assert_eq!(a.merge(&a), a.clone());
        let ab = a.merge(&b);
        prop_assert_eq!(ab.merge(&b), ab);
    }

    #[test]
    fn report_merge_is_commutative(a in arb_report(), b in arb_report()) {
        prop_assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn report_merge_is_associative(a in arb_report(), b in arb_report(), c in arb_report()) {
        prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn report_merge_is_idempotent(a in arb_report()) {
        prop_assert_eq!(a.merge(&a), a.clone());
        prop_assert_eq!(a.merge(&Report::new()), a);
    }

    #[test]
    fn report_survives_the_wire(a in arb_report()) {
        let bytes = a.to_vec().unwrap();
        prop_assert_eq!(Report::from_slice(&bytes).unwrap(), a);
    }
}

// ---------------------------------------------------------------------------
// Rendering laws
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn rendering_depends_only_on_the_merged_report(
        a in arb_report(),
        b in arb_report(),
        view in select(View::ALL.to_vec()),
    ) {
        prop_assert_eq!(view.render(&a.merge(&b)), view.render(&b.merge(&a)));
    }

    #[test]
    fn prune_is_idempotent(a in arb_report(), view in select(View::ALL.to_vec())) {
        let pruned = view.render(&a).prune();
        prop_assert_eq!(pruned.prune(), pruned);
    }

    #[test]
    fn diff_replays_to_the_next_snapshot(
        a in arb_report(),
        b in arb_report(),
        view in select(View::ALL.to_vec()),
    ) {
        let prev = view.render(&a).prune();
        let next = view.render(&a.merge(&b)).prune();
        let diff = Diff::between(&prev, &next);
        prop_assert_eq!(prev.apply(&diff), next.clone());
        prop_assert!(Diff::between(&next, &next).is_empty());
    }

    #[test]
    fn every_process_is_in_exactly_one_application(a in arb_report()) {
        let graph = View::Applications.render(&a);
        for origin in a.process.nodes.keys() {
            let holders = graph.values().filter(|n| n.children.contains(origin)).count();
            prop_assert_eq!(holders, 1);
        }
    }

    #[test]
    fn every_view_partitions_its_sources(a in arb_report()) {
        let graphs: Vec<_> = View::ALL.into_iter().map(|v| (v, v.render(&a))).collect();
        for (view, origin, expected) in expected_memberships(&a) {
            let Some((_, graph)) = graphs.iter().find(|(v, _)| *v == view) else {
                continue;
            };
            let holders = graph.values().filter(|n| n.children.contains(&origin)).count();
            prop_assert_eq!(holders, expected, "{} in {}", origin, view);
        }
    }

    #[test]
    fn no_edge_points_outside_the_graph(a in arb_report(), view in select(View::ALL.to_vec())) {
        let graph = view.render(&a);
        for n in graph.values() {
            for dst in &n.node.adjacency {
                prop_assert!(graph.contains(dst), "{} -> {}", n.id, dst);
            }
        }
    }
}

//! `meshscope topologies`: every view with its node and edge counts.

use meshscope_core::{Report, View};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ViewStats {
    name: &'static str,
    label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<&'static str>,
    node_count: usize,
    nonpseudo_node_count: usize,
    edge_count: usize,
}

fn stats(rpt: &Report) -> Vec<ViewStats> {
    View::ALL
        .into_iter()
        .map(|view| {
            let nodes = view.render(rpt).prune();
            ViewStats {
                name: view.name(),
                label: view.label(),
                parent: view.parent().map(View::name),
                node_count: nodes.len(),
                nonpseudo_node_count: nodes.values().filter(|n| !n.pseudo).count(),
                edge_count: nodes.values().map(|n| n.adjacency().len()).sum(),
            }
        })
        .collect()
}

pub fn run(reports: &[String], json: bool) {
    let rpt = super::or_exit(super::load_reports(reports));
    let rows = stats(&rpt);
    if json {
        super::or_exit(super::write_json(&rows, None));
        return;
    }

    println!(
        "{:<22} {:<20} {:>7} {:>8} {:>7}",
        "View", "Label", "Nodes", "Pseudo", "Edges"
    );
    println!("{}", "-".repeat(68));
    for row in &rows {
        let name = match row.parent {
            Some(_) => format!("  {}", row.name),
            None => row.name.to_string(),
        };
        println!(
            "{:<22} {:<20} {:>7} {:>8} {:>7}",
            name,
            row.label,
            row.node_count,
            row.node_count - row.nonpseudo_node_count,
            row.edge_count
        );
    }
}

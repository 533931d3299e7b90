//! `meshscope detail`: the detail view of one rendered node.

use meshscope_core::{DetailedNode, Report, View};

fn detail(view: View, id: &str, rpt: &Report) -> Result<DetailedNode, String> {
    // Unpruned, so the node's edges to other views still resolve.
    let nodes = view.render(rpt);
    let node = nodes
        .get(id)
        .ok_or_else(|| format!("no node {id} in the {view} view"))?;
    Ok(DetailedNode::make(rpt, node))
}

pub fn run(view: &str, id: &str, reports: &[String], output: Option<&str>) {
    let view = super::or_exit(super::parse_view(view));
    let rpt = super::or_exit(super::load_reports(reports));
    let node = super::or_exit(detail(view, id, &rpt));
    super::or_exit(super::write_json(&node, output));
}

//! `meshscope render`: render a view of report files.

use meshscope_core::{Report, RenderableNodes, View};
use serde::Serialize;

#[derive(Serialize)]
struct Rendered {
    view: &'static str,
    nodes: RenderableNodes,
}

fn render(view: View, rpt: &Report, unpruned: bool) -> RenderableNodes {
    let nodes = view.render(rpt);
    if unpruned { nodes } else { nodes.prune() }
}

pub fn run(view: &str, reports: &[String], unpruned: bool, output: Option<&str>) {
    let view = super::or_exit(super::parse_view(view));
    let rpt = super::or_exit(super::load_reports(reports));
    let nodes = render(view, &rpt, unpruned);
    log::info!("{view}: {} nodes from {} reports", nodes.len(), reports.len());
    super::or_exit(super::write_json(
        &Rendered {
            view: view.name(),
            nodes,
        },
        output,
    ));
}

//! `meshscope diff`: the message a streaming client would receive when the
//! merged state moves from one set of reports to another.

use meshscope_core::{Diff, Report, View};

fn diff(view: View, before: &Report, after: &Report) -> Diff {
    let prev = view.render(before).prune();
    let next = view.render(after).prune();
    Diff::between(&prev, &next)
}

pub fn run(view: &str, before: &[String], after: &[String], output: Option<&str>) {
    let view = super::or_exit(super::parse_view(view));
    let before = super::or_exit(super::load_reports(before));
    let after = super::or_exit(super::load_reports(after));
    let d = diff(view, &before, &after);
    log::info!(
        "{view}: {} added, {} updated, {} removed",
        d.add.len(),
        d.update.len(),
        d.remove.len()
    );
    super::or_exit(super::write_json(&d, output));
}

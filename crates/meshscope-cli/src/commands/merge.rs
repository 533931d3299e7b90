//! `meshscope merge`: combine report files into one.

pub fn run(reports: &[String], output: Option<&str>) {
    let merged = super::or_exit(super::load_reports(reports));
    log::info!("merged {} reports, {} nodes", reports.len(), merged.node_count());
    super::or_exit(super::write_json(&merged, output));
}

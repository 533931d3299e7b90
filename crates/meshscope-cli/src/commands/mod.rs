pub mod detail;
pub mod diff;
pub mod merge;
pub mod render;
pub mod serve;
pub mod topologies;

use std::fs::File;
use std::io::Write;

use meshscope_core::{Report, View};
use serde::Serialize;

/// Read and merge report files. Gzip-compressed files are detected by their
/// magic bytes.
pub fn load_reports(paths: &[String]) -> Result<Report, String> {
    let mut merged = Report::new();
    for path in paths {
        let file = File::open(path).map_err(|e| format!("{path}: {e}"))?;
        let rpt = Report::from_reader(file).map_err(|e| format!("{path}: {e}"))?;
        log::debug!("loaded {path}");
        merged = merged.merge(&rpt);
    }
    Ok(merged)
}

/// Look up a view by name, listing the valid names on failure.
pub fn parse_view(name: &str) -> Result<View, String> {
    name.parse().map_err(|e| {
        let names: Vec<&str> = View::ALL.iter().map(|v| v.name()).collect();
        format!("{e} (expected one of: {})", names.join(", "))
    })
}

/// Pretty-print `value` as JSON to `output`, or to stdout when `None`.
pub fn write_json<T: Serialize>(value: &T, output: Option<&str>) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    match output {
        Some(path) => {
            let mut file = File::create(path).map_err(|e| format!("{path}: {e}"))?;
            writeln!(file, "{json}").map_err(|e| format!("{path}: {e}"))?;
            log::info!("wrote {path}");
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Unwrap a command step or exit with its error.
pub fn or_exit<T>(result: Result<T, String>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshscope_core::Node;

    fn write_report(dir: &tempfile::TempDir, name: &str, rpt: &Report) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, rpt.to_vec().unwrap()).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn process(id: &str, comm: &str) -> Report {
        let mut rpt = Report::new();
        rpt.process
            .add_node(Node::new(id).with_metadata([("pid", "1"), ("comm", comm)]));
        rpt
    }

    // -----------------------------------------------------------------------
    // load_reports
    // -----------------------------------------------------------------------

    #[test]
    fn load_merges_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_report(&dir, "a.json", &process("h1;1", "nginx"));
        let b = write_report(&dir, "b.json", &process("h2;1", "redis"));
        let merged = load_reports(&[a, b]).unwrap();
        assert_eq!(merged.process.nodes.len(), 2);
    }

    #[test]
    fn load_reads_gzip() {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.json.gz");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&process("h1;1", "nginx").to_vec().unwrap()).unwrap();
        std::fs::write(&path, enc.finish().unwrap()).unwrap();

        let merged = load_reports(&[path.to_string_lossy().into_owned()]).unwrap();
        assert!(merged.process.nodes.contains_key("h1;1"));
    }

    #[test]
    fn load_reports_name_the_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();
        let path = path.to_string_lossy().into_owned();
        let err = load_reports(std::slice::from_ref(&path)).unwrap_err();
        assert!(err.starts_with(&path));

        let missing = dir.path().join("missing.json").to_string_lossy().into_owned();
        assert!(load_reports(&[missing]).is_err());
    }

    #[test]
    fn load_nothing_is_empty() {
        assert_eq!(load_reports(&[]).unwrap(), Report::new());
    }

    // -----------------------------------------------------------------------
    // parse_view
    // -----------------------------------------------------------------------

    #[test]
    fn parse_known_views() {
        for view in View::ALL {
            assert_eq!(parse_view(view.name()).unwrap(), view);
        }
    }

    #[test]
    fn parse_unknown_view_lists_choices() {
        let err = parse_view("galaxies").unwrap_err();
        assert!(err.contains("galaxies"));
        assert!(err.contains("applications"));
    }

    // -----------------------------------------------------------------------
    // write_json
    // -----------------------------------------------------------------------

    #[test]
    fn write_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let path_str = path.to_string_lossy().into_owned();
        write_json(&serde_json::json!({"nodes": 3}), Some(&path_str)).unwrap();
        let back: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back["nodes"], 3);
    }

    #[test]
    fn write_json_to_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/out.json");
        assert!(write_json(&1, Some(&path.to_string_lossy())).is_err());
    }
}

//! `meshscope serve`: run the app server.

use std::sync::Arc;
use std::time::Duration;

use meshscope_core::Store;
use meshscope_server::{AppState, ServerConfig, StreamConfig};

pub struct ServeCommandConfig<'a> {
    pub host: String,
    pub port: u16,
    pub interval: &'a str,
    pub write_timeout: &'a str,
    pub max_report_mb: usize,
    pub seed: &'a [String],
}

/// Parse a human duration such as `1s` or `250ms`, rejecting zero.
pub fn parse_duration(flag: &str, value: &str) -> Result<Duration, String> {
    let d = humantime::parse_duration(value).map_err(|e| format!("--{flag} {value}: {e}"))?;
    if d.is_zero() {
        return Err(format!("--{flag} must be greater than zero"));
    }
    Ok(d)
}

fn build_config(cfg: &ServeCommandConfig<'_>) -> Result<ServerConfig, String> {
    Ok(ServerConfig {
        host: cfg.host.clone(),
        port: cfg.port,
        max_report_bytes: cfg.max_report_mb.saturating_mul(1024 * 1024),
        stream: StreamConfig {
            interval: parse_duration("interval", cfg.interval)?,
            write_timeout: parse_duration("write-timeout", cfg.write_timeout)?,
        },
        ..ServerConfig::default()
    })
}

pub fn run(cfg: ServeCommandConfig<'_>) {
    let config = super::or_exit(build_config(&cfg));
    let seeded = super::or_exit(super::load_reports(cfg.seed));
    let store = Arc::new(Store::with_report(seeded));
    let state = AppState::with_store(config, store);

    let base = format!("http://{}", state.config.addr());
    println!("meshscope v{}", meshscope_core::VERSION);
    println!("   {base}");
    if !cfg.seed.is_empty() {
        println!("   seeded from {} report files", cfg.seed.len());
    }
    println!();
    println!("   Endpoints:");
    println!("     GET    /                                  API index");
    println!("     GET    /health                            Store and connection counts");
    println!("     POST   /api/report                        Submit a probe report (JSON, gzip ok)");
    println!("     GET    /api/report                        The merged report");
    println!("     GET    /api/topology                      Views with node and edge counts");
    println!("     GET    /api/topology/{{view}}               Rendered view");
    println!("     GET    /api/topology/{{view}}/ws?t=1s       Stream of diffs (websocket)");
    println!("     GET    /api/topology/{{view}}/{{id}}          Node detail");
    println!("     POST   /api/control/{{probe}}/{{node}}/{{ctl}}  Run a control");
    println!("     GET    /api/control/ws                    Probe control connection (websocket)");
    println!("     GET    /api/pipe/{{id}}                     Attach to a pipe (websocket)");
    println!("     DELETE /api/pipe/{{id}}                     Close a pipe");
    println!();
    println!("   Examples:");
    println!("     curl -X POST --data-binary @report.json {base}/api/report");
    println!("     curl {base}/api/topology/applications");
    println!();

    let rt = super::or_exit(tokio::runtime::Runtime::new().map_err(|e| e.to_string()));
    super::or_exit(rt.block_on(meshscope_server::run_server(state)).map_err(|e| e.to_string()));
}

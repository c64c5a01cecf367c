mod archive;
mod collectors;
mod config;
mod credentials;
mod normalize;
mod run;
mod sampler;
mod sinks;
mod snapshot;

use collectors::process::SysinfoTable;
use config::Config;
use snapshot::RunContext;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let ctx = RunContext::capture();
    let (cfg, config_ok) = match Config::load_or_default(config::CONFIG_PATH) {
        Ok(cfg) => (cfg, true),
        Err(err) => {
            error!(
                error = %err,
                "failed to load configuration, archiving with defaults and no sink"
            );
            (Config::archive_only(), false)
        }
    };

    info!(
        host = %ctx.hostname(),
        sink = ?cfg.sink,
        window_ms = cfg.sample_window_ms,
        "starting process dump"
    );

    let mut table = SysinfoTable::new();
    let report = run::run_once(&cfg, &mut table, ctx).await;

    info!(
        archive = %report
            .archive
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
        seen = report.seen,
        skipped = report.skipped.total(),
        processes = report.processes,
        sink = %report.sink,
        "process dump finished"
    );

    if config_ok && report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

use anyhow::Result;
use awardsetl::{
    config::Config,
    dag::{RunReport, TaskState},
    pipeline::build_pipeline,
    schedule::Scheduler,
};
use clap::Parser;
use std::{process::ExitCode, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Daily tracks/awards ETL.
#[derive(Parser, Debug)]
struct Args {
    /// Run the pipeline once and exit instead of scheduling it
    #[arg(long)]
    once: bool,
}

fn log_report(report: &RunReport) {
    for t in &report.tasks {
        match t.state {
            TaskState::Success => {
                info!(task = %t.id, attempts = t.attempts, duration_ms = t.duration_ms, "ok")
            }
            TaskState::Failed => error!(
                task = %t.id,
                attempts = t.attempts,
                error = t.error.as_deref().unwrap_or(""),
                "failed"
            ),
            TaskState::UpstreamFailed => warn!(task = %t.id, "upstream failed"),
        }
    }
    match serde_json::to_string(report) {
        Ok(json) => info!(report = %json, "run finished"),
        Err(e) => warn!("could not serialize run report: {}", e),
    }
}

async fn run_once(cfg: &Config) -> Result<RunReport> {
    let dag = build_pipeline(cfg)?;
    let report = dag.run(&cfg.dag).await;
    log_report(&report);
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,awardsetl=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let args = Args::parse();
    let cfg = Arc::new(Config::from_env()?);
    info!(db = ?cfg.db, export = ?cfg.export, load_mode = ?cfg.load_mode, "configuration loaded");

    // ─── 3) single run ───────────────────────────────────────────────
    if args.once {
        let report = run_once(&cfg).await?;
        return Ok(if report.succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    // ─── 4) scheduled runs ───────────────────────────────────────────
    let scheduler = Scheduler::new(cfg.schedule_interval);
    let job = {
        let cfg = Arc::clone(&cfg);
        move || {
            let cfg = Arc::clone(&cfg);
            async move {
                if let Err(e) = run_once(&cfg).await {
                    error!("pipeline could not start: {:#}", e);
                }
            }
        }
    };
    tokio::select! {
        res = scheduler.run(job, None) => res?,
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }
    Ok(ExitCode::SUCCESS)
}

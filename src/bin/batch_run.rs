//! batch-run: 从 JSON 文件读取请求单元并通过批量端点执行
//!
//! Usage:
//!   batch-run <units.json> [--config <options.yaml>] [--base-url <url>]
//!   batch-run --help | --version

use anyhow::{bail, Context};
use batch_orchestrator::{
    CachedTokenProvider, CancelHandle, EnvTokenProvider, HttpBatchTransport, Orchestrator,
    RequestUnit, RunOptions, RunReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_BASE_URL: &str = "https://management.azure.com";
const TOKEN_TTL: Duration = Duration::from_secs(300);

struct CliArgs {
    units: PathBuf,
    config: Option<PathBuf>,
    base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("help" | "--help" | "-h") => {
            print_usage();
            if args.is_empty() {
                std::process::exit(1);
            }
            return Ok(());
        }
        Some("version" | "--version" | "-V") => {
            println!("batch-run {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let cli = parse_args(&args)?;
    let units = load_units(&cli.units)?;

    let options = match &cli.config {
        Some(path) => RunOptions::from_file(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => RunOptions::default(),
    }
    .with_env_overrides();

    let tokens = CachedTokenProvider::new(EnvTokenProvider::default(), TOKEN_TTL);
    let transport = HttpBatchTransport::new(&cli.base_url, Arc::new(tokens))?;
    let orchestrator = Orchestrator::new(Arc::new(transport)).with_options(options);

    let cancel = CancelHandle::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, cancelling outstanding units");
            on_signal.cancel();
        }
    });

    let report = orchestrator
        .start_with_cancel(units, cancel)?
        .wait()
        .await?;
    print_report(&report);

    if !report.all_succeeded() {
        std::process::exit(2);
    }
    Ok(())
}

fn print_usage() {
    println!(
        r#"batch-run: 批量请求编排命令行工具

USAGE:
    batch-run <units.json> [OPTIONS]

OPTIONS:
    --config <path>       YAML run options (max_batch_size, concurrency_limit, ...)
    --base-url <url>      Batch endpoint base URL (default: {DEFAULT_BASE_URL})
    --version             Show version information
    --help                Show this help message

ENVIRONMENT:
    BATCH_BEARER_TOKEN    Bearer token for the batch endpoint
    BATCH_MAX_SIZE, BATCH_CONCURRENCY, BATCH_MAX_ATTEMPTS,
    BATCH_BASE_DELAY_MS, BATCH_MAX_DELAY_MS, BATCH_DEADLINE_MS
                          Override the corresponding run options
    RUST_LOG              Log filter (e.g. batch_orchestrator=debug)"#
    );
}

fn parse_args(args: &[String]) -> anyhow::Result<CliArgs> {
    let mut units = None;
    let mut config = None;
    let mut base_url = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let v = iter.next().context("--config needs a path")?;
                config = Some(PathBuf::from(v));
            }
            "--base-url" => {
                let v = iter.next().context("--base-url needs a value")?;
                base_url = Some(v.clone());
            }
            flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
            path => {
                if units.is_some() {
                    bail!("unexpected argument: {path}");
                }
                units = Some(PathBuf::from(path));
            }
        }
    }

    Ok(CliArgs {
        units: units.context("missing <units.json>")?,
        config,
        base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
    })
}

fn load_units(path: &Path) -> anyhow::Result<Vec<RequestUnit>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let units: Vec<RequestUnit> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing request units from {}", path.display()))?;
    Ok(units)
}

fn print_report(report: &RunReport) {
    let stats = &report.stats;
    println!("=== Summary ===");
    println!(
        "{}/{} succeeded, {} permanently failed, {} cancelled",
        stats.succeeded, stats.submitted, stats.permanently_failed, stats.cancelled
    );
    println!(
        "{} envelope(s), {} retr{}, {} throttled, {} transport failure(s), peak in flight {}",
        stats.envelopes_sent,
        stats.retries,
        if stats.retries == 1 { "y" } else { "ies" },
        stats.throttled,
        stats.transport_failures,
        stats.peak_in_flight
    );
    if stats.batch_size_reductions > 0 {
        println!("batch size halved {} time(s)", stats.batch_size_reductions);
    }
    println!("elapsed {:.2}s", stats.elapsed.as_secs_f64());

    println!("\n=== Units ===");
    for (key, result) in report.iter() {
        let status = result
            .outcome
            .status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {key}  {}  status={status}  attempts={}",
            result.outcome.kind(),
            result.attempts
        );
    }
}

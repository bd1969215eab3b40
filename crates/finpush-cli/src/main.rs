use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use finpush_analysis::file::FileReportSource;
use finpush_cli::config::AppConfig;
use finpush_cli::runner::{JobRunner, TriggerContext};
use finpush_notify::dispatcher::{Dispatcher, Overall};

const EXIT_OK: i32 = 0;
const EXIT_PARTIAL_FAILURE: i32 = 2;
const EXIT_ALL_FAILED: i32 = 3;
const EXIT_REPORT_FAILED: i32 = 4;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  finpush run <config.toml> <report.md>... [--dry-run] [--deadline-secs N] [--sections a,b]"
    );
    eprintln!("  finpush check-config <config.toml>");
    eprintln!();
    eprintln!("Exit codes:");
    eprintln!("  0  all channels succeeded (also dry runs and empty channel sets)");
    eprintln!("  2  partial failure: some channels succeeded, some did not");
    eprintln!("  3  every channel failed");
    eprintln!("  4  report retrieval failed; nothing was dispatched");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("finpush=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("run") => {
            let code = run_command(&args[2..]).await?;
            std::process::exit(code);
        }
        Some("check-config") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("check-config requires a <config.toml> argument")
            })?;
            check_config(config_path)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }
}

struct RunArgs {
    config_path: String,
    reports: Vec<String>,
    dry_run: bool,
    deadline_secs: Option<u64>,
    sections: Option<Vec<String>>,
}

fn parse_run_args(args: &[String]) -> Result<RunArgs> {
    let mut positional = Vec::new();
    let mut dry_run = false;
    let mut deadline_secs = None;
    let mut sections = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            "--deadline-secs" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--deadline-secs requires a value"))?;
                deadline_secs = Some(value.parse().map_err(|e| {
                    anyhow::anyhow!("invalid --deadline-secs value {value}: {e}")
                })?);
            }
            "--sections" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--sections requires a value"))?;
                sections = Some(
                    value
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                );
            }
            other if other.starts_with("--") => {
                anyhow::bail!("unknown flag: {other}");
            }
            other => positional.push(other.to_string()),
        }
    }

    if positional.len() < 2 {
        print_usage();
        anyhow::bail!("run requires <config.toml> and at least one <report.md>");
    }
    let config_path = positional.remove(0);

    Ok(RunArgs {
        config_path,
        reports: positional,
        dry_run,
        deadline_secs,
        sections,
    })
}

async fn run_command(args: &[String]) -> Result<i32> {
    let run = parse_run_args(args)?;

    let config = AppConfig::load(&run.config_path)?;
    tracing::info!(
        config = %run.config_path,
        channels = config.channels.len(),
        enabled = config.enabled_channel_count(),
        reports = run.reports.len(),
        "configuration resolved"
    );

    let dispatcher = Dispatcher::from_configs(&config.channels, config.dispatch_options());
    let runner = JobRunner::new(
        dispatcher,
        config.report.detail_level,
        config.report.auto_compact,
    );

    let mut worst = EXIT_OK;
    for path in &run.reports {
        let source = FileReportSource::new(path).with_severity(config.report.severity);
        let ctx = TriggerContext {
            deadline: run
                .deadline_secs
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
            sections: run.sections.clone(),
            dry_run: run.dry_run,
        };

        let code = match runner.run_once(&source, &ctx).await {
            Ok(summary) => match summary.dispatch.as_ref().map(|d| d.overall) {
                None | Some(Overall::AllSucceeded) => EXIT_OK,
                Some(Overall::NoChannels) => {
                    tracing::warn!("no channels configured; nothing was delivered");
                    EXIT_OK
                }
                Some(Overall::PartialFailure) => EXIT_PARTIAL_FAILURE,
                Some(Overall::AllFailed) => EXIT_ALL_FAILED,
            },
            Err(e) => {
                tracing::error!(report = %path, error = %e, "run failed");
                EXIT_REPORT_FAILED
            }
        };
        worst = worst.max(code);
    }

    Ok(worst)
}

fn check_config(path: &str) -> Result<()> {
    let config = AppConfig::load(path)?;

    let mut invalid = 0usize;
    for channel in &config.channels {
        match finpush_notify::channels::build_adapter(channel) {
            Ok(_) => tracing::info!(
                channel = %channel.id,
                channel_type = %channel.channel_type,
                enabled = channel.enabled,
                "channel configuration ok"
            ),
            Err(e) => {
                invalid += 1;
                tracing::error!(channel = %channel.id, error = %e, "channel configuration invalid");
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{invalid} channel(s) failed validation");
    }
    tracing::info!(channels = config.channels.len(), "configuration ok");
    Ok(())
}

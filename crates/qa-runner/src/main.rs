//! Depth Camera QA - Main Entry Point

use clap::Parser;
use qa_runner::{init_logging, run_scenarios, LogFormat, Settings};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "depth-qa", version, about = "Depth camera calibration and clock-sync checks")]
struct Cli {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scenario to run; repeat for several. Defaults to the configured list
    #[arg(short, long = "scenario", value_enum)]
    scenarios: Vec<qa_runner::ScenarioKind>,

    /// Where to write the JSON report
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if cli.json_logs {
        settings.logging.format = LogFormat::Json;
    }
    if cli.report.is_some() {
        settings.report_path = cli.report;
    }
    init_logging(&settings.logging)?;

    info!("=== Depth QA v{} ===", env!("CARGO_PKG_VERSION"));
    let scenarios = if cli.scenarios.is_empty() {
        settings.scenarios.clone()
    } else {
        cli.scenarios
    };

    let report = run_scenarios(&settings, &scenarios).await?;
    report.log_summary();
    if let Some(path) = &settings.report_path {
        report.write_json(path)?;
    }

    if !report.passed() {
        error!("{} scenario(s) failed", report.summary.failed);
        std::process::exit(1);
    }
    Ok(())
}

//! Depth Camera QA Runner
//!
//! Loads settings, installs logging, runs the calibration and clock-sync
//! scenarios against a simulated two-camera bench and writes a JSON report.
//!
//! Provides:
//! - Layered settings (defaults, TOML file, `QA_` environment)
//! - Text or JSON `tracing` output with `RUST_LOG` override
//! - Sequential scenario orchestration on the blocking pool
//! - Run report with per-scenario checks and summary counts

mod logging;
mod report;
mod runner;
mod settings;

pub use logging::{init_logging, LogFormat, LoggingSettings};
pub use report::{ReportError, RunReport, RunSummary, ScenarioDetail, ScenarioEntry};
pub use runner::{run_on_bench, run_scenarios, ScenarioKind, TestBench};
pub use settings::{DeviceSettings, Settings};

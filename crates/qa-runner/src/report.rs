//! JSON run report

use calib_protocol::{ScenarioReport, ScenarioStatus};
use chrono::{DateTime, Utc};
use clock_sync::{FpsSweepReport, IntraSyncReport, SyncComparisonReport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::runner::ScenarioKind;

#[derive(Debug, Error)]
pub enum ReportError {
    /// Report could not be encoded
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Destination could not be written
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Scenario-specific findings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioDetail {
    Calibration(ScenarioReport),
    SyncDrift(SyncComparisonReport),
    FpsSync(FpsSweepReport),
    IntraSync(IntraSyncReport),
    /// The bench cannot run this scenario
    Skipped { reason: String },
    /// The scenario aborted before producing findings
    Error { message: String },
}

impl ScenarioDetail {
    pub fn status(&self) -> ScenarioStatus {
        let passed = match self {
            Self::Calibration(report) => return report.status,
            Self::SyncDrift(report) => report.passed(),
            Self::FpsSync(report) => report.passed(),
            Self::IntraSync(report) => report.passed(),
            Self::Skipped { .. } => return ScenarioStatus::Skipped,
            Self::Error { .. } => false,
        };
        if passed {
            ScenarioStatus::Passed
        } else {
            ScenarioStatus::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEntry {
    pub scenario: ScenarioKind,
    pub status: ScenarioStatus,
    pub elapsed_ms: u64,
    pub detail: ScenarioDetail,
}

impl ScenarioEntry {
    pub fn new(scenario: ScenarioKind, detail: ScenarioDetail, elapsed: Duration) -> Self {
        Self {
            scenario,
            status: detail.status(),
            elapsed_ms: elapsed.as_millis() as u64,
            detail,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// One invocation of the runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub version: String,
    pub scenarios: Vec<ScenarioEntry>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            scenarios: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn push(&mut self, entry: ScenarioEntry) {
        match entry.status {
            ScenarioStatus::Passed => self.summary.passed += 1,
            ScenarioStatus::Failed => self.summary.failed += 1,
            ScenarioStatus::Skipped => self.summary.skipped += 1,
        }
        self.scenarios.push(entry);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// No scenario failed; skipped ones do not count against the run
    pub fn passed(&self) -> bool {
        self.summary.failed == 0
    }

    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Report written to {}", path.display());
        Ok(())
    }

    pub fn log_summary(&self) {
        info!("=== Run {} ===", self.run_id);
        for entry in &self.scenarios {
            match entry.status {
                ScenarioStatus::Passed => info!("  {:<18} PASSED  ({} ms)", entry.scenario.name(), entry.elapsed_ms),
                ScenarioStatus::Skipped => warn!("  {:<18} SKIPPED ({} ms)", entry.scenario.name(), entry.elapsed_ms),
                ScenarioStatus::Failed => error!("  {:<18} FAILED  ({} ms)", entry.scenario.name(), entry.elapsed_ms),
            }
        }
        info!(
            "Passed: {}, failed: {}, skipped: {}",
            self.summary.passed, self.summary.failed, self.summary.skipped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(scenario: ScenarioKind, detail: ScenarioDetail) -> ScenarioEntry {
        ScenarioEntry::new(scenario, detail, Duration::from_millis(12))
    }

    #[test]
    fn test_status_from_detail() {
        let skipped = ScenarioDetail::Skipped {
            reason: "no sync".to_string(),
        };
        let error = ScenarioDetail::Error {
            message: "stream stalled".to_string(),
        };
        assert_eq!(skipped.status(), ScenarioStatus::Skipped);
        assert_eq!(error.status(), ScenarioStatus::Failed);

        let mut report = ScenarioReport::new("occ", "SIM0001");
        report.status = ScenarioStatus::Passed;
        assert_eq!(ScenarioDetail::Calibration(report).status(), ScenarioStatus::Passed);
    }

    #[test]
    fn test_summary_counts() {
        let mut report = RunReport::start();
        report.push(entry(ScenarioKind::SyncDrift, ScenarioDetail::Skipped { reason: "x".to_string() }));
        assert!(report.passed());
        report.push(entry(ScenarioKind::Occ, ScenarioDetail::Error { message: "y".to_string() }));
        assert!(!report.passed());
        assert_eq!(report.summary, RunSummary { passed: 0, failed: 1, skipped: 1 });
    }

    #[test]
    fn test_json_tagging() {
        let value = serde_json::to_value(entry(
            ScenarioKind::IntraSync,
            ScenarioDetail::Skipped {
                reason: "unsupported".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(value["scenario"], "intra_sync");
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["detail"]["type"], "skipped");
        assert_eq!(value["elapsed_ms"], 12);
    }

    #[test]
    fn test_write_json_creates_directories() {
        let dir = std::env::temp_dir().join(format!("qa-report-{}", Uuid::new_v4()));
        let path = dir.join("nested").join("report.json");
        let mut report = RunReport::start();
        report.push(entry(ScenarioKind::Occ, ScenarioDetail::Error { message: "boom".to_string() }));
        report.finish();
        report.write_json(&path).unwrap();

        let back: RunReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(back, report);
    }
}

//! Scenario orchestration
//!
//! Scenarios run one after another against the same bench. Each runs on the
//! blocking pool because device waits and collection windows block the
//! calling thread.

use crate::report::{RunReport, ScenarioDetail, ScenarioEntry};
use crate::settings::{DeviceSettings, Settings};
use anyhow::Context;
use calib_protocol::{run_health_check, run_perturbation_scenario};
use clock_sync::{run_fps_sweep, run_intra_camera_sync, run_sync_comparison, SyncError};
use depth_device::SimulatedDevice;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Perturb, run on-chip calibration, verify reversion
    Occ,
    /// Perturb, run tare calibration, verify reversion
    Tare,
    /// Plain on-chip calibration judged by health factor
    OccHealthCheck,
    /// MASTER/SLAVE against free-running drift
    SyncDrift,
    /// MASTER/SLAVE offset at several frame rates
    FpsSync,
    /// Depth/color timestamp agreement on one camera
    IntraSync,
}

impl ScenarioKind {
    pub fn all() -> &'static [ScenarioKind] {
        &[
            Self::Occ,
            Self::Tare,
            Self::OccHealthCheck,
            Self::SyncDrift,
            Self::FpsSync,
            Self::IntraSync,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Occ => "occ",
            Self::Tare => "tare",
            Self::OccHealthCheck => "occ_health_check",
            Self::SyncDrift => "sync_drift",
            Self::FpsSync => "fps_sync",
            Self::IntraSync => "intra_sync",
        }
    }
}

/// Simulated two-camera bench
pub struct TestBench {
    pub master: SimulatedDevice,
    pub slave: SimulatedDevice,
}

impl TestBench {
    pub fn from_settings(devices: &DeviceSettings) -> Self {
        Self {
            master: SimulatedDevice::new(devices.master.clone()),
            slave: SimulatedDevice::new(devices.slave.clone()),
        }
    }
}

/// Run `scenarios` in order on a bench built from `settings`
pub async fn run_scenarios(settings: &Settings, scenarios: &[ScenarioKind]) -> anyhow::Result<RunReport> {
    let bench = TestBench::from_settings(&settings.devices);
    run_on_bench(bench, settings, scenarios).await
}

/// Run `scenarios` in order on an existing bench
pub async fn run_on_bench(
    mut bench: TestBench,
    settings: &Settings,
    scenarios: &[ScenarioKind],
) -> anyhow::Result<RunReport> {
    let settings = Arc::new(settings.clone());
    let mut report = RunReport::start();
    info!("Run {} with {} scenario(s)", report.run_id, scenarios.len());

    for &kind in scenarios {
        info!("=== {} ===", kind.name());
        let start = Instant::now();
        let shared = Arc::clone(&settings);
        let (returned, detail) = tokio::task::spawn_blocking(move || {
            let detail = run_scenario(kind, &mut bench, &shared);
            (bench, detail)
        })
        .await
        .with_context(|| format!("scenario {} panicked", kind.name()))?;
        bench = returned;

        let entry = ScenarioEntry::new(kind, detail, start.elapsed());
        info!("{} finished: {:?}", kind.name(), entry.status);
        report.push(entry);
    }

    report.finish();
    Ok(report)
}

fn run_scenario(kind: ScenarioKind, bench: &mut TestBench, settings: &Settings) -> ScenarioDetail {
    match kind {
        ScenarioKind::Occ => {
            ScenarioDetail::Calibration(run_perturbation_scenario(Some(&mut bench.master), &settings.occ))
        }
        ScenarioKind::Tare => {
            ScenarioDetail::Calibration(run_perturbation_scenario(Some(&mut bench.master), &settings.tare))
        }
        ScenarioKind::OccHealthCheck => {
            ScenarioDetail::Calibration(run_health_check(Some(&mut bench.master), &settings.health_check))
        }
        ScenarioKind::SyncDrift => sync_detail(
            run_sync_comparison(&mut bench.master, &mut bench.slave, &settings.drift, &settings.thresholds),
            ScenarioDetail::SyncDrift,
        ),
        ScenarioKind::FpsSync => sync_detail(
            run_fps_sweep(&mut bench.master, &mut bench.slave, &settings.drift, &settings.thresholds),
            ScenarioDetail::FpsSync,
        ),
        ScenarioKind::IntraSync => sync_detail(
            run_intra_camera_sync(&mut bench.master, &settings.intra),
            ScenarioDetail::IntraSync,
        ),
    }
}

fn sync_detail<T>(result: Result<T, SyncError>, wrap: fn(T) -> ScenarioDetail) -> ScenarioDetail {
    match result {
        Ok(report) => wrap(report),
        Err(SyncError::Unsupported(reason)) => ScenarioDetail::Skipped { reason },
        Err(e) => {
            error!("Sync scenario failed: {}", e);
            ScenarioDetail::Error { message: e.to_string() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_protocol::ScenarioStatus;
    use depth_device::StreamConfig;
    use std::time::Duration;

    fn quick_settings() -> Settings {
        let mut settings = Settings::default();
        settings.occ.stream = StreamConfig::depth(32, 16, 90);
        settings.occ.depth.frames = 3;
        settings.health_check.stream = StreamConfig::depth(32, 16, 90);
        settings.intra.depth = StreamConfig::depth(16, 12, 30);
        settings.intra.color = StreamConfig::color(16, 12, 30);
        settings.intra.settle = Duration::from_millis(100);
        settings.intra.window = Duration::from_secs(1);
        settings
    }

    #[test]
    fn test_scenario_names_match_serde() {
        for kind in ScenarioKind::all() {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.name());
        }
    }

    #[tokio::test]
    async fn test_calibration_scenarios_pass_on_simulator() {
        let settings = quick_settings();
        let report = run_scenarios(&settings, &[ScenarioKind::Occ, ScenarioKind::OccHealthCheck])
            .await
            .unwrap();

        assert_eq!(report.scenarios.len(), 2);
        assert!(report.passed(), "{:?}", report.scenarios);
        assert_eq!(report.summary.passed, 2);
        assert!(report.finished_at.is_some());
        match &report.scenarios[0].detail {
            ScenarioDetail::Calibration(r) => assert!(r.restored),
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_old_firmware_skips_sync_scenarios() {
        let mut settings = quick_settings();
        settings.devices.master.info.firmware_version = "5.12.0.0".to_string();
        let report = run_scenarios(&settings, &[ScenarioKind::SyncDrift, ScenarioKind::FpsSync])
            .await
            .unwrap();

        assert!(report.scenarios.iter().all(|e| e.status == ScenarioStatus::Skipped));
        assert_eq!(report.summary.skipped, 2);
        assert!(report.passed());
    }

    #[tokio::test]
    async fn test_intra_sync_runs_on_master() {
        let settings = quick_settings();
        let report = run_scenarios(&settings, &[ScenarioKind::IntraSync]).await.unwrap();
        let entry = &report.scenarios[0];
        assert_eq!(entry.status, ScenarioStatus::Passed, "{:?}", entry.detail);
        match &entry.detail {
            ScenarioDetail::IntraSync(r) => assert_eq!(r.serial, "SIM-MASTER"),
            other => panic!("unexpected detail {:?}", other),
        }
    }
}

//! Perturb-calibrate-verify scenarios

use crate::config::{CalibrationKind, ScenarioConfig};
use crate::depth::measure_average_depth;
use crate::error::ProtocolError;
use crate::evaluate::{
    check_depth_convergence, check_health, check_perturbation, check_reversion, check_target_z,
    Check, CheckOutcome,
};
use crate::params::{resolve_params, OccParams, TareParams};
use crate::restore::RestoreGuard;
use crate::routine::{run_calibration, RoutineKind};
use crate::table_io::{modify_principal_point, read_device_principal_points, save_table, write_table_with_crc};
use calib_table::{read_principal_points, Axis, PrincipalPoint, TableLayout};
use depth_device::AutoCalibratedDevice;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
}

/// Measurements of one perturb-calibrate-verify cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRun {
    pub axis: Axis,
    pub pixel_correction_px: Option<f64>,
    /// Right-eye principal point before the perturbation
    pub base: Option<PrincipalPoint>,
    /// After the perturbation, before calibration
    pub modified: Option<PrincipalPoint>,
    /// After the calibrated table was written
    pub final_point: Option<PrincipalPoint>,
    pub baseline_depth_mm: Option<f64>,
    pub modified_depth_mm: Option<f64>,
    pub post_depth_mm: Option<f64>,
    pub health_factor: Option<f64>,
    pub ground_truth_mm: Option<f64>,
    pub target_z_mm: Option<f64>,
    pub attempts: u32,
    pub host_assisted_frames: u32,
}

impl CalibrationRun {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            pixel_correction_px: None,
            base: None,
            modified: None,
            final_point: None,
            baseline_depth_mm: None,
            modified_depth_mm: None,
            post_depth_mm: None,
            health_factor: None,
            ground_truth_mm: None,
            target_z_mm: None,
            attempts: 0,
            host_assisted_frames: 0,
        }
    }
}

/// Outcome of one scenario on one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub device: String,
    pub status: ScenarioStatus,
    pub checks: Vec<Check>,
    pub run: Option<CalibrationRun>,
    /// Error that aborted the scenario
    pub error: Option<String>,
    /// Factory calibration was restored afterwards
    pub restored: bool,
    pub elapsed_ms: u64,
}

impl ScenarioReport {
    pub fn new(name: &str, device: &str) -> Self {
        Self {
            name: name.to_string(),
            device: device.to_string(),
            status: ScenarioStatus::Passed,
            checks: Vec::new(),
            run: None,
            error: None,
            restored: false,
            elapsed_ms: 0,
        }
    }

    /// Report for a scenario that did not apply to the device
    pub fn skipped(name: &str, device: &str, reason: String) -> Self {
        warn!("{} skipped on {}: {}", name, device, reason);
        let mut report = Self::new(name, device);
        report.status = ScenarioStatus::Skipped;
        report.error = Some(reason);
        report
    }

    /// Record an aborting error
    pub fn abort(&mut self, error: impl std::fmt::Display) {
        let message = error.to_string();
        self.error = Some(match self.error.take() {
            Some(previous) => format!("{}; {}", previous, message),
            None => message,
        });
        self.status = ScenarioStatus::Failed;
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.outcome == CheckOutcome::Fail)
    }

    /// Derive the final status from checks and errors
    pub(crate) fn finish(&mut self, start: Instant) {
        self.elapsed_ms = start.elapsed().as_millis() as u64;
        if self.status != ScenarioStatus::Skipped
            && (self.error.is_some() || self.checks.iter().any(Check::is_failure))
        {
            self.status = ScenarioStatus::Failed;
        }
    }
}

/// Run the OCC or Tare perturbation scenario.
///
/// The device is returned to factory calibration exactly once whatever
/// happens after the capability gate, including a vendor call that fails.
pub fn run_perturbation_scenario<D>(device: Option<&mut D>, config: &ScenarioConfig) -> ScenarioReport
where
    D: AutoCalibratedDevice + ?Sized,
{
    let start = Instant::now();
    let name = config.name();

    let device = match device {
        Some(d) => d,
        None => {
            let mut report = ScenarioReport::new(name, "");
            report.abort(ProtocolError::NoDevice);
            report.finish(start);
            return report;
        }
    };

    let serial = device.info().serial_number.clone();
    let caps = device.capabilities().clone();
    let layout = match config.layout.clone().or_else(|| caps.table_layout.clone()) {
        Some(layout) => layout,
        None => {
            return ScenarioReport::skipped(
                name,
                &serial,
                format!("calibration table layout unknown for {:?}", caps.family),
            )
        }
    };

    if let Err(e) = layout.validate() {
        error!("{} on {}: {}", name, serial, e);
        let mut report = ScenarioReport::new(name, &serial);
        report.abort(ProtocolError::Table(e));
        report.finish(start);
        return report;
    }

    let host_assistance = config.host_assistance || caps.is_mipi;
    if host_assistance && !config.host_assistance {
        info!("MIPI device: calibration runs with host assistance");
    }

    info!("Starting {} on {}", name, serial);
    let mut report = ScenarioReport::new(name, &serial);
    let mut run = CalibrationRun::new(config.axis);
    let mut guard = RestoreGuard::new(Some(device));

    let outcome = execute(&mut guard, config, &layout, host_assistance, &mut run, &mut report.checks);
    if let Err(e) = outcome {
        error!("{} failed: {}", name, e);
        report.abort(e);
    }

    match guard.restore() {
        Ok(_) => report.restored = guard.is_restored(),
        Err(e) => {
            error!("Restoring calibration table after {} failed: {}", name, e);
            report.abort(format!("restore failed: {}", e));
        }
    }

    report.run = Some(run);
    report.finish(start);
    info!("{} on {}: {:?}", name, serial, report.status);
    report
}

fn execute<D>(
    guard: &mut RestoreGuard<'_, D>,
    config: &ScenarioConfig,
    layout: &TableLayout,
    host_assistance: bool,
    run: &mut CalibrationRun,
    checks: &mut Vec<Check>,
) -> Result<(), ProtocolError>
where
    D: AutoCalibratedDevice + ?Sized,
{
    let device = guard.device()?;
    let axis = config.axis;

    // Tare needs the target distance before anything is perturbed
    if config.kind == CalibrationKind::Tare {
        let z = match config.ground_truth_mm {
            Some(z) => z,
            None => {
                info!("Calculating distance to target...");
                let z = device.calculate_target_z(&config.target)?;
                info!("Calculated distance to target is {:.1} mm", z);
                let check = check_target_z(z, config.target_z_min_mm, config.target_z_max_mm);
                let out_of_range = check.is_failure();
                checks.push(check);
                if out_of_range {
                    return Ok(());
                }
                z
            }
        };
        run.target_z_mm = Some(z);
    }

    let saved = save_table(device)?;
    let base = read_principal_points(Some(&saved), layout)?.right;
    run.base = Some(base);
    info!("  Base principal points (Right) ppx={:.6} ppy={:.6}", base.ppx, base.ppy);

    run.baseline_depth_mm = measure_average_depth(device, &config.stream, &config.depth).map(|m| m * 1000.0);
    match run.baseline_depth_mm {
        Some(mm) => info!("Baseline average depth (pre-modification): {:.1} mm", mm),
        None => warn!("Baseline average depth unavailable; depth convergence check will be skipped"),
    }
    run.ground_truth_mm = config
        .ground_truth_mm
        .or(run.target_z_mm)
        .or(run.baseline_depth_mm);
    if let Some(gt) = run.ground_truth_mm {
        info!("Ground truth depth: {:.1} mm", gt);
    }

    let correction = config.correction_for(run.target_z_mm);
    run.pixel_correction_px = Some(correction);
    info!("Applying manual raw intrinsic correction: delta={:+.3} px", correction);
    let patch = modify_principal_point(device, correction, axis, layout)?;

    let modified = read_device_principal_points(device, layout)?.right;
    run.modified = Some(modified);
    checks.push(check_perturbation(
        patch.patched.axis(axis),
        modified.axis(axis),
        config.perturbation_epsilon_px,
    ));

    run.modified_depth_mm = measure_average_depth(device, &config.stream, &config.depth).map(|m| m * 1000.0);
    match run.modified_depth_mm {
        Some(mm) => info!("Average depth after modification (pre-calibration): {:.1} mm", mm),
        None => warn!("Average depth after modification unavailable"),
    }

    let (routine, params) = match config.kind {
        CalibrationKind::OnChip => (
            RoutineKind::OnChip,
            resolve_params(config.params_file.as_deref(), &OccParams::perturbation(host_assistance))?,
        ),
        CalibrationKind::Tare => {
            let ground_truth_mm = run
                .target_z_mm
                .ok_or_else(|| ProtocolError::Unsupported("tare requires a target distance".to_string()))?;
            (
                RoutineKind::Tare { ground_truth_mm },
                resolve_params(config.params_file.as_deref(), &TareParams::new(host_assistance))?,
            )
        }
    };
    let stream = config.calibration_stream(host_assistance);
    let max_attempts = config.max_calibration_attempts.max(1);

    let final_point = loop {
        run.attempts += 1;
        let result = run_calibration(device, routine, &params, &stream, &config.timeouts)?;
        run.health_factor = Some(result.health_factor);
        run.host_assisted_frames += result.frames_processed;

        let health = check_health(Some(result.health_factor), config.health_threshold);
        let healthy = !health.is_failure();
        checks.push(health);
        if !healthy {
            return Ok(());
        }

        write_table_with_crc(device, &result.table, layout)?;
        let final_point = read_device_principal_points(device, layout)?.right;
        run.final_point = Some(final_point);
        info!(
            "  Final principal points (Right) ppx={:.6} ppy={:.6}",
            final_point.ppx, final_point.ppy
        );

        run.post_depth_mm = measure_average_depth(device, &config.stream, &config.depth).map(|m| m * 1000.0);
        match run.post_depth_mm {
            Some(mm) => info!("Average depth after calibration: {:.1} mm", mm),
            None => warn!("Average depth after calibration unavailable"),
        }

        let depth = check_depth_convergence(
            run.ground_truth_mm,
            run.modified_depth_mm,
            run.post_depth_mm,
            config.depth_tolerance_mm,
        );
        if depth.is_failure() && run.attempts < max_attempts {
            warn!("Retrying calibration (attempt {}/{})", run.attempts + 1, max_attempts);
            continue;
        }
        checks.push(depth);
        break final_point;
    };

    checks.push(check_reversion(
        base.axis(axis),
        modified.axis(axis),
        final_point.axis(axis),
        config.min_change_px,
        config.reversion_epsilon_px,
    ));
    Ok(())
}

//! OCC health check
//!
//! Plain on-chip calibration without perturbation; only the health factor is
//! judged. The returned table is never written, so nothing needs restoring.

use crate::config::HealthCheckConfig;
use crate::error::ProtocolError;
use crate::evaluate::Check;
use crate::params::{resolve_params, OccParams};
use crate::routine::{run_calibration, RoutineKind};
use crate::scenario::ScenarioReport;
use depth_device::AutoCalibratedDevice;
use std::time::Instant;
use tracing::{error, info};

const NAME: &str = "occ_health_check";

pub fn run_health_check<D>(device: Option<&mut D>, config: &HealthCheckConfig) -> ScenarioReport
where
    D: AutoCalibratedDevice + ?Sized,
{
    let start = Instant::now();
    let device = match device {
        Some(d) => d,
        None => {
            let mut report = ScenarioReport::new(NAME, "");
            report.abort(ProtocolError::NoDevice);
            report.finish(start);
            return report;
        }
    };

    let serial = device.info().serial_number.clone();
    let host_assistance = config.host_assistance || device.capabilities().is_mipi;
    let stream = if host_assistance {
        config.host_assisted_stream
    } else {
        config.stream
    };
    let mut report = ScenarioReport::new(NAME, &serial);

    for iteration in 1..=config.iterations {
        info!("Starting OCC calibration iteration {}/{}", iteration, config.iterations);
        let outcome = resolve_params(config.params_file.as_deref(), &OccParams::health_check(host_assistance))
            .and_then(|json| run_calibration(&mut *device, RoutineKind::OnChip, &json, &stream, &config.timeouts));

        match outcome {
            Ok(result) => {
                let hf = result.health_factor;
                let check = if hf.abs() < config.health_threshold {
                    Check::pass(
                        "health_factor",
                        Some(hf),
                        Some(config.health_threshold),
                        format!("iteration {}: health factor {:+.4}", iteration, hf),
                    )
                } else {
                    Check::fail(
                        "health_factor",
                        Some(hf),
                        Some(config.health_threshold),
                        format!(
                            "iteration {}: |health factor| {:.4} >= {}",
                            iteration,
                            hf.abs(),
                            config.health_threshold
                        ),
                    )
                };
                report.checks.push(check);
            }
            Err(e) => {
                error!("OCC calibration test iteration {} failed: {}", iteration, e);
                report.abort(format!("iteration {}: {}", iteration, e));
            }
        }
    }

    report.finish(start);
    report
}

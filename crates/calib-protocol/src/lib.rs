//! Perturb-Calibrate-Verify Protocol
//!
//! Drives a depth camera through a known principal-point perturbation, runs
//! the vendor on-chip (OCC) or tare calibration, and verifies the result
//! reverted toward the original calibration and that measured depth
//! converged toward ground truth.
//!
//! Provides:
//! - Table save / principal-point perturbation / CRC-patched write against a device
//! - Average depth measurement over a bounded number of frames
//! - Vendor calibration driving, including the host-assisted frame loop
//! - Pass / fail / skipped checks with observed and expected values
//! - A restore guard that returns the device to factory calibration exactly once
//! - OCC and Tare perturbation scenarios and the plain OCC health check

mod config;
mod depth;
mod error;
mod evaluate;
mod health_check;
mod params;
mod restore;
mod routine;
mod scenario;
mod table_io;

pub use config::{
    CalibrationKind, CalibrationTimeouts, DepthSampling, HealthCheckConfig, ScenarioConfig,
    ShortRangeCorrection,
};
pub use depth::measure_average_depth;
pub use error::{ProtocolError, TableWriteError};
pub use evaluate::{
    check_depth_convergence, check_health, check_perturbation, check_reversion, check_target_z,
    Check, CheckOutcome,
};
pub use health_check::run_health_check;
pub use params::{resolve_params, OccParams, TareParams};
pub use restore::RestoreGuard;
pub use routine::{run_calibration, CalibrationResult, RoutineKind};
pub use scenario::{run_perturbation_scenario, CalibrationRun, ScenarioReport, ScenarioStatus};
pub use table_io::{modify_principal_point, read_device_principal_points, save_table, write_table_with_crc};

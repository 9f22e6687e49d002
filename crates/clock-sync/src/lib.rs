//! Hardware Clock Sync Analysis
//!
//! Relates the free-running 32-bit microsecond counters of two cameras and
//! measures how well they stay together. A calibration pass pairs frames on
//! host arrival time and fits `slave = slope * master + offset`; the
//! measurement pass maps slave timestamps into the master's domain, pairs
//! them on hardware time and tracks the offset segment by segment.
//!
//! Provides:
//! - Counter unwrapping and timestamp samples
//! - Nearest-neighbour pairing with a distance threshold
//! - Least-squares clock relation with fit quality
//! - Outlier-filtered segment statistics and drift rates
//! - Sync-mode verdicts and intra-camera gap analysis
//! - Two-device collection sessions over the device traits

mod config;
mod drift;
mod error;
mod intra;
mod pairing;
mod regression;
mod sample;
mod session;
pub mod stats;
mod verdict;

pub use config::{DriftConfig, DriftThresholds, IntraSyncConfig, MIN_SEGMENT_DURATION};
pub use drift::{align_measurement, analyze_drift, AlignedPair, DriftAnalysis, DriftSummary, SegmentStats};
pub use error::SyncError;
pub use intra::{analyze_gaps, count_discontinuities, evaluate_intra, GapAnalysis, StreamTimestamp};
pub use pairing::{pair_nearest, MatchedPair};
pub use regression::{calibrate_from_samples, fit_clock_relation, DriftCalibration};
pub use sample::{CounterUnwrapper, TimestampSample, HW_COUNTER_WRAP_US};
pub use session::{
    calibrate_devices, collect_timestamps, configure_sync_mode, measure_drift, measure_fps_sync,
    run_fps_sweep, run_intra_camera_sync, run_sync_comparison, DriftReport, FpsSweepReport,
    IntraCollector, IntraSyncReport, SyncComparisonReport, TimestampCollector,
};
pub use verdict::{
    analyze_fps_sync, check_frame_counts, evaluate_fps_sync, evaluate_mode, FpsSyncResult, SyncCheck,
};

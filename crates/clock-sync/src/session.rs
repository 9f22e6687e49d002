//! Device collection sessions
//!
//! Frames arrive on device-owned threads; each collector keeps its samples
//! behind one mutex. Control flow here is sequential: configure, stream,
//! settle, collect for a fixed window, stop, analyse.

use crate::config::{DriftConfig, DriftThresholds, IntraSyncConfig};
use crate::drift::{align_measurement, analyze_drift, DriftAnalysis};
use crate::error::SyncError;
use crate::intra::{evaluate_intra, GapAnalysis, StreamTimestamp};
use crate::regression::{calibrate_from_samples, DriftCalibration};
use crate::sample::{CounterUnwrapper, TimestampSample};
use crate::stats;
use crate::verdict::{
    analyze_fps_sync, check_frame_counts, evaluate_fps_sync, evaluate_mode, FpsSyncResult, SyncCheck,
};
use depth_device::{
    wait_until, DepthDevice, DepthFrame, DeviceOption, FrameCallback, StreamConfig, StreamKind, SyncMode,
    WaitPolicy,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const HOLD_POLL: Duration = Duration::from_millis(100);
const HOLD_SLACK: Duration = Duration::from_secs(1);
const MIN_PROGRESS_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Default)]
struct CollectorState {
    samples: Vec<TimestampSample>,
    unwrapper: CounterUnwrapper,
    missing_metadata: usize,
}

/// Hardware/host timestamp sink for one device's depth frames
#[derive(Debug, Clone, Default)]
pub struct TimestampCollector {
    inner: Arc<Mutex<CollectorState>>,
}

impl TimestampCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CollectorState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one frame; non-depth frames are ignored
    pub fn record(&self, frame: &DepthFrame) {
        if frame.stream != StreamKind::Depth {
            return;
        }
        let mut state = self.lock();
        match TimestampSample::from_frame(frame) {
            Some(raw) => {
                let hardware_us = state.unwrapper.unwrap(raw.hardware_us);
                state.samples.push(TimestampSample::new(hardware_us, raw.host_us));
            }
            None => state.missing_metadata += 1,
        }
    }

    pub fn callback(&self) -> FrameCallback {
        let collector = self.clone();
        Arc::new(move |frame: DepthFrame| collector.record(&frame))
    }

    /// Drop collected samples; counter unwrapping state is kept
    pub fn clear(&self) {
        let mut state = self.lock();
        state.samples.clear();
        state.missing_metadata = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn samples(&self) -> Vec<TimestampSample> {
        self.lock().samples.clone()
    }

    /// Frames that carried no hardware timestamp
    pub fn missing_metadata(&self) -> usize {
        self.lock().missing_metadata
    }
}

#[derive(Debug, Default)]
struct IntraState {
    depth: Vec<StreamTimestamp>,
    color: Vec<StreamTimestamp>,
}

/// Depth and color frame times from a single device
#[derive(Debug, Clone, Default)]
pub struct IntraCollector {
    inner: Arc<Mutex<IntraState>>,
}

impl IntraCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IntraState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, frame: &DepthFrame) {
        let ts = StreamTimestamp {
            global_ms: frame.host_timestamp_us / 1000.0,
            frame_number: frame.frame_number,
        };
        let mut state = self.lock();
        match frame.stream {
            StreamKind::Depth => state.depth.push(ts),
            StreamKind::Color => state.color.push(ts),
            StreamKind::Infrared => {}
        }
    }

    pub fn callback(&self) -> FrameCallback {
        let collector = self.clone();
        Arc::new(move |frame: DepthFrame| collector.record(&frame))
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.depth.clear();
        state.color.clear();
    }

    /// (depth, color) frame counts
    pub fn counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.depth.len(), state.color.len())
    }

    pub fn snapshot(&self) -> (Vec<StreamTimestamp>, Vec<StreamTimestamp>) {
        let state = self.lock();
        (state.depth.clone(), state.color.clone())
    }
}

/// Block for `window`, logging progress from `progress`
fn hold<F>(window: Duration, mut progress: F)
where
    F: FnMut(Duration),
{
    let start = Instant::now();
    let every = MIN_PROGRESS_INTERVAL.max(window / 6);
    let mut last_log = start;
    let policy = WaitPolicy::new(window + HOLD_SLACK, HOLD_POLL.min(window.max(Duration::from_millis(1))));

    let held = wait_until(&policy, || {
        if last_log.elapsed() >= every {
            progress(start.elapsed());
            last_log = Instant::now();
        }
        start.elapsed() >= window
    });
    if let Err(e) = held {
        debug!("Collection window overran: {}", e);
    }
}

/// Set the inter-camera sync mode and read it back
pub fn configure_sync_mode<D>(device: &mut D, mode: SyncMode) -> Result<(), SyncError>
where
    D: DepthDevice + ?Sized,
{
    device.set_option(DeviceOption::InterCamSyncMode, mode.option_value())?;
    let reported = device.get_option(DeviceOption::InterCamSyncMode)?;
    if SyncMode::from_option_value(reported) != Some(mode) {
        return Err(SyncError::ModeNotApplied {
            requested: mode,
            reported,
        });
    }
    info!("{} set to {:?} sync mode", device.info().serial_number, mode);
    Ok(())
}

fn require_sync_support<D>(device: &D) -> Result<(), SyncError>
where
    D: DepthDevice + ?Sized,
{
    if device.capabilities().supports_inter_cam_sync {
        return Ok(());
    }
    let info = device.info();
    Err(SyncError::Unsupported(format!(
        "{} (SN {}, FW {}) has no inter-camera sync",
        info.name, info.serial_number, info.firmware_version
    )))
}

/// Stream `stream` on both devices, discard `settle`, then collect for
/// `window`. Both streams are stopped on every path.
pub fn collect_timestamps<M, S>(
    master: &mut M,
    slave: &mut S,
    stream: &StreamConfig,
    settle: Duration,
    window: Duration,
) -> Result<(Vec<TimestampSample>, Vec<TimestampSample>), SyncError>
where
    M: DepthDevice + ?Sized,
    S: DepthDevice + ?Sized,
{
    let master_rx = TimestampCollector::new();
    let slave_rx = TimestampCollector::new();

    master.start_with_callback(std::slice::from_ref(stream), master_rx.callback())?;
    if let Err(e) = slave.start_with_callback(std::slice::from_ref(stream), slave_rx.callback()) {
        if let Err(stop) = master.stop_stream() {
            warn!("Failed to stop master stream: {}", stop);
        }
        return Err(e.into());
    }

    debug!("Discarding the first {:?} of frames", settle);
    hold(settle, |_| {});
    master_rx.clear();
    slave_rx.clear();

    info!(
        "Collecting {}x{}@{} frames for {:?}",
        stream.width, stream.height, stream.fps, window
    );
    hold(window, |elapsed| {
        info!(
            "  Progress: {:.0}s - master={}, slave={} frames",
            elapsed.as_secs_f64(),
            master_rx.len(),
            slave_rx.len()
        )
    });

    let stopped_master = master.stop_stream();
    let stopped_slave = slave.stop_stream();
    stopped_master?;
    stopped_slave?;

    for (who, rx) in [("master", &master_rx), ("slave", &slave_rx)] {
        if rx.missing_metadata() > 0 {
            warn!("{} frames from {} had no hardware timestamp", rx.missing_metadata(), who);
        }
    }
    let (m, s) = (master_rx.samples(), slave_rx.samples());
    info!("Collected frames: master={}, slave={}", m.len(), s.len());
    Ok((m, s))
}

/// Fit the slave clock against the master clock.
///
/// Devices should already be in MASTER/SLAVE mode.
pub fn calibrate_devices<M, S>(master: &mut M, slave: &mut S, config: &DriftConfig) -> Result<DriftCalibration, SyncError>
where
    M: DepthDevice + ?Sized,
    S: DepthDevice + ?Sized,
{
    info!(
        "Calibrating slave HW timestamp against master HW timestamp for {:?}...",
        config.calibration_window
    );
    let (m, s) = collect_timestamps(master, slave, &config.stream, config.settle, config.calibration_window)?;
    calibrate_from_samples(
        &m,
        &s,
        config.calibration_pair_threshold_us,
        config.min_calibration_samples,
        config.min_calibration_pairs,
    )
}

/// Drift measurement for one sync mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Mode the devices were in
    pub mode: SyncMode,
    pub master_frames: usize,
    pub slave_frames: usize,
    pub aligned_pairs: usize,
    pub avg_match_quality_us: f64,
    pub max_match_quality_us: f64,
    pub analysis: DriftAnalysis,
    pub checks: Vec<SyncCheck>,
}

impl DriftReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

/// Collect a measurement window and judge it against what `mode` should
/// achieve. The caller sets the devices' sync mode.
pub fn measure_drift<M, S>(
    master: &mut M,
    slave: &mut S,
    calibration: &DriftCalibration,
    mode: SyncMode,
    config: &DriftConfig,
    thresholds: &DriftThresholds,
) -> Result<DriftReport, SyncError>
where
    M: DepthDevice + ?Sized,
    S: DepthDevice + ?Sized,
{
    info!("Starting drift measurement in {:?} mode", mode);
    let (m, s) = collect_timestamps(master, slave, &config.stream, config.settle, config.measurement_window)?;
    let master_hw: Vec<f64> = m.iter().map(|x| x.hardware_us).collect();
    let slave_hw: Vec<f64> = s.iter().map(|x| x.hardware_us).collect();

    let threshold = config.pair_threshold_us(&config.stream);
    info!("Frame alignment threshold: {:.0} us", threshold);
    let pairs = align_measurement(&master_hw, &slave_hw, calibration, threshold);
    let qualities: Vec<f64> = pairs.iter().map(|p| p.match_quality_us).collect();
    let avg_match_quality_us = stats::mean(&qualities).unwrap_or(0.0);
    let max_match_quality_us = qualities.iter().copied().fold(0.0, f64::max);
    info!(
        "Frame alignment quality: avg={:.2} us, max={:.2} us",
        avg_match_quality_us, max_match_quality_us
    );

    let mut checks = check_frame_counts(m.len(), s.len(), config.measurement_window, config.stream.fps, config);
    let analysis = if m.len() >= config.min_frames && s.len() >= config.min_frames {
        let analysis = analyze_drift(&pairs, config);
        checks.extend(evaluate_mode(mode, &analysis, thresholds));
        analysis
    } else {
        warn!("Too few frames for drift analysis in {:?} mode", mode);
        DriftAnalysis::default()
    };

    Ok(DriftReport {
        mode,
        master_frames: m.len(),
        slave_frames: s.len(),
        aligned_pairs: pairs.len(),
        avg_match_quality_us,
        max_match_quality_us,
        analysis,
        checks,
    })
}

/// MASTER-SLAVE against free-running comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncComparisonReport {
    pub master_serial: String,
    pub slave_serial: String,
    pub calibration: DriftCalibration,
    pub master_slave: DriftReport,
    pub free_running: DriftReport,
}

impl SyncComparisonReport {
    pub fn passed(&self) -> bool {
        self.master_slave.passed() && self.free_running.passed()
    }
}

/// Calibrate once in MASTER/SLAVE mode, measure drift in MASTER/SLAVE and
/// then in DEFAULT mode with the same calibration.
///
/// Both devices are returned to DEFAULT mode afterwards, also on error.
pub fn run_sync_comparison<M, S>(
    master: &mut M,
    slave: &mut S,
    config: &DriftConfig,
    thresholds: &DriftThresholds,
) -> Result<SyncComparisonReport, SyncError>
where
    M: DepthDevice + ?Sized,
    S: DepthDevice + ?Sized,
{
    config.validate()?;
    require_sync_support(master)?;
    require_sync_support(slave)?;
    info!(
        "Master device: {} (SN: {})",
        master.info().name,
        master.info().serial_number
    );
    info!("Slave device: {} (SN: {})", slave.info().name, slave.info().serial_number);

    let result = compare_modes(master, slave, config, thresholds);

    if let Err(e) = configure_sync_mode(master, SyncMode::Default) {
        warn!("Failed to reset master sync mode: {}", e);
    }
    if let Err(e) = configure_sync_mode(slave, SyncMode::Default) {
        warn!("Failed to reset slave sync mode: {}", e);
    }
    result
}

fn compare_modes<M, S>(
    master: &mut M,
    slave: &mut S,
    config: &DriftConfig,
    thresholds: &DriftThresholds,
) -> Result<SyncComparisonReport, SyncError>
where
    M: DepthDevice + ?Sized,
    S: DepthDevice + ?Sized,
{
    configure_sync_mode(master, SyncMode::Master)?;
    configure_sync_mode(slave, SyncMode::Slave)?;
    let calibration = calibrate_devices(master, slave, config)?;
    let master_slave = measure_drift(master, slave, &calibration, SyncMode::Master, config, thresholds)?;

    configure_sync_mode(master, SyncMode::Default)?;
    configure_sync_mode(slave, SyncMode::Default)?;
    let free_running = measure_drift(master, slave, &calibration, SyncMode::Default, config, thresholds)?;

    Ok(SyncComparisonReport {
        master_serial: master.info().serial_number.clone(),
        slave_serial: slave.info().serial_number.clone(),
        calibration,
        master_slave,
        free_running,
    })
}

/// Offset figures at one frame rate using an existing calibration.
///
/// `Ok(None)` when too few pairs line up for a figure.
pub fn measure_fps_sync<M, S>(
    master: &mut M,
    slave: &mut S,
    calibration: &DriftCalibration,
    fps: u32,
    config: &DriftConfig,
) -> Result<Option<FpsSyncResult>, SyncError>
where
    M: DepthDevice + ?Sized,
    S: DepthDevice + ?Sized,
{
    let stream = StreamConfig { fps, ..config.stream };
    let (m, s) = collect_timestamps(master, slave, &stream, config.settle, config.fps_window)?;
    let master_hw: Vec<f64> = m.iter().map(|x| x.hardware_us).collect();
    let slave_hw: Vec<f64> = s.iter().map(|x| x.hardware_us).collect();
    let pairs = align_measurement(&master_hw, &slave_hw, calibration, config.pair_threshold_us(&stream));
    Ok(analyze_fps_sync(fps, &pairs, config.min_fps_pairs))
}

/// Per-frame-rate offsets against one MASTER/SLAVE calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpsSweepReport {
    pub calibration: DriftCalibration,
    pub results: Vec<FpsSyncResult>,
    pub checks: Vec<SyncCheck>,
}

impl FpsSweepReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

/// Calibrate once at `config.stream` in MASTER/SLAVE mode, then measure the
/// median offset at every rate in `config.fps_rates`.
///
/// A rate with too few aligned pairs fails its check. Both devices are
/// returned to DEFAULT mode afterwards.
pub fn run_fps_sweep<M, S>(
    master: &mut M,
    slave: &mut S,
    config: &DriftConfig,
    thresholds: &DriftThresholds,
) -> Result<FpsSweepReport, SyncError>
where
    M: DepthDevice + ?Sized,
    S: DepthDevice + ?Sized,
{
    config.validate()?;
    require_sync_support(master)?;
    require_sync_support(slave)?;

    let result = sweep(master, slave, config, thresholds);

    if let Err(e) = configure_sync_mode(master, SyncMode::Default) {
        warn!("Failed to reset master sync mode: {}", e);
    }
    if let Err(e) = configure_sync_mode(slave, SyncMode::Default) {
        warn!("Failed to reset slave sync mode: {}", e);
    }
    result
}

fn sweep<M, S>(
    master: &mut M,
    slave: &mut S,
    config: &DriftConfig,
    thresholds: &DriftThresholds,
) -> Result<FpsSweepReport, SyncError>
where
    M: DepthDevice + ?Sized,
    S: DepthDevice + ?Sized,
{
    configure_sync_mode(master, SyncMode::Master)?;
    configure_sync_mode(slave, SyncMode::Slave)?;
    let calibration = calibrate_devices(master, slave, config)?;

    let mut results = Vec::new();
    let mut checks = Vec::new();
    for &fps in &config.fps_rates {
        info!("Testing sync at {} fps", fps);
        match measure_fps_sync(master, slave, &calibration, fps, config)? {
            Some(result) => {
                checks.push(evaluate_fps_sync(&result, thresholds));
                results.push(result);
            }
            None => checks.push(SyncCheck::new(
                &format!("fps_{}_offset", fps),
                false,
                0.0,
                thresholds.fps_max_median_offset_us,
                format!("fewer than {} aligned pairs at {} fps", config.min_fps_pairs, fps),
            )),
        }
    }

    Ok(FpsSweepReport {
        calibration,
        results,
        checks,
    })
}

/// Depth/color agreement on one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntraSyncReport {
    pub serial: String,
    pub depth_frames: usize,
    pub color_frames: usize,
    pub analysis: Option<GapAnalysis>,
    pub checks: Vec<SyncCheck>,
}

impl IntraSyncReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

/// Stream depth and color together and compare their frame times.
///
/// The device runs in MASTER mode when it supports inter-camera sync and is
/// returned to DEFAULT afterwards.
pub fn run_intra_camera_sync<D>(device: &mut D, config: &IntraSyncConfig) -> Result<IntraSyncReport, SyncError>
where
    D: DepthDevice + ?Sized,
{
    let synced = device.capabilities().supports_inter_cam_sync;
    if synced {
        configure_sync_mode(device, SyncMode::Master)?;
    } else {
        warn!("Inter-camera sync unsupported; checking streams in free-running mode");
    }

    let result = collect_intra(device, config);

    if synced {
        if let Err(e) = configure_sync_mode(device, SyncMode::Default) {
            warn!("Failed to reset sync mode: {}", e);
        }
    }
    result
}

fn collect_intra<D>(device: &mut D, config: &IntraSyncConfig) -> Result<IntraSyncReport, SyncError>
where
    D: DepthDevice + ?Sized,
{
    let collector = IntraCollector::new();
    device.start_with_callback(&[config.depth, config.color], collector.callback())?;

    hold(config.settle, |_| {});
    collector.clear();
    hold(config.window, |elapsed| {
        let (d, c) = collector.counts();
        info!("  Progress: {:.0}s - depth={}, color={}", elapsed.as_secs_f64(), d, c);
    });
    device.stop_stream()?;

    let (depth, color) = collector.snapshot();
    info!("Collected {} depth and {} color frames", depth.len(), color.len());
    let (analysis, checks) = evaluate_intra(&depth, &color, config);

    Ok(IntraSyncReport {
        serial: device.info().serial_number.clone(),
        depth_frames: depth.len(),
        color_frames: color.len(),
        analysis,
        checks,
    })
}

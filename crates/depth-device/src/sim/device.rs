//! Simulated device implementation

use super::clock::{gaussian, host_now_us, sleep_until_host, FrameSchedule};
use super::{synthetic_table, CalibrationBehavior, SimulationSettings};
use crate::device::{
    AutoCalibratedDevice, CalibrationOutput, DepthDevice, DeviceOption, FrameCallback,
    ProgressCallback, SyncMode, TargetZRequest,
};
use crate::error::DeviceError;
use crate::frame::{DepthFrame, FrameMetadata, MetadataField, PixelFormat, StreamConfig, StreamKind};
use crate::info::{DeviceCapabilities, DeviceInfo};
use calib_table::{read_principal_points, CalibrationTable};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Host-side delivery latency added to capture time (µs)
const HOST_LATENCY_US: f64 = 800.0;
/// Upper bound of uniform host delivery jitter (µs)
const HOST_JITTER_US: f64 = 200.0;
/// Every Nth depth pixel is reported invalid
const INVALID_PIXEL_STRIDE: usize = 10;
/// Fill value for IR and color frames
const INTENSITY_FILL: u16 = 128;

struct SimState {
    settings: SimulationSettings,
    caps: DeviceCapabilities,
    live_table: CalibrationTable,
    factory_table: CalibrationTable,
    staged_table: Option<CalibrationTable>,
    options: HashMap<DeviceOption, f32>,
    host_assist_remaining: Option<u32>,
    factory_resets: u32,
    table_writes: u32,
    calibration_runs: u32,
    last_tare_ground_truth_mm: Option<f64>,
    fail_table_read: bool,
    fail_table_write: bool,
    stalled: bool,
    /// Host time of the last hardware reset (µs)
    epoch_us: f64,
}

impl SimState {
    fn option_or_default(&self, option: DeviceOption) -> f32 {
        self.options.get(&option).copied().unwrap_or(match option {
            DeviceOption::EmitterEnabled => 1.0,
            DeviceOption::ThermalCompensation => 1.0,
            DeviceOption::Exposure => 8500.0,
            DeviceOption::Gain => 16.0,
            DeviceOption::EnableAutoExposure => 1.0,
            DeviceOption::AutoExposureMode => 0.0,
            DeviceOption::InterCamSyncMode => 0.0,
        })
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::from_option_value(self.option_or_default(DeviceOption::InterCamSyncMode))
            .unwrap_or(SyncMode::Default)
    }

    fn schedule(&self, fps: u32, start_us: f64) -> FrameSchedule {
        match self.sync_mode() {
            SyncMode::Default => FrameSchedule::free_running(fps, start_us, &self.settings.clock),
            SyncMode::Master | SyncMode::Slave => FrameSchedule::synced(fps),
        }
    }

    /// Principal-point error of the live table relative to factory (px)
    fn principal_point_error(&self) -> f64 {
        let layout = match &self.caps.table_layout {
            Some(l) => l,
            None => return 0.0,
        };
        match (
            read_principal_points(Some(&self.live_table), layout),
            read_principal_points(Some(&self.factory_table), layout),
        ) {
            (Ok(live), Ok(factory)) => {
                (live.right.ppx - factory.right.ppx).abs() + (live.right.ppy - factory.right.ppy).abs()
            }
            _ => 0.0,
        }
    }

    fn depth_mm(&self) -> f64 {
        self.settings.true_distance_mm + self.settings.depth_bias_mm_per_px * self.principal_point_error()
    }

    fn render<R: Rng + ?Sized>(
        &self,
        config: &StreamConfig,
        capture_us: f64,
        frame_number: u64,
        rng: &mut R,
    ) -> DepthFrame {
        let pixels = (config.width as usize) * (config.height as usize);
        let data = match config.kind {
            StreamKind::Depth if self.settings.dark => vec![0u16; pixels],
            StreamKind::Depth => {
                let scale_mm = self.settings.depth_scale.unwrap_or(0.001) as f64 * 1000.0;
                let raw = (self.depth_mm() / scale_mm).round().clamp(1.0, u16::MAX as f64) as u16;
                (0..pixels)
                    .map(|i| if i % INVALID_PIXEL_STRIDE == 0 { 0 } else { raw })
                    .collect()
            }
            StreamKind::Infrared | StreamKind::Color => vec![INTENSITY_FILL; pixels],
        };

        let mut metadata = FrameMetadata::new();
        if self.settings.metadata_enabled {
            let hw = self.settings.clock.timestamp_at(capture_us - self.epoch_us, rng);
            metadata.insert(MetadataField::FrameTimestamp, hw);
            metadata.insert(MetadataField::SensorTimestamp, hw);
            metadata.insert(MetadataField::FrameCounter, frame_number as i64);
            metadata.insert(
                MetadataField::ActualExposure,
                self.option_or_default(DeviceOption::Exposure) as i64,
            );
            metadata.insert(MetadataField::Gain, self.option_or_default(DeviceOption::Gain) as i64);
        }

        DepthFrame {
            stream: config.kind,
            width: config.width,
            height: config.height,
            data,
            frame_number,
            host_timestamp_us: capture_us + HOST_LATENCY_US + rng.gen_range(0.0..HOST_JITTER_US),
            metadata,
        }
    }

    fn start_calibration(
        &mut self,
        progress: ProgressCallback<'_>,
    ) -> Result<CalibrationOutput, DeviceError> {
        self.calibration_runs += 1;
        match self.settings.calibration.clone() {
            CalibrationBehavior::RevertToFactory => {
                report_progress(progress);
                Ok(self.output(self.factory_table.clone()))
            }
            CalibrationBehavior::ReturnCurrent => {
                report_progress(progress);
                Ok(self.output(self.live_table.clone()))
            }
            CalibrationBehavior::Fail { message } => Err(DeviceError::Calibration(message)),
            CalibrationBehavior::HostAssisted { frames } => {
                debug!("Simulated calibration waiting for {} host-assisted frames", frames);
                progress(0.0);
                self.host_assist_remaining = Some(frames);
                Ok(CalibrationOutput {
                    table: CalibrationTable::from_bytes(Vec::new()),
                    health_factor: 0.0,
                })
            }
        }
    }

    fn output(&self, table: CalibrationTable) -> CalibrationOutput {
        CalibrationOutput {
            table,
            health_factor: self.settings.health_factor,
        }
    }
}

fn report_progress(progress: ProgressCallback<'_>) {
    for pct in [0.0, 25.0, 50.0, 75.0, 100.0] {
        progress(pct);
    }
}

fn validate_option(option: DeviceOption, value: f32) -> Result<(), DeviceError> {
    let ok = match option {
        DeviceOption::EmitterEnabled
        | DeviceOption::ThermalCompensation
        | DeviceOption::EnableAutoExposure
        | DeviceOption::AutoExposureMode => value == 0.0 || value == 1.0,
        DeviceOption::InterCamSyncMode => SyncMode::from_option_value(value).is_some(),
        DeviceOption::Exposure => (1.0..=165_000.0).contains(&value),
        DeviceOption::Gain => (16.0..=248.0).contains(&value),
    };
    if ok {
        Ok(())
    } else {
        Err(DeviceError::InvalidValue { option, value })
    }
}

enum Streaming {
    Idle,
    Blocking {
        config: StreamConfig,
        schedule: FrameSchedule,
        next_index: u64,
        frame_number: u64,
    },
    Callback {
        shutdown: Arc<AtomicBool>,
        workers: Vec<JoinHandle<()>>,
    },
}

/// In-memory depth camera
pub struct SimulatedDevice {
    info: DeviceInfo,
    caps: DeviceCapabilities,
    state: Arc<Mutex<SimState>>,
    streaming: Streaming,
}

impl SimulatedDevice {
    /// Create a simulated device with a synthetic factory table
    pub fn new(settings: SimulationSettings) -> Self {
        let caps = DeviceCapabilities::discover(&settings.info);
        let table = synthetic_table(caps.table_layout.as_ref());
        Self::with_factory_table(settings, table)
    }

    /// Create a simulated device around a given factory table
    pub fn with_factory_table(settings: SimulationSettings, table: CalibrationTable) -> Self {
        let info = settings.info.clone();
        let caps = DeviceCapabilities::discover(&info);
        info!("Creating simulated device {} (SN: {})", info.name, info.serial_number);

        let state = SimState {
            settings,
            caps: caps.clone(),
            live_table: table.clone(),
            factory_table: table,
            staged_table: None,
            options: HashMap::new(),
            host_assist_remaining: None,
            factory_resets: 0,
            table_writes: 0,
            calibration_runs: 0,
            last_tare_ground_truth_mm: None,
            fail_table_read: false,
            fail_table_write: false,
            stalled: false,
            epoch_us: host_now_us(),
        };

        Self {
            info,
            caps,
            state: Arc::new(Mutex::new(state)),
            streaming: Streaming::Idle,
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Times the factory calibration was restored
    pub fn factory_reset_count(&self) -> u32 {
        self.state().factory_resets
    }

    /// Committed table writes
    pub fn table_write_count(&self) -> u32 {
        self.state().table_writes
    }

    /// Vendor calibration invocations (OCC and Tare)
    pub fn calibration_run_count(&self) -> u32 {
        self.state().calibration_runs
    }

    pub fn last_tare_ground_truth_mm(&self) -> Option<f64> {
        self.state().last_tare_ground_truth_mm
    }

    pub fn live_table(&self) -> CalibrationTable {
        self.state().live_table.clone()
    }

    pub fn factory_table(&self) -> CalibrationTable {
        self.state().factory_table.clone()
    }

    /// Depth the device currently reports (mm)
    pub fn current_depth_mm(&self) -> f64 {
        self.state().depth_mm()
    }

    pub fn set_calibration_behavior(&mut self, behavior: CalibrationBehavior) {
        self.state().settings.calibration = behavior;
    }

    pub fn set_health_factor(&mut self, health_factor: f64) {
        self.state().settings.health_factor = health_factor;
    }

    pub fn set_dark(&mut self, dark: bool) {
        self.state().settings.dark = dark;
    }

    /// Stop delivering frames to blocking waits
    pub fn set_stalled(&mut self, stalled: bool) {
        self.state().stalled = stalled;
    }

    pub fn set_fail_table_read(&mut self, fail: bool) {
        self.state().fail_table_read = fail;
    }

    pub fn set_fail_table_write(&mut self, fail: bool) {
        self.state().fail_table_write = fail;
    }

    fn check_stream_config(config: &StreamConfig) -> Result<(), DeviceError> {
        if config.width == 0 || config.height == 0 || config.fps == 0 {
            return Err(DeviceError::Stream(format!(
                "invalid profile {}x{}@{}",
                config.width, config.height, config.fps
            )));
        }
        let format_ok = match config.kind {
            StreamKind::Depth => config.format == PixelFormat::Z16,
            StreamKind::Infrared => config.format == PixelFormat::Y8,
            StreamKind::Color => config.format == PixelFormat::Rgb8,
        };
        if !format_ok {
            return Err(DeviceError::Stream(format!(
                "format {:?} not available for {:?}",
                config.format, config.kind
            )));
        }
        Ok(())
    }

    fn require_streaming(&self) -> Result<(), DeviceError> {
        match self.streaming {
            Streaming::Idle => Err(DeviceError::Calibration(
                "calibration requires an active stream".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl DepthDevice for SimulatedDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }

    fn start_stream(&mut self, config: &StreamConfig) -> Result<(), DeviceError> {
        if !matches!(self.streaming, Streaming::Idle) {
            return Err(DeviceError::AlreadyStreaming);
        }
        Self::check_stream_config(config)?;

        let schedule = self.state().schedule(config.fps, host_now_us());
        debug!(
            "Simulated stream started: {:?} {}x{}@{}",
            config.kind, config.width, config.height, config.fps
        );
        self.streaming = Streaming::Blocking {
            config: *config,
            schedule,
            next_index: 0,
            frame_number: 0,
        };
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<(), DeviceError> {
        match std::mem::replace(&mut self.streaming, Streaming::Idle) {
            Streaming::Idle => {}
            Streaming::Blocking { .. } => debug!("Simulated stream stopped"),
            Streaming::Callback { shutdown, workers } => {
                shutdown.store(true, Ordering::SeqCst);
                for worker in workers {
                    if worker.join().is_err() {
                        warn!("Simulated stream worker panicked");
                    }
                }
                debug!("Simulated callback streams stopped");
            }
        }
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        !matches!(self.streaming, Streaming::Idle)
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> Result<DepthFrame, DeviceError> {
        let state = Arc::clone(&self.state);
        let (config, schedule, next_index, frame_number) = match &mut self.streaming {
            Streaming::Blocking {
                config,
                schedule,
                next_index,
                frame_number,
            } => (*config, *schedule, next_index, frame_number),
            Streaming::Callback { .. } => {
                return Err(DeviceError::Stream(
                    "frames are delivered to the registered callback".to_string(),
                ))
            }
            Streaming::Idle => return Err(DeviceError::NotStreaming),
        };

        let stalled = state.lock().map(|s| s.stalled).unwrap_or(false);
        let now = host_now_us();
        let index = schedule.next_index_after(now).max(*next_index);
        let capture_us = schedule.capture_time(index);

        if stalled || capture_us - now > timeout.as_secs_f64() * 1e6 {
            std::thread::sleep(timeout);
            return Err(DeviceError::FrameTimeout(timeout));
        }

        sleep_until_host(capture_us);
        *next_index = index + 1;
        *frame_number += 1;

        let guard = state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.render(&config, capture_us, *frame_number, &mut rand::thread_rng()))
    }

    fn start_with_callback(
        &mut self,
        configs: &[StreamConfig],
        callback: FrameCallback,
    ) -> Result<(), DeviceError> {
        if !matches!(self.streaming, Streaming::Idle) {
            return Err(DeviceError::AlreadyStreaming);
        }
        if configs.is_empty() {
            return Err(DeviceError::Stream("no stream profiles given".to_string()));
        }
        for config in configs {
            Self::check_stream_config(config)?;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let start_us = host_now_us();
        let mut workers = Vec::with_capacity(configs.len());

        for config in configs.iter().copied() {
            let schedule = self.state().schedule(config.fps, start_us);
            let state = Arc::clone(&self.state);
            let shutdown_clone = Arc::clone(&shutdown);
            let callback = Arc::clone(&callback);

            let spawned = std::thread::Builder::new()
                .name(format!("sim-{}-{:?}", self.info.serial_number, config.kind))
                .spawn(move || {
                    let mut rng = rand::thread_rng();
                    let mut index = schedule.next_index_after(host_now_us());
                    let mut frame_number = 0u64;

                    while !shutdown_clone.load(Ordering::SeqCst) {
                        let capture_us = schedule.capture_time(index);
                        sleep_until_host(capture_us);
                        if shutdown_clone.load(Ordering::SeqCst) {
                            break;
                        }
                        frame_number += 1;
                        let frame = {
                            let guard = state.lock().unwrap_or_else(|e| e.into_inner());
                            guard.render(&config, capture_us, frame_number, &mut rng)
                        };
                        callback(frame);
                        index += 1;
                    }
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shutdown.store(true, Ordering::SeqCst);
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(DeviceError::Stream(format!("failed to spawn stream worker: {}", e)));
                }
            }
        }

        debug!("Simulated callback streaming started ({} profiles)", configs.len());
        self.streaming = Streaming::Callback { shutdown, workers };
        Ok(())
    }

    fn supports_option(&self, option: DeviceOption) -> bool {
        match option {
            DeviceOption::EmitterEnabled => self.caps.supports_emitter_on_off,
            DeviceOption::ThermalCompensation => self.caps.supports_thermal_compensation,
            DeviceOption::InterCamSyncMode => self.caps.supports_inter_cam_sync,
            DeviceOption::Exposure
            | DeviceOption::Gain
            | DeviceOption::EnableAutoExposure
            | DeviceOption::AutoExposureMode => true,
        }
    }

    fn get_option(&self, option: DeviceOption) -> Result<f32, DeviceError> {
        if !self.supports_option(option) {
            return Err(DeviceError::UnsupportedOption(option));
        }
        Ok(self.state().option_or_default(option))
    }

    fn set_option(&mut self, option: DeviceOption, value: f32) -> Result<(), DeviceError> {
        if !self.supports_option(option) {
            return Err(DeviceError::UnsupportedOption(option));
        }
        if option == DeviceOption::InterCamSyncMode && self.is_streaming() {
            return Err(DeviceError::OptionLocked(option));
        }
        validate_option(option, value)?;

        debug!("Set {:?} = {}", option, value);
        self.state().options.insert(option, value);
        Ok(())
    }

    fn depth_scale(&self) -> Result<f32, DeviceError> {
        self.state()
            .settings
            .depth_scale
            .ok_or_else(|| DeviceError::Unsupported("depth scale query".to_string()))
    }
}

impl AutoCalibratedDevice for SimulatedDevice {
    fn calibration_table(&self) -> Result<CalibrationTable, DeviceError> {
        let state = self.state();
        if state.fail_table_read {
            return Err(DeviceError::TableRead("simulated read failure".to_string()));
        }
        Ok(state.live_table.clone())
    }

    fn set_calibration_table(&mut self, table: &CalibrationTable) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.fail_table_write {
            return Err(DeviceError::TableWrite("simulated write failure".to_string()));
        }
        if let Some(layout) = &self.caps.table_layout {
            table
                .verify_crc(layout)
                .map_err(|e| DeviceError::TableWrite(e.to_string()))?;
        }
        state.staged_table = Some(table.clone());
        Ok(())
    }

    fn write_calibration(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state();
        let table = state
            .staged_table
            .take()
            .ok_or_else(|| DeviceError::TableWrite("no table staged".to_string()))?;
        state.live_table = table;
        state.table_writes += 1;
        debug!("Simulated table committed (write #{})", state.table_writes);
        Ok(())
    }

    fn run_on_chip_calibration(
        &mut self,
        json: &str,
        progress: ProgressCallback<'_>,
        _timeout: Duration,
    ) -> Result<CalibrationOutput, DeviceError> {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|e| DeviceError::Calibration(format!("invalid parameters: {}", e)))?;
        self.require_streaming()?;
        self.state().start_calibration(progress)
    }

    fn run_tare_calibration(
        &mut self,
        ground_truth_mm: f64,
        json: &str,
        progress: ProgressCallback<'_>,
        _timeout: Duration,
    ) -> Result<CalibrationOutput, DeviceError> {
        if !(ground_truth_mm > 0.0) {
            return Err(DeviceError::Calibration(format!(
                "invalid ground truth {} mm",
                ground_truth_mm
            )));
        }
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|e| DeviceError::Calibration(format!("invalid parameters: {}", e)))?;
        self.require_streaming()?;

        let mut state = self.state();
        state.last_tare_ground_truth_mm = Some(ground_truth_mm);
        state.start_calibration(progress)
    }

    fn process_calibration_frame(
        &mut self,
        frame: &DepthFrame,
        progress: ProgressCallback<'_>,
        _timeout: Duration,
    ) -> Result<CalibrationOutput, DeviceError> {
        if frame.stream != StreamKind::Depth {
            return Err(DeviceError::Calibration("expected a depth frame".to_string()));
        }

        let mut state = self.state();
        match state.host_assist_remaining {
            None => Err(DeviceError::Calibration(
                "no host-assisted calibration in progress".to_string(),
            )),
            Some(remaining) if remaining <= 1 => {
                state.host_assist_remaining = None;
                progress(100.0);
                Ok(state.output(state.factory_table.clone()))
            }
            Some(remaining) => {
                state.host_assist_remaining = Some(remaining - 1);
                progress(100.0 / remaining as f32);
                Ok(CalibrationOutput {
                    table: CalibrationTable::from_bytes(Vec::new()),
                    health_factor: 0.0,
                })
            }
        }
    }

    fn calculate_target_z(&mut self, request: &TargetZRequest) -> Result<f64, DeviceError> {
        if request.frames < 10 {
            return Err(DeviceError::Calibration(format!(
                "target estimate needs at least 10 frames, got {}",
                request.frames
            )));
        }
        let state = self.state();
        let z = state
            .settings
            .target_z_mm
            .ok_or_else(|| DeviceError::Unsupported("target distance estimate".to_string()))?;
        // Mild noise so repeated estimates differ
        Ok(z + gaussian(&mut rand::thread_rng(), 0.5))
    }

    fn reset_to_factory_calibration(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.live_table = state.factory_table.clone();
        state.staged_table = None;
        state.host_assist_remaining = None;
        state.factory_resets += 1;
        info!("Simulated device restored to factory calibration");
        Ok(())
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        let _ = self.stop_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_table::{patch_principal_point, Axis, TableLayout};
    use std::sync::atomic::AtomicUsize;

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(SimulationSettings::default())
    }

    fn noop() -> impl FnMut(f32) {
        |_| {}
    }

    #[test]
    fn test_blocking_stream_delivers_depth() {
        let mut dev = device();
        dev.start_stream(&StreamConfig::depth(64, 48, 90)).unwrap();

        let frame = dev.wait_for_frame(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.stream, StreamKind::Depth);
        assert_eq!(frame.data.len(), 64 * 48);
        assert_eq!(frame.data[0], 0);
        assert_eq!(frame.data[1], 1000);
        assert!(frame.hardware_timestamp().is_some());

        let next = dev.wait_for_frame(Duration::from_secs(1)).unwrap();
        assert_eq!(next.frame_number, frame.frame_number + 1);
        dev.stop_stream().unwrap();
        assert!(!dev.is_streaming());
    }

    #[test]
    fn test_wait_requires_stream() {
        let mut dev = device();
        assert_eq!(
            dev.wait_for_frame(Duration::from_millis(10)),
            Err(DeviceError::NotStreaming)
        );
    }

    #[test]
    fn test_stalled_stream_times_out() {
        let mut dev = device();
        dev.set_stalled(true);
        dev.start_stream(&StreamConfig::depth(8, 8, 30)).unwrap();
        assert_eq!(
            dev.wait_for_frame(Duration::from_millis(20)),
            Err(DeviceError::FrameTimeout(Duration::from_millis(20)))
        );
    }

    #[test]
    fn test_dark_scene_has_no_valid_depth() {
        let mut dev = device();
        dev.set_dark(true);
        dev.start_stream(&StreamConfig::depth(8, 8, 90)).unwrap();
        let frame = dev.wait_for_frame(Duration::from_secs(1)).unwrap();
        assert_eq!(frame.valid_samples(), (0, 0));
    }

    #[test]
    fn test_perturbed_table_biases_depth() {
        let mut dev = device();
        let layout = TableLayout::d400();
        let patch = patch_principal_point(&dev.live_table(), -1.0, Axis::Ppy, &layout).unwrap();

        dev.set_calibration_table(&patch.table).unwrap();
        dev.write_calibration().unwrap();
        assert!((dev.current_depth_mm() - 1040.0).abs() < 0.1);

        dev.reset_to_factory_calibration().unwrap();
        assert!((dev.current_depth_mm() - 1000.0).abs() < 1e-9);
        assert_eq!(dev.factory_reset_count(), 1);
    }

    #[test]
    fn test_bad_crc_rejected() {
        let mut dev = device();
        let mut bytes = dev.live_table().into_bytes();
        bytes[100] ^= 0xFF;
        let result = dev.set_calibration_table(&CalibrationTable::from_bytes(bytes));
        assert!(matches!(result, Err(DeviceError::TableWrite(_))));
        assert!(dev.write_calibration().is_err());
    }

    #[test]
    fn test_host_assisted_calibration() {
        let mut dev = device();
        dev.set_calibration_behavior(CalibrationBehavior::HostAssisted { frames: 3 });
        dev.start_stream(&StreamConfig::depth(8, 8, 90)).unwrap();

        let mut progress = noop();
        let first = dev
            .run_on_chip_calibration("{}", &mut progress, Duration::from_secs(1))
            .unwrap();
        assert!(!first.is_complete());

        let frame = dev.wait_for_frame(Duration::from_secs(1)).unwrap();
        let mut done = 0;
        for i in 0..3 {
            let out = dev
                .process_calibration_frame(&frame, &mut progress, Duration::from_secs(1))
                .unwrap();
            if out.is_complete() {
                done = i + 1;
                break;
            }
        }
        assert_eq!(done, 3);
    }

    #[test]
    fn test_calibration_needs_stream_and_valid_json() {
        let mut dev = device();
        let mut progress = noop();
        assert!(dev
            .run_on_chip_calibration("{}", &mut progress, Duration::from_secs(1))
            .is_err());

        dev.start_stream(&StreamConfig::depth(8, 8, 90)).unwrap();
        assert!(matches!(
            dev.run_on_chip_calibration("{not json", &mut progress, Duration::from_secs(1)),
            Err(DeviceError::Calibration(_))
        ));
        assert_eq!(dev.calibration_run_count(), 0);
    }

    #[test]
    fn test_sync_mode_locked_while_streaming() {
        let mut dev = device();
        dev.set_option(DeviceOption::InterCamSyncMode, SyncMode::Master.option_value())
            .unwrap();
        dev.start_stream(&StreamConfig::depth(8, 8, 30)).unwrap();
        assert_eq!(
            dev.set_option(DeviceOption::InterCamSyncMode, 0.0),
            Err(DeviceError::OptionLocked(DeviceOption::InterCamSyncMode))
        );
        assert_eq!(dev.get_option(DeviceOption::InterCamSyncMode).unwrap(), 1.0);
        assert!(matches!(
            dev.set_option(DeviceOption::EmitterEnabled, 3.0),
            Err(DeviceError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_callback_streaming_delivers_both_streams() {
        let mut dev = device();
        let depth = Arc::new(AtomicUsize::new(0));
        let color = Arc::new(AtomicUsize::new(0));
        let (d, c) = (Arc::clone(&depth), Arc::clone(&color));

        dev.start_with_callback(
            &[StreamConfig::depth(8, 8, 90), StreamConfig::color(8, 8, 90)],
            Arc::new(move |frame: DepthFrame| match frame.stream {
                StreamKind::Depth => {
                    d.fetch_add(1, Ordering::SeqCst);
                }
                _ => {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(200));
        dev.stop_stream().unwrap();

        assert!(depth.load(Ordering::SeqCst) >= 5);
        assert!(color.load(Ordering::SeqCst) >= 5);
    }
}

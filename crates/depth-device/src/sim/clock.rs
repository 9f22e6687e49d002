//! Simulated hardware clock and capture schedule

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Hardware timestamps are 32-bit microsecond counters
pub const HW_COUNTER_MODULUS: i64 = 1 << 32;

/// Model of a device's free-running hardware counter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimClock {
    /// Counter ticks per host microsecond
    pub rate: f64,
    /// Counter value at device reset
    pub offset_us: f64,
    /// Gaussian timestamp jitter (std dev, µs)
    pub jitter_us: f64,
    /// Capture-rate error while free-running (ppm)
    pub free_running_ppm: f64,
    /// Capture phase relative to stream start while free-running (µs)
    pub free_running_phase_us: f64,
}

impl Default for SimClock {
    fn default() -> Self {
        Self {
            rate: 1.0,
            offset_us: 0.0,
            jitter_us: 1.0,
            free_running_ppm: 0.0,
            free_running_phase_us: 0.0,
        }
    }
}

impl SimClock {
    /// Counter value for a capture `elapsed_us` after device reset
    pub fn timestamp_at<R: Rng + ?Sized>(&self, elapsed_us: f64, rng: &mut R) -> i64 {
        let ticks = self.offset_us + self.rate * elapsed_us + gaussian(rng, self.jitter_us);
        (ticks.round() as i64).rem_euclid(HW_COUNTER_MODULUS)
    }
}

/// Capture instants on the host time axis: `origin + k * interval`
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameSchedule {
    origin_us: f64,
    interval_us: f64,
}

impl FrameSchedule {
    /// Shared grid anchored at the UNIX epoch; all synced devices capture together
    pub fn synced(fps: u32) -> Self {
        Self {
            origin_us: 0.0,
            interval_us: 1_000_000.0 / fps.max(1) as f64,
        }
    }

    /// Device-local grid with its own phase and rate error
    pub fn free_running(fps: u32, start_us: f64, clock: &SimClock) -> Self {
        Self {
            origin_us: start_us + clock.free_running_phase_us,
            interval_us: 1_000_000.0 / fps.max(1) as f64 * (1.0 + clock.free_running_ppm * 1e-6),
        }
    }

    pub fn capture_time(&self, index: u64) -> f64 {
        self.origin_us + index as f64 * self.interval_us
    }

    /// First capture index strictly after `now_us`
    pub fn next_index_after(&self, now_us: f64) -> u64 {
        let k = ((now_us - self.origin_us) / self.interval_us).floor() + 1.0;
        k.max(0.0) as u64
    }
}

/// Host wall-clock time in microseconds since the UNIX epoch
pub fn host_now_us() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1e6)
        .unwrap_or(0.0)
}

/// Sleep until host time `target_us` (no-op if already past)
pub(crate) fn sleep_until_host(target_us: f64) {
    let delta = target_us - host_now_us();
    if delta > 0.0 {
        std::thread::sleep(Duration::from_secs_f64(delta / 1e6));
    }
}

/// Box-Muller sample with standard deviation `sigma`
pub(crate) fn gaussian<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen::<f64>();
    sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

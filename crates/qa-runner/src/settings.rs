//! Runner settings
//!
//! Layered as: built-in defaults, then an optional TOML file, then
//! `QA_`-prefixed environment variables with `__` between nested keys
//! (`QA_LOGGING__LEVEL=debug`, `QA_DRIFT__MIN_FRAMES=50`).
//!
//! The defaults are a source of their own, so a partially given table such
//! as `[tare]` keeps the remaining fields of `Settings::default()` rather
//! than those of its field type.

use crate::logging::LoggingSettings;
use crate::runner::ScenarioKind;
use anyhow::Context;
use calib_protocol::{HealthCheckConfig, ScenarioConfig};
use clock_sync::{DriftConfig, DriftThresholds, IntraSyncConfig};
use config::{Config, Environment, File};
use depth_device::{SimClock, SimulationSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The two cameras of the bench
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Runs the calibration scenarios and leads in MASTER/SLAVE mode
    pub master: SimulationSettings,
    pub slave: SimulationSettings,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        let master = SimulationSettings::named("Intel RealSense D435", "SIM-MASTER");
        let mut slave = SimulationSettings::named("Intel RealSense D435", "SIM-SLAVE");
        slave.clock = SimClock {
            rate: 1.000_02,
            offset_us: 12_345_678.0,
            jitter_us: 1.0,
            free_running_ppm: 50.0,
            free_running_phase_us: 500.0,
        };
        Self { master, slave }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingSettings,
    /// Scenarios run when none are given on the command line
    pub scenarios: Vec<ScenarioKind>,
    /// JSON run report destination
    pub report_path: Option<PathBuf>,
    pub devices: DeviceSettings,
    pub occ: ScenarioConfig,
    pub tare: ScenarioConfig,
    pub health_check: HealthCheckConfig,
    pub drift: DriftConfig,
    pub thresholds: DriftThresholds,
    pub intra: IntraSyncConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings::default(),
            scenarios: ScenarioKind::all().to_vec(),
            report_path: None,
            devices: DeviceSettings::default(),
            occ: ScenarioConfig::on_chip(),
            tare: ScenarioConfig::tare(),
            health_check: HealthCheckConfig::default(),
            drift: DriftConfig::default(),
            thresholds: DriftThresholds::default(),
            intra: IntraSyncConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings, reading `path` if given. A missing file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let defaults = Config::try_from(&Settings::default()).context("failed to serialize default settings")?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("QA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to assemble settings")?;

        config
            .try_deserialize()
            .context("failed to deserialize settings")
    }
}

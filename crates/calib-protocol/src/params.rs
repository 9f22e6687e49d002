//! Vendor calibration parameter blobs

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info};

/// On-chip calibration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccParams {
    #[serde(rename = "calib type")]
    pub calib_type: u8,
    #[serde(rename = "host assistance")]
    pub host_assistance: u8,
    #[serde(rename = "speed", skip_serializing_if = "Option::is_none")]
    pub speed: Option<u8>,
    #[serde(rename = "average step count", skip_serializing_if = "Option::is_none")]
    pub average_step_count: Option<u8>,
    #[serde(rename = "scan parameter", skip_serializing_if = "Option::is_none")]
    pub scan_parameter: Option<u8>,
    #[serde(rename = "step count", skip_serializing_if = "Option::is_none")]
    pub step_count: Option<u8>,
    #[serde(rename = "apply preset", skip_serializing_if = "Option::is_none")]
    pub apply_preset: Option<u8>,
    #[serde(rename = "accuracy", skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<u8>,
    #[serde(rename = "scan only", skip_serializing_if = "Option::is_none")]
    pub scan_only: Option<u8>,
    #[serde(rename = "interactive scan", skip_serializing_if = "Option::is_none")]
    pub interactive_scan: Option<u8>,
    #[serde(rename = "resize factor")]
    pub resize_factor: u8,
}

impl OccParams {
    /// Minimal set used by the perturbation scenario
    pub fn perturbation(host_assistance: bool) -> Self {
        Self {
            calib_type: 0,
            host_assistance: host_assistance as u8,
            speed: None,
            average_step_count: None,
            scan_parameter: None,
            step_count: None,
            apply_preset: None,
            accuracy: None,
            scan_only: None,
            interactive_scan: None,
            resize_factor: 1,
        }
    }

    /// Full set used by the health check
    pub fn health_check(host_assistance: bool) -> Self {
        let flag = host_assistance as u8;
        Self {
            speed: Some(2),
            average_step_count: Some(20),
            scan_parameter: Some(0),
            step_count: Some(20),
            apply_preset: Some(1),
            accuracy: Some(2),
            scan_only: Some(flag),
            interactive_scan: Some(0),
            ..Self::perturbation(host_assistance)
        }
    }
}

/// Tare calibration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TareParams {
    #[serde(rename = "host assistance")]
    pub host_assistance: u8,
    pub speed: u8,
    #[serde(rename = "scan parameter")]
    pub scan_parameter: u8,
    #[serde(rename = "step count")]
    pub step_count: u8,
    #[serde(rename = "apply preset")]
    pub apply_preset: u8,
    pub accuracy: u8,
    pub depth: u8,
    #[serde(rename = "resize factor")]
    pub resize_factor: u8,
}

impl TareParams {
    pub fn new(host_assistance: bool) -> Self {
        Self {
            host_assistance: host_assistance as u8,
            speed: 3,
            scan_parameter: 0,
            step_count: 20,
            apply_preset: 1,
            accuracy: 2,
            depth: 0,
            resize_factor: 1,
        }
    }
}

/// JSON blob from `file`, or from `defaults` when no file is given or it
/// cannot be read.
pub fn resolve_params<P: Serialize>(file: Option<&Path>, defaults: &P) -> Result<String, ProtocolError> {
    if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(json) => {
                info!("Using calibration parameters from {}", path.display());
                return Ok(json);
            }
            Err(e) => error!("Error reading parameter file {}: {}", path.display(), e),
        }
    }

    info!("Using default calibration parameters");
    Ok(serde_json::to_string_pretty(defaults)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_occ_perturbation_keys() {
        let json = resolve_params(None, &OccParams::perturbation(true)).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["calib type"], 0);
        assert_eq!(obj["host assistance"], 1);
        assert_eq!(obj["resize factor"], 1);
    }

    #[test]
    fn test_occ_health_check_scan_only_follows_host_assistance() {
        let value = serde_json::to_value(OccParams::health_check(false)).unwrap();
        assert_eq!(value["scan only"], 0);
        assert_eq!(value["average step count"], 20);
        assert_eq!(value["speed"], 2);
    }

    #[test]
    fn test_tare_defaults() {
        let value = serde_json::to_value(TareParams::new(false)).unwrap();
        assert_eq!(value["speed"], 3);
        assert_eq!(value["step count"], 20);
        assert_eq!(value["depth"], 0);
    }

    #[test]
    fn test_file_override_and_fallback() {
        let path = std::env::temp_dir().join(format!("occ-params-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"calib type": 1}"#).unwrap();
        let json = resolve_params(Some(&path), &OccParams::perturbation(false)).unwrap();
        assert_eq!(json, r#"{"calib type": 1}"#);
        std::fs::remove_file(&path).unwrap();

        let json = resolve_params(Some(&path), &OccParams::perturbation(false)).unwrap();
        assert!(json.contains("\"calib type\": 0"));
    }
}

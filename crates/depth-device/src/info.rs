//! Device Info and Capability Discovery

use calib_table::TableLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Connection type reported by MIPI (GMSL) devices
const MIPI_CONNECTION: &str = "GMSL";

/// Oldest firmware with inter-camera sync support
const INTER_CAM_SYNC_MIN_FW: FirmwareVersion = FirmwareVersion([5, 15, 0, 0]);

/// Static camera info as reported at enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Marketing name (e.g., "Intel RealSense D435")
    pub name: String,
    /// Serial number
    pub serial_number: String,
    /// Firmware version string ("5.15.1.0")
    pub firmware_version: String,
    /// Product line (e.g., "D400")
    pub product_line: String,
    /// Connection type ("USB", "GMSL", "DDS")
    pub connection_type: String,
}

/// Four-part firmware version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion(pub [u32; 4]);

impl FirmwareVersion {
    /// Parse a dotted version; missing trailing parts count as zero
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = [0u32; 4];
        for (i, piece) in s.trim().split('.').enumerate() {
            if i >= 4 {
                return None;
            }
            parts[i] = piece.parse().ok()?;
        }
        Some(Self(parts))
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

/// Camera family, as far as behavior differs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductFamily {
    D400,
    D405,
    D415,
    D555,
    Other,
}

impl ProductFamily {
    /// Classify from the device name
    pub fn from_name(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        if upper.contains("D405") {
            ProductFamily::D405
        } else if upper.contains("D415") {
            ProductFamily::D415
        } else if upper.contains("D555") {
            ProductFamily::D555
        } else if upper.contains("D4") {
            ProductFamily::D400
        } else {
            ProductFamily::Other
        }
    }
}

/// Device quirks, resolved once at discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub family: ProductFamily,
    /// Emitter must be on while the calibration routine runs
    pub emitter_required_for_calibration: bool,
    pub supports_emitter_on_off: bool,
    pub supports_thermal_compensation: bool,
    /// Auto-exposure convergence needs the accelerated mode forced
    pub needs_accelerated_ae_override: bool,
    /// MIPI/GMSL connection; OCC then requires host assistance
    pub is_mipi: bool,
    pub supports_inter_cam_sync: bool,
    /// Calibration table layout, when known for this family
    pub table_layout: Option<TableLayout>,
    pub firmware: Option<FirmwareVersion>,
}

impl DeviceCapabilities {
    /// Resolve capabilities from enumeration info
    pub fn discover(info: &DeviceInfo) -> Self {
        let family = ProductFamily::from_name(&info.name);
        let firmware = FirmwareVersion::parse(&info.firmware_version);
        let is_mipi = info.connection_type.eq_ignore_ascii_case(MIPI_CONNECTION);

        let has_projector = family != ProductFamily::D405;
        let supports_inter_cam_sync = family != ProductFamily::D405
            && firmware.map_or(false, |fw| fw >= INTER_CAM_SYNC_MIN_FW);

        let table_layout = match family {
            ProductFamily::D400 | ProductFamily::D405 | ProductFamily::D415 => Some(TableLayout::d400()),
            ProductFamily::D555 | ProductFamily::Other => None,
        };

        let caps = Self {
            family,
            emitter_required_for_calibration: has_projector && family != ProductFamily::D415,
            supports_emitter_on_off: has_projector,
            supports_thermal_compensation: family != ProductFamily::D405,
            needs_accelerated_ae_override: family == ProductFamily::D555,
            is_mipi,
            supports_inter_cam_sync,
            table_layout,
            firmware,
        };

        debug!(
            "Discovered {} ({:?}): mipi={}, inter-cam sync={}, table layout known={}",
            info.name,
            caps.family,
            caps.is_mipi,
            caps.supports_inter_cam_sync,
            caps.table_layout.is_some()
        );
        caps
    }

    /// Whether principal-point calibration checks can run
    pub fn supports_table_calibration(&self) -> bool {
        self.table_layout.is_some()
    }
}

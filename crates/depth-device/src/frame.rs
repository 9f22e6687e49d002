//! Stream configuration and frame types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sensor stream kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Depth,
    Infrared,
    Color,
}

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Z16,
    Y8,
    Rgb8,
}

/// Requested stream profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: u32,
}

impl StreamConfig {
    /// Z16 depth stream
    pub fn depth(width: u32, height: u32, fps: u32) -> Self {
        Self {
            kind: StreamKind::Depth,
            width,
            height,
            format: PixelFormat::Z16,
            fps,
        }
    }

    /// Y8 infrared stream
    pub fn infrared(width: u32, height: u32, fps: u32) -> Self {
        Self {
            kind: StreamKind::Infrared,
            width,
            height,
            format: PixelFormat::Y8,
            fps,
        }
    }

    /// RGB8 color stream
    pub fn color(width: u32, height: u32, fps: u32) -> Self {
        Self {
            kind: StreamKind::Color,
            width,
            height,
            format: PixelFormat::Rgb8,
            fps,
        }
    }

    /// Nominal frame interval in microseconds
    pub fn frame_interval_us(&self) -> f64 {
        if self.fps == 0 {
            return 0.0;
        }
        1_000_000.0 / self.fps as f64
    }
}

/// Optional per-frame metadata fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataField {
    /// Hardware clock timestamp (microseconds, 32-bit counter)
    FrameTimestamp,
    /// Sensor mid-exposure timestamp
    SensorTimestamp,
    ActualExposure,
    Gain,
    FrameCounter,
}

/// Metadata attached to a frame; availability is firmware-dependent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetadata {
    values: HashMap<MetadataField, i64>,
}

impl FrameMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, field: MetadataField, value: i64) -> Self {
        self.values.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: MetadataField, value: i64) {
        self.values.insert(field, value);
    }

    /// Whether the field is present on this frame
    pub fn supports(&self, field: MetadataField) -> bool {
        self.values.contains_key(&field)
    }

    pub fn get(&self, field: MetadataField) -> Option<i64> {
        self.values.get(&field).copied()
    }
}

/// A single frame of 16-bit samples
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    pub stream: StreamKind,
    pub width: u32,
    pub height: u32,
    /// Raw samples (depth units for Z16)
    pub data: Vec<u16>,
    pub frame_number: u64,
    /// Host wall-clock arrival time (microseconds since UNIX epoch)
    pub host_timestamp_us: f64,
    pub metadata: FrameMetadata,
}

impl DepthFrame {
    /// Hardware timestamp, if the firmware exposes it
    pub fn hardware_timestamp(&self) -> Option<i64> {
        self.metadata.get(MetadataField::FrameTimestamp)
    }

    /// Sum and count of valid (non-zero) samples
    pub fn valid_samples(&self) -> (u64, usize) {
        self.data
            .iter()
            .filter(|&&v| v > 0)
            .fold((0u64, 0usize), |(sum, n), &v| (sum + v as u64, n + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_supports_before_get() {
        let meta = FrameMetadata::new().with(MetadataField::FrameTimestamp, 42);
        assert!(meta.supports(MetadataField::FrameTimestamp));
        assert!(!meta.supports(MetadataField::Gain));
        assert_eq!(meta.get(MetadataField::FrameTimestamp), Some(42));
        assert_eq!(meta.get(MetadataField::Gain), None);
    }

    #[test]
    fn test_valid_samples_skip_zero() {
        let frame = DepthFrame {
            stream: StreamKind::Depth,
            width: 2,
            height: 2,
            data: vec![0, 1000, 0, 1200],
            frame_number: 1,
            host_timestamp_us: 0.0,
            metadata: FrameMetadata::new(),
        };
        assert_eq!(frame.valid_samples(), (2200, 2));
        assert_eq!(frame.hardware_timestamp(), None);
    }

    #[test]
    fn test_frame_interval() {
        assert!((StreamConfig::depth(256, 144, 90).frame_interval_us() - 11111.111).abs() < 0.01);
        assert_eq!(StreamConfig::color(640, 480, 0).frame_interval_us(), 0.0);
    }
}

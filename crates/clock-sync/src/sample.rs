//! Timestamp samples and counter unwrapping

use depth_device::DepthFrame;
use serde::{Deserialize, Serialize};

/// Period of the 32-bit microsecond hardware counter (about 71.6 minutes)
pub const HW_COUNTER_WRAP_US: f64 = 4_294_967_296.0;

/// Hardware and host timestamps of one frame, both in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampSample {
    /// Unwrapped hardware counter value
    pub hardware_us: f64,
    /// Host wall-clock arrival time
    pub host_us: f64,
}

impl TimestampSample {
    pub fn new(hardware_us: f64, host_us: f64) -> Self {
        Self { hardware_us, host_us }
    }

    /// Raw sample from a frame; `None` when the firmware exposes no
    /// hardware timestamp
    pub fn from_frame(frame: &DepthFrame) -> Option<Self> {
        frame
            .hardware_timestamp()
            .map(|hw| Self::new(hw as f64, frame.host_timestamp_us))
    }
}

/// Turns a stream of wrapping 32-bit counter values into a monotonic
/// timeline.
///
/// A step backwards of more than half the counter period counts as a wrap;
/// smaller steps back are jitter and pass through unchanged.
#[derive(Debug, Clone, Default)]
pub struct CounterUnwrapper {
    last_raw: Option<f64>,
    wraps: u64,
}

impl CounterUnwrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unwrap(&mut self, raw_us: f64) -> f64 {
        if let Some(last) = self.last_raw {
            if last - raw_us > HW_COUNTER_WRAP_US / 2.0 {
                self.wraps += 1;
            } else if raw_us - last > HW_COUNTER_WRAP_US / 2.0 && self.wraps > 0 {
                // Late frame from before the last wrap
                return raw_us + (self.wraps - 1) as f64 * HW_COUNTER_WRAP_US;
            }
        }
        self.last_raw = Some(raw_us);
        raw_us + self.wraps as f64 * HW_COUNTER_WRAP_US
    }

    pub fn wraps(&self) -> u64 {
        self.wraps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depth_device::{FrameMetadata, MetadataField, StreamKind};

    #[test]
    fn test_unwrap_across_counter_wrap() {
        let mut u = CounterUnwrapper::new();
        assert_eq!(u.unwrap(HW_COUNTER_WRAP_US - 20_000.0), HW_COUNTER_WRAP_US - 20_000.0);
        assert_eq!(u.unwrap(13_333.0), HW_COUNTER_WRAP_US + 13_333.0);
        assert_eq!(u.unwrap(46_666.0), HW_COUNTER_WRAP_US + 46_666.0);
        assert_eq!(u.wraps(), 1);
    }

    #[test]
    fn test_small_backstep_is_not_a_wrap() {
        let mut u = CounterUnwrapper::new();
        u.unwrap(1_000_000.0);
        assert_eq!(u.unwrap(999_990.0), 999_990.0);
        assert_eq!(u.wraps(), 0);
    }

    #[test]
    fn test_late_frame_before_wrap() {
        let mut u = CounterUnwrapper::new();
        u.unwrap(HW_COUNTER_WRAP_US - 100.0);
        u.unwrap(50.0);
        assert_eq!(u.unwrap(HW_COUNTER_WRAP_US - 10.0), HW_COUNTER_WRAP_US - 10.0);
        assert_eq!(u.unwrap(100.0), HW_COUNTER_WRAP_US + 100.0);
    }

    #[test]
    fn test_sample_requires_hardware_timestamp() {
        let mut frame = DepthFrame {
            stream: StreamKind::Depth,
            width: 1,
            height: 1,
            data: vec![0],
            frame_number: 1,
            host_timestamp_us: 5.0,
            metadata: FrameMetadata::new(),
        };
        assert!(TimestampSample::from_frame(&frame).is_none());
        frame.metadata.insert(MetadataField::FrameTimestamp, 42);
        assert_eq!(TimestampSample::from_frame(&frame), Some(TimestampSample::new(42.0, 5.0)));
    }
}

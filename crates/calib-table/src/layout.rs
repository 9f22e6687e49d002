//! Table Layout Constants

use crate::error::TableError;
use crate::table::INTRINSIC_FLOATS;
use serde::{Deserialize, Serialize};

/// Byte layout of a calibration table for one camera family.
///
/// Only the D400 layout is known; other families must supply their own
/// constants once their table format is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableLayout {
    /// Header size; the CRC covers everything after it
    pub header_size: usize,
    /// Offset of the little-endian CRC32 inside the header
    pub crc_offset: usize,
    /// Offset of the left-eye intrinsic matrix
    pub left_intrinsics_offset: usize,
    /// Offset of the right-eye intrinsic matrix
    pub right_intrinsics_offset: usize,
    /// Smallest table accepted for decoding
    pub min_table_size: usize,
    /// Width used to normalize ppx
    pub nominal_width: f64,
    /// Height used to normalize ppy
    pub nominal_height: f64,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self::d400()
    }
}

impl TableLayout {
    /// D400 family layout (1280x800 normalization)
    pub fn d400() -> Self {
        Self {
            header_size: 16,
            crc_offset: 12,
            left_intrinsics_offset: 16,
            right_intrinsics_offset: 16 + INTRINSIC_FLOATS * 4,
            min_table_size: 280,
            nominal_width: 1280.0,
            nominal_height: 800.0,
        }
    }

    /// Check that the constants describe a decodable table
    pub fn validate(&self) -> Result<(), TableError> {
        if self.crc_offset.saturating_add(4) > self.header_size {
            return Err(TableError::InvalidLayout(format!(
                "CRC field at {} does not fit in a {}-byte header",
                self.crc_offset, self.header_size
            )));
        }
        if self.header_size > self.min_table_size {
            return Err(TableError::InvalidLayout(format!(
                "{}-byte header exceeds the minimum table size {}",
                self.header_size, self.min_table_size
            )));
        }

        let block = INTRINSIC_FLOATS * 4;
        for (name, offset) in [
            ("left", self.left_intrinsics_offset),
            ("right", self.right_intrinsics_offset),
        ] {
            if offset < self.header_size {
                return Err(TableError::InvalidLayout(format!(
                    "{} intrinsics at {} overlap the header",
                    name, offset
                )));
            }
            if offset.saturating_add(block) > self.min_table_size {
                return Err(TableError::InvalidLayout(format!(
                    "{} intrinsics at {} end beyond the minimum table size {}",
                    name, offset, self.min_table_size
                )));
            }
        }

        if !(self.nominal_width > 0.0 && self.nominal_height > 0.0) {
            return Err(TableError::InvalidLayout(format!(
                "nominal resolution must be positive, got {}x{}",
                self.nominal_width, self.nominal_height
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_d400_layout_is_valid() {
        let layout = TableLayout::d400();
        assert!(layout.validate().is_ok());
        assert_eq!(layout.right_intrinsics_offset, 52);
    }

    #[test]
    fn test_crc_outside_header_rejected() {
        let layout = TableLayout {
            crc_offset: 14,
            ..Default::default()
        };
        assert!(matches!(layout.validate(), Err(TableError::InvalidLayout(_))));
    }

    #[test]
    fn test_oversized_offsets_rejected() {
        let header = TableLayout {
            header_size: 4096,
            ..Default::default()
        };
        assert!(matches!(header.validate(), Err(TableError::InvalidLayout(_))));

        let offset = TableLayout {
            right_intrinsics_offset: usize::MAX - 8,
            ..Default::default()
        };
        assert!(matches!(offset.validate(), Err(TableError::InvalidLayout(_))));

        let crc = TableLayout {
            crc_offset: usize::MAX,
            ..Default::default()
        };
        assert!(crc.validate().is_err());
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let layout = TableLayout {
            nominal_height: 0.0,
            ..Default::default()
        };
        assert!(layout.validate().is_err());
    }
}

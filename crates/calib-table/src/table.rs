//! Raw Calibration Table and CRC Handling

use crate::error::TableError;
use crate::layout::TableLayout;
use crc::{Crc, CRC_32_ISO_HDLC};
use tracing::debug;

/// Number of floats in an intrinsic matrix (row-major 3x3)
pub const INTRINSIC_FLOATS: usize = 9;

/// Same polynomial and reflection as zlib's crc32
const TABLE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute CRC32 over a payload
pub fn table_crc32(payload: &[u8]) -> u32 {
    TABLE_CRC.checksum(payload)
}

/// Stereo eye selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

/// Stored vs computed CRC of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcStatus {
    pub stored: u32,
    pub computed: u32,
}

impl CrcStatus {
    /// Whether the stored CRC reflects the payload
    pub fn is_valid(&self) -> bool {
        self.stored == self.computed
    }
}

/// Calibration table bytes as read from (or written to) a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationTable {
    bytes: Vec<u8>,
}

impl CalibrationTable {
    /// Wrap raw table bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume into raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Table length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the table has no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Enforce the layout's minimum size
    pub fn ensure_min_size(&self, layout: &TableLayout) -> Result<(), TableError> {
        if self.bytes.len() < layout.min_table_size {
            return Err(TableError::TooShort {
                len: self.bytes.len(),
                min: layout.min_table_size,
            });
        }
        Ok(())
    }

    /// CRC32 stored in the header
    pub fn stored_crc(&self, layout: &TableLayout) -> Result<u32, TableError> {
        let field = self.block(layout.crc_offset, 4)?;
        Ok(u32::from_le_bytes([field[0], field[1], field[2], field[3]]))
    }

    /// CRC32 of everything after the header
    pub fn compute_crc(&self, layout: &TableLayout) -> Result<u32, TableError> {
        if self.bytes.len() < layout.header_size {
            return Err(TableError::TooShort {
                len: self.bytes.len(),
                min: layout.header_size,
            });
        }
        Ok(table_crc32(&self.bytes[layout.header_size..]))
    }

    /// Compare stored and computed CRC
    pub fn crc_status(&self, layout: &TableLayout) -> Result<CrcStatus, TableError> {
        Ok(CrcStatus {
            stored: self.stored_crc(layout)?,
            computed: self.compute_crc(layout)?,
        })
    }

    /// Fail unless the stored CRC matches the payload
    pub fn verify_crc(&self, layout: &TableLayout) -> Result<(), TableError> {
        let status = self.crc_status(layout)?;
        if !status.is_valid() {
            return Err(TableError::CrcMismatch {
                stored: status.stored,
                computed: status.computed,
            });
        }
        Ok(())
    }

    /// Recompute the CRC over the payload and store it in the header
    pub fn finalize_crc(&mut self, layout: &TableLayout) -> Result<u32, TableError> {
        let old = self.stored_crc(layout)?;
        let new = self.compute_crc(layout)?;
        self.bytes[layout.crc_offset..layout.crc_offset + 4].copy_from_slice(&new.to_le_bytes());
        debug!("Table CRC updated: {:08X} -> {:08X}", old, new);
        Ok(new)
    }

    /// Offset of an eye's intrinsic block
    pub fn intrinsics_offset(eye: Eye, layout: &TableLayout) -> usize {
        match eye {
            Eye::Left => layout.left_intrinsics_offset,
            Eye::Right => layout.right_intrinsics_offset,
        }
    }

    /// Decode an eye's 3x3 intrinsic matrix
    pub fn intrinsics(&self, eye: Eye, layout: &TableLayout) -> Result<[f32; INTRINSIC_FLOATS], TableError> {
        let offset = Self::intrinsics_offset(eye, layout);
        let raw = self.block(offset, INTRINSIC_FLOATS * 4)?;

        let mut values = [0f32; INTRINSIC_FLOATS];
        for (value, chunk) in values.iter_mut().zip(raw.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(values)
    }

    /// Encode an eye's 3x3 intrinsic matrix in place.
    ///
    /// Leaves the CRC stale; call [`CalibrationTable::finalize_crc`] before
    /// handing the table to a device.
    pub fn set_intrinsics(
        &mut self,
        eye: Eye,
        values: &[f32; INTRINSIC_FLOATS],
        layout: &TableLayout,
    ) -> Result<(), TableError> {
        let offset = Self::intrinsics_offset(eye, layout);
        self.block(offset, INTRINSIC_FLOATS * 4)?;

        for (i, value) in values.iter().enumerate() {
            let at = offset + i * 4;
            self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    fn block(&self, offset: usize, size: usize) -> Result<&[u8], TableError> {
        offset
            .checked_add(size)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(TableError::OutOfBounds {
                offset,
                size,
                len: self.bytes.len(),
            })
    }
}

impl From<Vec<u8>> for CalibrationTable {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl AsRef<[u8]> for CalibrationTable {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

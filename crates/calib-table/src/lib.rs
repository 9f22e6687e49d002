//! Calibration Table Codec
//!
//! Reads and patches the fixed-layout stereo calibration table stored on
//! depth cameras:
//! - 16-byte header with a little-endian CRC32 at bytes [12, 16)
//! - left and right 3x3 intrinsic matrices as packed little-endian `f32`
//! - principal point stored normalized by the nominal sensor resolution

mod error;
mod layout;
mod principal;
mod table;

pub use error::TableError;
pub use layout::TableLayout;
pub use principal::{
    patch_principal_point, read_principal_points, Axis, IntrinsicOffsets, PrincipalPoint,
    PrincipalPointPatch, PrincipalPoints,
};
pub use table::{table_crc32, CalibrationTable, CrcStatus, Eye, INTRINSIC_FLOATS};
